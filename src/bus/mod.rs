//! Cross-window messaging and shared data
//!
//! Coordinates a tree of windows rooted at a single coordinator. Every
//! message funnels through the coordinator, which rebroadcasts application
//! traffic to the whole tree and services the shared key/value store via
//! internal get/set protocol messages. All traffic is restricted to a single
//! origin: messages from a foreign origin are dropped silently.
//!
//! The coordinator state (child registry, shared store, name counter) lives
//! in an explicit hub task owned by the coordinator window; no other task
//! ever touches it, so there are no concurrent-write races by construction.

pub(crate) mod hub;
pub mod protocol;
pub mod window;

use thiserror::Error;

use self::protocol::WindowName;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("{window} already has a listener - call unlisten() first")]
    ListenerConflict { window: WindowName },

    #[error("Window is closed")]
    Closed,
}
