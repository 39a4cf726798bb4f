//! Wire protocol for cross-window traffic
//!
//! Everything crossing a window boundary is an [`Envelope`]: either an
//! application message wrapped with its sender's name, or one of the
//! internal data-store messages discriminated by a `_type` field. The JSON
//! field names are pinned with serde renames so envelopes stay readable by
//! anything else listening on the same channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique generated name for a window, assigned by the coordinator's
/// monotonic counter (`window-1`, `window-2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowName(pub String);

impl fmt::Display for WindowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A window's origin (scheme, host, port). Messages are only honoured when
/// sender and receiver origins match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin(pub String);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Internal data-store traffic, discriminated on the wire by `_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum ProtocolMessage {
    #[serde(rename = "data-set-request")]
    SetRequest {
        key: String,
        data: Value,
        #[serde(rename = "_setter")]
        setter: WindowName,
    },
    #[serde(rename = "data-get-request")]
    GetRequest {
        key: String,
        #[serde(rename = "_getter")]
        getter: WindowName,
    },
    #[serde(rename = "data-get-response")]
    GetResponse {
        key: String,
        data: Value,
        #[serde(rename = "_getter")]
        getter: WindowName,
    },
}

/// An application payload wrapped with its sender's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMessage {
    #[serde(rename = "_sender")]
    pub sender: WindowName,
    pub message: Value,
}

/// Any message that can cross a window boundary. Protocol messages carry
/// `_type` and are tried first, so application traffic is exactly the
/// messages without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Protocol(ProtocolMessage),
    App(AppMessage),
}

/// A message as it arrives at a window, carrying the sender's origin for
/// same-origin filtering.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub origin: Origin,
    pub envelope: Envelope,
}
