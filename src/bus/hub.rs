//! Coordinator hub
//!
//! The hub is the coordinator window's service object: it owns the child
//! registry, the shared data store, and the window-name counter, and runs as
//! a single task consuming commands from an mpsc channel. Registration,
//! deregistration, store mutation, and rebroadcast all pass through this one
//! funnel, so no lock is ever shared with another task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::protocol::{Envelope, Inbound, Origin, ProtocolMessage, WindowName};

/// Capacity of each window's inbox and of the hub command channel.
pub(crate) const INBOX_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 64;

/// Delivery endpoint and lifecycle flag for one registered child.
pub(crate) struct ChildHandle {
    pub(crate) inbox: broadcast::Sender<Inbound>,
    pub(crate) open: Arc<AtomicBool>,
}

/// Commands accepted by the coordinator task.
pub(crate) enum HubCommand {
    /// A message posted to the coordinator window.
    Deliver(Inbound),
    /// A new child window attaching; the hub assigns its name.
    Register {
        inbox: broadcast::Sender<Inbound>,
        open: Arc<AtomicBool>,
        reply: oneshot::Sender<WindowName>,
    },
    /// A child window unloading.
    Unregister { name: WindowName },
    /// Coordinator unload: close every registered child, then stop.
    CloseAll,
}

pub(crate) struct Hub {
    origin: Origin,
    coordinator_name: WindowName,
    coordinator_inbox: broadcast::Sender<Inbound>,
    children: HashMap<WindowName, ChildHandle>,
    store: HashMap<String, Value>,
    next_window: u64,
}

impl Hub {
    /// Spawn the coordinator task, returning its command channel plus the
    /// coordinator window's own assigned name and inbox.
    pub(crate) fn spawn(
        origin: Origin,
    ) -> (
        mpsc::Sender<HubCommand>,
        WindowName,
        broadcast::Sender<Inbound>,
    ) {
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (coordinator_inbox, _) = broadcast::channel(INBOX_CAPACITY);

        let mut hub = Hub {
            origin,
            coordinator_name: WindowName(String::new()),
            coordinator_inbox: coordinator_inbox.clone(),
            children: HashMap::new(),
            store: HashMap::new(),
            next_window: 0,
        };
        // The coordinator is a window too, and takes the first name.
        hub.coordinator_name = hub.next_name();
        let coordinator_name = hub.coordinator_name.clone();

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    HubCommand::Deliver(inbound) => hub.handle_message(inbound),
                    HubCommand::Register { inbox, open, reply } => {
                        let name = hub.next_name();
                        hub.children
                            .insert(name.clone(), ChildHandle { inbox, open });
                        let _ = reply.send(name);
                    }
                    HubCommand::Unregister { name } => {
                        hub.children.remove(&name);
                    }
                    HubCommand::CloseAll => {
                        for child in hub.children.values() {
                            child.open.store(false, Ordering::SeqCst);
                        }
                        hub.children.clear();
                        break;
                    }
                }
            }
        });

        (command_tx, coordinator_name, coordinator_inbox)
    }

    fn next_name(&mut self) -> WindowName {
        self.next_window += 1;
        WindowName(format!("window-{}", self.next_window))
    }

    /// Coordinator message handler: same-origin gate, then classify by the
    /// `_type` discriminator.
    fn handle_message(&mut self, inbound: Inbound) {
        if inbound.origin != self.origin {
            log::debug!("dropping message from foreign origin {}", inbound.origin);
            return;
        }

        match inbound.envelope {
            Envelope::Protocol(ProtocolMessage::SetRequest { key, data, .. }) => {
                self.store.insert(key, data);
            }
            Envelope::Protocol(ProtocolMessage::GetRequest { key, getter }) => {
                let data = self.store.get(&key).cloned().unwrap_or(Value::Null);
                let response = Envelope::Protocol(ProtocolMessage::GetResponse {
                    key,
                    data,
                    getter: getter.clone(),
                });
                self.reply_to(&getter, response);
            }
            envelope => {
                // Application traffic is rebroadcast to the whole tree;
                // each listener filters out its own sends.
                self.broadcast(envelope);
            }
        }
    }

    /// Address a response to the one window that asked for it: the
    /// coordinator itself, or the matching registered child.
    fn reply_to(&self, getter: &WindowName, envelope: Envelope) {
        let inbound = Inbound {
            origin: self.origin.clone(),
            envelope,
        };
        if *getter == self.coordinator_name {
            let _ = self.coordinator_inbox.send(inbound);
        } else if let Some(child) = self.children.get(getter) {
            let _ = child.inbox.send(inbound);
        } else {
            log::warn!("data-get-response addressed to unknown window {getter}");
        }
    }

    fn broadcast(&self, envelope: Envelope) {
        let inbound = Inbound {
            origin: self.origin.clone(),
            envelope,
        };
        let _ = self.coordinator_inbox.send(inbound.clone());
        for child in self.children.values() {
            let _ = child.inbox.send(inbound.clone());
        }
    }
}
