//! Per-window bus API
//!
//! A [`Window`] is the handle an application holds on its own window in the
//! tree: it can broadcast messages to every other window, install at most
//! one application listener, and read or write the coordinator's shared
//! store. [`Window::coordinator`] creates the topmost window and its hub;
//! [`Window::open`] opens a child whose traffic funnels to the same hub, no
//! matter how deep the opener chain goes.
//!
//! Windows must be closed explicitly with [`Window::close`]; that is the
//! unload step that deregisters a child or, on the coordinator, cascades a
//! close to every registered child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::hub::{Hub, HubCommand, INBOX_CAPACITY};
use super::protocol::{AppMessage, Envelope, Inbound, Origin, ProtocolMessage, WindowName};
use super::BusError;

pub struct Window {
    name: WindowName,
    origin: Origin,
    /// Opener chain link; dangling for the coordinator.
    opener: Weak<Window>,
    hub: mpsc::Sender<HubCommand>,
    inbox: broadcast::Sender<Inbound>,
    /// The single active application listener, if any.
    listener: Mutex<Option<JoinHandle<()>>>,
    open: Arc<AtomicBool>,
    is_coordinator: bool,
}

impl Window {
    /// Create the coordinator window and spawn its hub task. Must be called
    /// from within a tokio runtime.
    pub fn coordinator(origin: Origin) -> Arc<Window> {
        let (hub, name, inbox) = Hub::spawn(origin.clone());
        Arc::new(Window {
            name,
            origin,
            opener: Weak::new(),
            hub,
            inbox,
            listener: Mutex::new(None),
            open: Arc::new(AtomicBool::new(true)),
            is_coordinator: true,
        })
    }

    /// Open a child window. The child walks the opener chain to the topmost
    /// window and registers with its hub, which assigns the generated name.
    pub async fn open(self: &Arc<Self>) -> Result<Arc<Window>, BusError> {
        let topmost = self.topmost();
        if !topmost.is_open() {
            return Err(BusError::Closed);
        }

        let (inbox, _) = broadcast::channel(INBOX_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));
        let (reply_tx, reply_rx) = oneshot::channel();

        topmost
            .hub
            .send(HubCommand::Register {
                inbox: inbox.clone(),
                open: Arc::clone(&open),
                reply: reply_tx,
            })
            .await
            .map_err(|_| BusError::Closed)?;
        let name = reply_rx.await.map_err(|_| BusError::Closed)?;

        Ok(Arc::new(Window {
            name,
            origin: topmost.origin.clone(),
            opener: Arc::downgrade(self),
            hub: topmost.hub.clone(),
            inbox,
            listener: Mutex::new(None),
            open,
            is_coordinator: false,
        }))
    }

    /// Walk the opener chain to the topmost window. An opener carrying this
    /// window's own name means a refreshed coordinator, which would
    /// otherwise chase itself forever.
    fn topmost(self: &Arc<Self>) -> Arc<Window> {
        let mut current = Arc::clone(self);
        while let Some(opener) = current.opener.upgrade() {
            if opener.name == current.name {
                break;
            }
            current = opener;
        }
        current
    }

    /// Broadcast an application message to every other window in the tree.
    /// Fire-and-forget: there is no acknowledgment.
    pub async fn send(&self, message: Value) -> Result<(), BusError> {
        let envelope = Envelope::App(AppMessage {
            sender: self.name.clone(),
            message,
        });
        self.to_coordinator(envelope).await
    }

    /// Install this window's application-message listener. Only one may be
    /// active at a time; a second `listen` fails without displacing the
    /// first. The callback never sees protocol traffic, foreign-origin
    /// traffic, or this window's own sends.
    pub fn listen<F>(&self, callback: F) -> Result<(), BusError>
    where
        F: Fn(Value) + Send + 'static,
    {
        let mut slot = self.listener.lock().unwrap();
        if slot.is_some() {
            return Err(BusError::ListenerConflict {
                window: self.name.clone(),
            });
        }

        let mut rx = self.inbox.subscribe();
        let own_name = self.name.clone();
        let own_origin = self.origin.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(inbound) => {
                        if inbound.origin != own_origin {
                            continue;
                        }
                        if let Envelope::App(app) = inbound.envelope {
                            if app.sender != own_name {
                                callback(app.message);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("{own_name} listener lagged, {skipped} messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *slot = Some(handle);
        Ok(())
    }

    /// Remove the active listener. No-op when none is installed.
    pub fn unlisten(&self) {
        if let Some(handle) = self.listener.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Store `data` under `key` in the coordinator's shared store.
    /// Fire-and-forget: there is no completion signal.
    pub async fn set(&self, key: impl Into<String>, data: Value) -> Result<(), BusError> {
        let envelope = Envelope::Protocol(ProtocolMessage::SetRequest {
            key: key.into(),
            data,
            setter: self.name.clone(),
        });
        self.to_coordinator(envelope).await
    }

    /// Fetch the value stored under `key` (JSON null when the key was never
    /// set). The response subscription is installed before the request goes
    /// out, so the one matching reply cannot be missed, and it resolves
    /// exactly once.
    pub async fn get(&self, key: impl Into<String>) -> Result<Value, BusError> {
        let key = key.into();
        let mut rx = self.inbox.subscribe();

        let envelope = Envelope::Protocol(ProtocolMessage::GetRequest {
            key: key.clone(),
            getter: self.name.clone(),
        });
        self.to_coordinator(envelope).await?;

        loop {
            match rx.recv().await {
                Ok(inbound) => {
                    if inbound.origin != self.origin {
                        continue;
                    }
                    if let Envelope::Protocol(ProtocolMessage::GetResponse {
                        key: response_key,
                        data,
                        getter,
                    }) = inbound.envelope
                    {
                        if response_key == key && getter == self.name {
                            return Ok(data);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    /// Post a raw envelope to this window, as from the underlying
    /// postable-message primitive. Posts to the coordinator funnel into the
    /// hub handler; posts to a child land in its inbox. Foreign-origin
    /// posts are dropped silently by every consumer.
    pub async fn post_message(&self, origin: &Origin, envelope: Envelope) -> Result<(), BusError> {
        if !self.is_open() {
            return Err(BusError::Closed);
        }
        let inbound = Inbound {
            origin: origin.clone(),
            envelope,
        };
        if self.is_coordinator {
            self.hub
                .send(HubCommand::Deliver(inbound))
                .await
                .map_err(|_| BusError::Closed)
        } else {
            // Nobody listening yet is not an error.
            let _ = self.inbox.send(inbound);
            Ok(())
        }
    }

    /// Unload this window. A child deregisters from the hub; the
    /// coordinator closes every registered child and stops the hub.
    /// Idempotent.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.unlisten();
        if self.is_coordinator {
            let _ = self.hub.send(HubCommand::CloseAll).await;
        } else {
            let _ = self
                .hub
                .send(HubCommand::Unregister {
                    name: self.name.clone(),
                })
                .await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &WindowName {
        &self.name
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    async fn to_coordinator(&self, envelope: Envelope) -> Result<(), BusError> {
        if !self.is_open() {
            return Err(BusError::Closed);
        }
        let inbound = Inbound {
            origin: self.origin.clone(),
            envelope,
        };
        self.hub
            .send(HubCommand::Deliver(inbound))
            .await
            .map_err(|_| BusError::Closed)
    }
}
