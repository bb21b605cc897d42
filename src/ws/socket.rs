//! Raw duplex socket seam.
//!
//! # Responsibilities
//! - Define the host-server collaborator handle the channel wraps
//!   (`send`, `close`, `ready_state`, listener add/remove)
//! - Provide token-keyed listener bookkeeping shared by implementations
//! - Adapt Axum's server-side WebSocket to the seam
//!
//! # Design Decisions
//! - Listener registrations are keyed by a stable subscription token issued
//!   on attach, never by reference identity
//! - One pump task per connection, so inbound delivery preserves arrival
//!   order
//! - Sends are fire-and-forget at the transport level; there is no partial
//!   cancellation of an in-flight send

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Connection state of a raw socket handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Events a raw socket delivers to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Error(String),
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    #[error("socket is not open (state: {0:?})")]
    NotOpen(ReadyState),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Stable identity for an attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// Callback attached to a raw socket.
pub type EventListener = Box<dyn Fn(&SocketEvent) + Send + Sync>;

/// The duplex handle provided by the host server.
pub trait RawSocket: Send + Sync {
    fn send(&self, data: &str) -> Result<(), SocketError>;
    fn close(&self);
    fn ready_state(&self) -> ReadyState;
    fn add_listener(&self, listener: EventListener) -> ListenerToken;
    fn remove_listener(&self, token: ListenerToken);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Token-keyed listener table. Emission snapshots the current listeners so a
/// callback may remove itself without deadlocking.
#[derive(Default)]
pub struct ListenerRegistry {
    next: AtomicU64,
    listeners: Mutex<Vec<(ListenerToken, Arc<dyn Fn(&SocketEvent) + Send + Sync>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: EventListener) -> ListenerToken {
        let token = ListenerToken(self.next.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((token, Arc::from(listener)));
        token
    }

    pub fn remove(&self, token: ListenerToken) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(t, _)| *t != token);
        listeners.len() != before
    }

    pub fn emit(&self, event: &SocketEvent) {
        let snapshot: Vec<_> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// `RawSocket` over a server-side Axum WebSocket.
///
/// The socket is already open once the upgrade completes, so the initial
/// ready state is `Open` and no `Open` event is ever emitted.
pub struct AxumSocket {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: Arc<Mutex<ReadyState>>,
    listeners: Arc<ListenerRegistry>,
}

impl AxumSocket {
    /// Wrap the upgraded socket and start its pump task.
    pub fn spawn(ws: WebSocket) -> Arc<Self> {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ReadyState::Open));
        let listeners = Arc::new(ListenerRegistry::new());

        let socket = Arc::new(Self {
            outbound,
            state: state.clone(),
            listeners: listeners.clone(),
        });

        tokio::spawn(async move {
            let (mut sink, mut stream) = ws.split();
            let mut outbound_open = true;
            loop {
                tokio::select! {
                    frame = outbound_rx.recv(), if outbound_open => match frame {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                listeners.emit(&SocketEvent::Error(e.to_string()));
                            }
                        }
                        Some(Outbound::Close) => {
                            let _ = sink.send(Message::Close(None)).await;
                        }
                        // handle dropped: close and drain until the peer closes
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            outbound_open = false;
                        }
                    },
                    inbound = stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            trace!(bytes = text.len(), "Inbound text frame");
                            listeners.emit(&SocketEvent::Message(text.to_string()));
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            *lock(&state) = ReadyState::Closed;
                            listeners.emit(&SocketEvent::Closed);
                            break;
                        }
                        // ping/pong answered by axum; binary frames are not
                        // part of the message protocol
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            listeners.emit(&SocketEvent::Error(e.to_string()));
                            *lock(&state) = ReadyState::Closed;
                            listeners.emit(&SocketEvent::Closed);
                            break;
                        }
                    },
                }
            }
            debug!("WebSocket pump task finished");
        });

        socket
    }
}

impl RawSocket for AxumSocket {
    fn send(&self, data: &str) -> Result<(), SocketError> {
        let current = *lock(&self.state);
        if current != ReadyState::Open {
            return Err(SocketError::NotOpen(current));
        }
        self.outbound
            .send(Outbound::Text(data.to_string()))
            .map_err(|_| SocketError::Transport("connection task gone".to_string()))
    }

    fn close(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, ReadyState::Connecting | ReadyState::Open) {
                *state = ReadyState::Closing;
            }
        }
        let _ = self.outbound.send(Outbound::Close);
    }

    fn ready_state(&self) -> ReadyState {
        *lock(&self.state)
    }

    fn add_listener(&self, listener: EventListener) -> ListenerToken {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, token: ListenerToken) {
        self.listeners.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn registry_tokens_are_stable_and_removal_is_exact() {
        let registry = ListenerRegistry::new();
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        let hits = first_hits.clone();
        let first = registry.add(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        let hits = second_hits.clone();
        let _second = registry.add(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&SocketEvent::Open);
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        registry.emit(&SocketEvent::Open);

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_listener_may_remove_itself_during_emit() {
        let registry = Arc::new(ListenerRegistry::new());
        let token_slot: Arc<Mutex<Option<ListenerToken>>> = Arc::new(Mutex::new(None));

        let registry_ref = registry.clone();
        let slot = token_slot.clone();
        let token = registry.add(Box::new(move |_| {
            if let Some(token) = lock(&slot).take() {
                registry_ref.remove(token);
            }
        }));
        *lock(&token_slot) = Some(token);

        registry.emit(&SocketEvent::Open);
        assert!(registry.is_empty());
    }
}
