//! Shape-checked, correlated message channel.
//!
//! # Responsibilities
//! - Track connection lifecycle (Connecting → Open → Closing → Closed)
//! - Validate outbound payloads before any bytes leave the channel
//! - Classify inbound frames against the direction-specific shape
//! - Correlate request/reply pairs over the unordered duplex stream
//! - Guarantee resource release before `close()` resolves
//!
//! # Design Decisions
//! - The reply listener is attached before the triggering send goes out, so
//!   a reply arriving immediately cannot be missed
//! - An absent payload is transmitted as the literal `"<none>"` token to
//!   distinguish "explicitly no message" from a wire-level parse failure
//! - Inbound shape mismatches surface as typed events to registered
//!   handlers; they never terminate the connection
//! - Reply-wait timeouts reject the wait without closing the channel

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::shape::{Shape, ShapeError, ShapeValidator};
use crate::ws::socket::{lock, ListenerToken, RawSocket, ReadyState, SocketEvent, SocketError};

/// Wire token for "explicitly no message".
pub const NO_PAYLOAD: &str = "<none>";

/// Fallback reply-wait bound; seeds the config default.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
/// Fallback open-wait bound; seeds the config default.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel lifecycle; monotonic except for external closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl From<ReadyState> for ChannelState {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Connecting => ChannelState::Connecting,
            ReadyState::Open => ChannelState::Open,
            ReadyState::Closing => ChannelState::Closing,
            ReadyState::Closed => ChannelState::Closed,
        }
    }
}

/// Direction-specific message shapes for one route.
///
/// `None` in a direction means no message is expected there.
#[derive(Debug, Clone, Default)]
pub struct MessageContract {
    /// Shape of messages arriving on this channel.
    pub inbound: Option<Shape>,
    /// Shape of messages this channel sends.
    pub outbound: Option<Shape>,
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("socket closed while waiting to open")]
    ClosedWhileOpening,
    #[error("socket never opened within {0:?}")]
    NeverOpened(Duration),
    #[error("outbound message rejected: {0}")]
    Shape(#[from] ShapeError),
    #[error("payload not encodable: {0}")]
    Encode(String),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("no qualifying reply within {0:?}")]
    ReplyTimeout(Duration),
    #[error("channel closed while waiting for a reply")]
    ChannelClosed,
}

/// Typed inbound notifications delivered to subscribed handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A valid message; `None` when the peer sent the no-message token.
    Message(Option<Value>),
    /// The frame parsed but did not satisfy the inbound shape.
    InvalidMessage { reason: String, raw: String },
    /// A message arrived although none is expected in this direction.
    Unexpected { raw: String },
    /// The connection is gone.
    Closed,
}

/// Caller-facing identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Predicate deciding whether an inbound message answers a pending request.
pub type ReplyPredicate = Arc<dyn Fn(&Option<Value>) -> bool + Send + Sync>;

/// Decode and validate one inbound frame.
fn classify(contract: &MessageContract, validator: &dyn ShapeValidator, raw: &str) -> ChannelEvent {
    if raw == NO_PAYLOAD {
        return ChannelEvent::Message(None);
    }
    // Permissive parse: anything that is not JSON is carried as a string.
    let value =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    match &contract.inbound {
        None => ChannelEvent::Unexpected {
            raw: raw.to_string(),
        },
        Some(shape) => match validator.validate(shape, &value) {
            Ok(()) => ChannelEvent::Message(Some(value)),
            Err(e) => ChannelEvent::InvalidMessage {
                reason: e.to_string(),
                raw: raw.to_string(),
            },
        },
    }
}

/// A raw duplex handle wrapped with shape checking, lifecycle tracking and
/// request/reply correlation. Owned by one connection task.
pub struct MessageChannel {
    raw: Arc<dyn RawSocket>,
    contract: MessageContract,
    validator: Arc<dyn ShapeValidator>,
    state: Arc<watch::Sender<ChannelState>>,
    core_token: ListenerToken,
    reply_timeout: Duration,
    next_subscription: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, ListenerToken>>,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel").finish_non_exhaustive()
    }
}

impl MessageChannel {
    /// Wrap a raw handle, waiting for it to open if necessary.
    ///
    /// A handle that is already open enters `Open` immediately. Otherwise an
    /// `Error` event before open fails the attempt, a transition straight to
    /// closed fails distinctly, and exceeding `open_timeout` without either
    /// fails with `NeverOpened`.
    pub async fn wrap(
        raw: Arc<dyn RawSocket>,
        contract: MessageContract,
        validator: Arc<dyn ShapeValidator>,
        open_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let (state_tx, _) = watch::channel(ChannelState::from(raw.ready_state()));
        let state = Arc::new(state_tx);
        let handshake_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let core_state = state.clone();
        let core_error = handshake_error.clone();
        let core_token = raw.add_listener(Box::new(move |event| match event {
            SocketEvent::Open => {
                core_state.send_replace(ChannelState::Open);
            }
            SocketEvent::Error(reason) => {
                if *core_state.borrow() == ChannelState::Connecting {
                    *lock(&core_error) = Some(reason.clone());
                    core_state.send_replace(ChannelState::Closed);
                } else {
                    warn!(error = %reason, "Socket error on open channel");
                }
            }
            SocketEvent::Closed => {
                core_state.send_replace(ChannelState::Closed);
            }
            SocketEvent::Message(_) => {}
        }));

        let channel = Self {
            raw,
            contract,
            validator,
            state,
            core_token,
            reply_timeout,
            next_subscription: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
        };

        if channel.state() == ChannelState::Connecting {
            let mut rx = channel.state.subscribe();
            let waited = tokio::time::timeout(open_timeout, async {
                loop {
                    match *rx.borrow_and_update() {
                        ChannelState::Open => return true,
                        ChannelState::Closed => return false,
                        _ => {}
                    }
                    if rx.changed().await.is_err() {
                        return false;
                    }
                }
            })
            .await;

            match waited {
                Err(_) => return Err(ChannelError::NeverOpened(open_timeout)),
                Ok(true) => {}
                Ok(false) => {
                    return Err(match lock(&handshake_error).take() {
                        Some(reason) => ChannelError::Handshake(reason),
                        None => ChannelError::ClosedWhileOpening,
                    })
                }
            }
        }

        Ok(channel)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn contract(&self) -> &MessageContract {
        &self.contract
    }

    /// Validate and transmit a payload. `None` sends the no-message token.
    pub fn send(&self, payload: Option<&Value>) -> Result<(), ChannelError> {
        match (payload, &self.contract.outbound) {
            (Some(value), Some(shape)) => self.validator.validate(shape, value)?,
            (Some(_), None) => {
                return Err(ChannelError::Shape(ShapeError::new(
                    "route declares no outbound message",
                )))
            }
            (None, _) => {}
        }
        let text = match payload {
            Some(value) => {
                serde_json::to_string(value).map_err(|e| ChannelError::Encode(e.to_string()))?
            }
            None => NO_PAYLOAD.to_string(),
        };
        self.raw.send(&text)?;
        Ok(())
    }

    /// Attach a handler for classified inbound events.
    ///
    /// Each subscription gets its own wrapped listener on the raw socket; the
    /// returned id maps back to that wrapped listener so removal detaches
    /// exactly the right one.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        let contract = self.contract.clone();
        let validator = self.validator.clone();
        let token = self.raw.add_listener(Box::new(move |event| match event {
            SocketEvent::Message(raw) => handler(classify(&contract, validator.as_ref(), raw)),
            SocketEvent::Closed => handler(ChannelEvent::Closed),
            _ => {}
        }));
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).insert(id, token);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match lock(&self.subscriptions).remove(&id) {
            Some(token) => {
                self.raw.remove_listener(token);
                true
            }
            None => false,
        }
    }

    /// Send a message and await the next qualifying inbound message.
    ///
    /// Without a predicate the first valid message satisfies the wait; with
    /// one, messages are skipped until it returns true. A predicate panic
    /// counts as "no match" and is not propagated. The transient listener is
    /// removed on resolution, rejection and timeout alike. An absent
    /// `timeout` falls back to the channel's configured reply timeout.
    pub async fn send_and_wait_for_reply(
        &self,
        payload: Option<&Value>,
        predicate: Option<ReplyPredicate>,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, ChannelError> {
        let timeout = timeout.unwrap_or(self.reply_timeout);
        let (reply_tx, reply_rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(reply_tx)));

        let contract = self.contract.clone();
        let validator = self.validator.clone();
        let token = self.raw.add_listener(Box::new(move |event| {
            let SocketEvent::Message(raw) = event else {
                return;
            };
            let ChannelEvent::Message(message) = classify(&contract, validator.as_ref(), raw)
            else {
                return;
            };
            let qualifies = match &predicate {
                None => true,
                Some(predicate) => {
                    catch_unwind(AssertUnwindSafe(|| predicate(&message))).unwrap_or(false)
                }
            };
            if qualifies {
                if let Some(tx) = lock(&slot).take() {
                    let _ = tx.send(message);
                }
            }
        }));

        // The listener above is attached before the send goes out; a reply
        // that beats the send's return cannot be missed.
        if let Err(e) = self.send(payload) {
            self.raw.remove_listener(token);
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, reply_rx).await;
        self.raw.remove_listener(token);
        match outcome {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ChannelError::ChannelClosed),
            Err(_) => Err(ChannelError::ReplyTimeout(timeout)),
        }
    }

    /// Close the channel and wait for the underlying close event.
    ///
    /// Resolution is deferred until the raw socket actually reports closed,
    /// even when invoked while already closing; callers are guaranteed
    /// resource release before proceeding.
    pub async fn close(&self) {
        if matches!(
            self.state(),
            ChannelState::Connecting | ChannelState::Open
        ) {
            self.state.send_replace(ChannelState::Closing);
        }
        self.raw.close();

        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() == ChannelState::Closed {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }

        let tokens: Vec<ListenerToken> = lock(&self.subscriptions).drain().map(|(_, t)| t).collect();
        for token in tokens {
            self.raw.remove_listener(token);
        }
        debug!("Channel closed, listener registrations released");
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.raw.remove_listener(self.core_token);
        for (_, token) in lock(&self.subscriptions).drain() {
            self.raw.remove_listener(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::BasicValidator;
    use crate::ws::socket::ListenerRegistry;
    use serde_json::json;

    /// Scripted raw socket for driving the channel from tests.
    struct MockSocket {
        state: Mutex<ReadyState>,
        listeners: ListenerRegistry,
        sent: Mutex<Vec<String>>,
        auto_close: bool,
        /// When set, `send` immediately fires this frame back, simulating a
        /// reply that arrives before the send call returns.
        immediate_reply: Mutex<Option<String>>,
    }

    impl MockSocket {
        fn with_state(state: ReadyState, auto_close: bool) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state),
                listeners: ListenerRegistry::new(),
                sent: Mutex::new(Vec::new()),
                auto_close,
                immediate_reply: Mutex::new(None),
            })
        }

        fn open() -> Arc<Self> {
            Self::with_state(ReadyState::Open, true)
        }

        fn connecting() -> Arc<Self> {
            Self::with_state(ReadyState::Connecting, true)
        }

        fn fire(&self, event: SocketEvent) {
            match &event {
                SocketEvent::Open => *lock(&self.state) = ReadyState::Open,
                SocketEvent::Closed => *lock(&self.state) = ReadyState::Closed,
                _ => {}
            }
            self.listeners.emit(&event);
        }

        fn sent(&self) -> Vec<String> {
            lock(&self.sent).clone()
        }

        fn listener_count(&self) -> usize {
            self.listeners.len()
        }
    }

    impl RawSocket for MockSocket {
        fn send(&self, data: &str) -> Result<(), SocketError> {
            let current = *lock(&self.state);
            if current != ReadyState::Open {
                return Err(SocketError::NotOpen(current));
            }
            lock(&self.sent).push(data.to_string());
            if let Some(reply) = lock(&self.immediate_reply).take() {
                self.listeners.emit(&SocketEvent::Message(reply));
            }
            Ok(())
        }

        fn close(&self) {
            {
                let mut state = lock(&self.state);
                if matches!(*state, ReadyState::Connecting | ReadyState::Open) {
                    *state = ReadyState::Closing;
                }
            }
            if self.auto_close {
                self.fire(SocketEvent::Closed);
            }
        }

        fn ready_state(&self) -> ReadyState {
            *lock(&self.state)
        }

        fn add_listener(&self, listener: crate::ws::socket::EventListener) -> ListenerToken {
            self.listeners.add(listener)
        }

        fn remove_listener(&self, token: ListenerToken) {
            self.listeners.remove(token);
        }
    }

    fn any_contract() -> MessageContract {
        MessageContract {
            inbound: Some(Shape::of_type("any")),
            outbound: Some(Shape::of_type("any")),
        }
    }

    async fn open_channel(socket: Arc<MockSocket>, contract: MessageContract) -> MessageChannel {
        MessageChannel::wrap(
            socket,
            contract,
            Arc::new(BasicValidator),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn already_open_handle_enters_open_immediately() {
        let channel = open_channel(MockSocket::open(), any_contract()).await;
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test]
    async fn open_event_completes_the_handshake() {
        let socket = MockSocket::connecting();
        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Open);
        });
        let channel = MessageChannel::wrap(
            socket,
            any_contract(),
            Arc::new(BasicValidator),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test]
    async fn error_before_open_fails_the_handshake() {
        let socket = MockSocket::connecting();
        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Error("refused".into()));
        });
        let err = MessageChannel::wrap(
            socket,
            any_contract(),
            Arc::new(BasicValidator),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChannelError::Handshake(reason) if reason == "refused"));
    }

    #[tokio::test]
    async fn closed_before_open_fails_distinctly() {
        let socket = MockSocket::connecting();
        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Closed);
        });
        let err = MessageChannel::wrap(
            socket,
            any_contract(),
            Arc::new(BasicValidator),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChannelError::ClosedWhileOpening));
    }

    #[tokio::test]
    async fn bounded_wait_without_events_never_opens() {
        let err = MessageChannel::wrap(
            MockSocket::connecting(),
            any_contract(),
            Arc::new(BasicValidator),
            Duration::from_millis(50),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChannelError::NeverOpened(_)));
    }

    #[tokio::test]
    async fn absent_payload_sends_the_placeholder_token() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;
        channel.send(None).unwrap();
        assert_eq!(socket.sent(), vec![NO_PAYLOAD.to_string()]);
    }

    #[tokio::test]
    async fn outbound_shape_mismatch_raises_before_sending() {
        let socket = MockSocket::open();
        let contract = MessageContract {
            inbound: None,
            outbound: Some(Shape::of_type("number")),
        };
        let channel = open_channel(socket.clone(), contract).await;
        let err = channel.send(Some(&json!("not a number"))).unwrap_err();
        assert!(matches!(err, ChannelError::Shape(_)));
        assert!(socket.sent().is_empty());
    }

    #[tokio::test]
    async fn inbound_shape_mismatch_surfaces_as_typed_event() {
        let socket = MockSocket::open();
        let contract = MessageContract {
            inbound: Some(Shape::of_type("number")),
            outbound: None,
        };
        let channel = open_channel(socket.clone(), contract).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        channel.subscribe(move |event| lock(&sink).push(event));

        socket.fire(SocketEvent::Message("\"text\"".into()));
        socket.fire(SocketEvent::Message("42".into()));

        let events = lock(&events).clone();
        assert!(matches!(&events[0], ChannelEvent::InvalidMessage { .. }));
        assert_eq!(events[1], ChannelEvent::Message(Some(json!(42))));
    }

    #[tokio::test]
    async fn message_when_none_expected_is_an_unexpected_event() {
        let socket = MockSocket::open();
        let contract = MessageContract {
            inbound: None,
            outbound: None,
        };
        let channel = open_channel(socket.clone(), contract).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        channel.subscribe(move |event| lock(&sink).push(event));

        socket.fire(SocketEvent::Message("{}".into()));
        assert!(matches!(
            lock(&events)[0],
            ChannelEvent::Unexpected { .. }
        ));
    }

    #[tokio::test]
    async fn placeholder_frame_is_no_message_not_a_parse_failure() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        channel.subscribe(move |event| lock(&sink).push(event));

        socket.fire(SocketEvent::Message(NO_PAYLOAD.into()));
        assert_eq!(lock(&events)[0], ChannelEvent::Message(None));
    }

    #[tokio::test]
    async fn unsubscribe_detaches_exactly_the_right_listener() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let first_events = Arc::new(Mutex::new(Vec::new()));
        let second_events = Arc::new(Mutex::new(Vec::new()));
        let sink = first_events.clone();
        let first = channel.subscribe(move |event| lock(&sink).push(event));
        let sink = second_events.clone();
        let _second = channel.subscribe(move |event| lock(&sink).push(event));

        assert!(channel.unsubscribe(first));
        assert!(!channel.unsubscribe(first));
        socket.fire(SocketEvent::Message("1".into()));

        assert!(lock(&first_events).is_empty());
        assert_eq!(lock(&second_events).len(), 1);
    }

    #[tokio::test]
    async fn reply_arriving_before_send_returns_is_not_missed() {
        let socket = MockSocket::open();
        *lock(&socket.immediate_reply) = Some("{\"id\":7}".to_string());
        let channel = open_channel(socket.clone(), any_contract()).await;

        let reply = channel
            .send_and_wait_for_reply(Some(&json!({"op": "ping"})), None, None)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"id": 7})));
        assert_eq!(socket.listener_count(), 1, "transient listener removed");
    }

    #[tokio::test]
    async fn first_message_satisfies_an_unpredicated_wait() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Message("\"pong\"".into()));
        });

        let reply = channel
            .send_and_wait_for_reply(None, None, None)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!("pong")));
    }

    #[tokio::test]
    async fn predicate_skips_non_matching_messages() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Message("{\"id\":1}".into()));
            fire.fire(SocketEvent::Message("{\"id\":2}".into()));
        });

        let predicate: ReplyPredicate = Arc::new(|message| {
            message
                .as_ref()
                .and_then(|m| m.get("id"))
                .and_then(Value::as_i64)
                == Some(2)
        });
        let reply = channel
            .send_and_wait_for_reply(None, Some(predicate), None)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"id": 2})));
    }

    #[tokio::test]
    async fn predicate_panic_counts_as_no_match() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Message("\"boom\"".into()));
            fire.fire(SocketEvent::Message("\"fine\"".into()));
        });

        let predicate: ReplyPredicate = Arc::new(|message| {
            if *message == Some(json!("boom")) {
                panic!("predicate blew up");
            }
            true
        });
        let reply = channel
            .send_and_wait_for_reply(None, Some(predicate), None)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!("fine")));
    }

    #[tokio::test]
    async fn reply_wait_times_out_with_a_descriptive_error() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;

        let err = channel
            .send_and_wait_for_reply(None, None, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ReplyTimeout(_)));
        assert!(err.to_string().contains("no qualifying reply"));
        // the channel stays open and the transient listener is gone
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(socket.listener_count(), 1);
    }

    #[tokio::test]
    async fn configured_reply_timeout_is_the_fallback() {
        let socket = MockSocket::open();
        let channel = MessageChannel::wrap(
            socket,
            any_contract(),
            Arc::new(BasicValidator),
            Duration::from_secs(1),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        let err = channel
            .send_and_wait_for_reply(None, None, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ChannelError::ReplyTimeout(t) if t == Duration::from_millis(50)),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn invalid_messages_do_not_satisfy_a_reply_wait() {
        let socket = MockSocket::open();
        let contract = MessageContract {
            inbound: Some(Shape::of_type("number")),
            outbound: Some(Shape::of_type("any")),
        };
        let channel = open_channel(socket.clone(), contract).await;

        let fire = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fire.fire(SocketEvent::Message("\"wrong shape\"".into()));
            fire.fire(SocketEvent::Message("3".into()));
        });

        let reply = channel
            .send_and_wait_for_reply(None, None, None)
            .await
            .unwrap();
        assert_eq!(reply, Some(json!(3)));
    }

    #[tokio::test]
    async fn close_waits_for_the_underlying_close_event() {
        let socket = MockSocket::with_state(ReadyState::Open, false);
        let channel = open_channel(socket.clone(), any_contract()).await;

        let close = channel.close();
        tokio::pin!(close);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut close)
                .await
                .is_err(),
            "close must not resolve before the close event"
        );
        assert_eq!(channel.state(), ChannelState::Closing);

        socket.fire(SocketEvent::Closed);
        tokio::time::timeout(Duration::from_secs(1), close)
            .await
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn close_resolves_when_already_closed() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
        // second close returns immediately
        channel.close().await;
    }

    #[tokio::test]
    async fn close_releases_subscription_registrations() {
        let socket = MockSocket::open();
        let channel = open_channel(socket.clone(), any_contract()).await;
        channel.subscribe(|_| {});
        channel.subscribe(|_| {});
        assert_eq!(socket.listener_count(), 3);
        channel.close().await;
        assert_eq!(socket.listener_count(), 1, "only the core listener remains");
    }
}
