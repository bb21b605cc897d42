//! WebSocket negotiation and messaging subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request
//!     → subprotocol.rs (parse Sec-WebSocket-Protocol, check route contract)
//!     → http server completes the handshake
//!     → socket.rs (raw duplex handle + event pump)
//!     → channel.rs (shape-checked, correlated MessageChannel)
//!     → route's socket handler owns the channel until close
//! ```
//!
//! # Design Decisions
//! - The raw handle is a trait seam so tests can script connections
//! - All per-connection state lives in the channel that owns it; nothing is
//!   shared across connections

pub mod channel;
pub mod socket;
pub mod subprotocol;

pub use channel::{
    ChannelError, ChannelEvent, ChannelState, MessageChannel, MessageContract, ReplyPredicate,
    SubscriptionId, DEFAULT_OPEN_TIMEOUT, DEFAULT_REPLY_TIMEOUT, NO_PAYLOAD,
};
pub use socket::{
    AxumSocket, EventListener, ListenerRegistry, ListenerToken, RawSocket, ReadyState, SocketError,
    SocketEvent,
};
pub use subprotocol::{SubprotocolContract, SubprotocolError, SubprotocolSet};
