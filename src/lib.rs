//! Request routing and negotiation layer for RPC over HTTP and WebSocket.

pub mod config;
pub mod cors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod shape;
pub mod ws;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
