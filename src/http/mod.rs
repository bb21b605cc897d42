//! HTTP server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP accept (axum)
//!     → request.rs (x-request-id stamped)
//!     → server.rs dispatch (route table lookup)
//!     → origin policy → preflight / 403 / onward
//!     → endpoint handler, or ws upgrade → channel → socket handler
//! ```
//!
//! # Design Decisions
//! - axum carries the connection; route semantics live in `routing`
//! - The dispatcher is a plain async fn so tests can drive the router
//!   in-process with `tower::ServiceExt::oneshot`

pub mod request;
pub mod server;

pub use request::{request_id, RequestIdLayer, X_REQUEST_ID};
pub use server::{build_router, GatewayServer, GatewayState};
