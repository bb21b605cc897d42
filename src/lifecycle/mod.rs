//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build route table → Serve
//!
//! Shutdown (shutdown.rs):
//!     ctrl-c → broadcast → axum drains in-flight requests → Exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
