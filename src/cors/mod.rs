//! Cross-origin policy subsystem.
//!
//! # Data Flow
//! ```text
//! Request origin header
//!     → resolver.rs (route requirement, then service fallback)
//!     → requirement.rs (evaluate one tagged-variant tree)
//!     → MatchedOrigin (Rejected | AnyOrigin | Literal)
//!     → preflight: terminal 204 with decision-dependent headers
//!     → otherwise: 403 on reject, allow headers attached on admit
//! ```
//!
//! # Design Decisions
//! - Requirement trees are built at service-definition time and shared
//!   read-only across tasks
//! - Predicate evaluation is the only suspension point in resolution
//! - Sequential list evaluation is a guaranteed contract

pub mod requirement;
pub mod resolver;

pub use requirement::{evaluate, Evaluation, MatchedOrigin, OriginPredicate, OriginRequirement};
pub use resolver::{apply_allow_headers, preflight_response, resolve, CorsError};
