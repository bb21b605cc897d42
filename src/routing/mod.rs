//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     path template string
//!     → template.rs (tokenize, parse groups)
//!     → compiler.rs (expand groups, build anchored alternation)
//!     → Matcher (immutable, reusable)
//!     → router.rs (ordered RouteTable)
//!
//! Incoming Request (path):
//!     → router.rs (first-match lookup)
//!     → compiler.rs (capture + percent-decode params)
//!     → Return: (Route, PathMatch) or explicit None
//! ```
//!
//! # Design Decisions
//! - Templates compiled at startup; compile errors abort startup
//! - Matchers immutable at runtime, shared read-only across tasks
//! - Deterministic: same input always matches the same route
//! - First match wins (registration order)

pub mod compiler;
pub mod router;
pub mod template;

pub use compiler::{Key, KeyKind, Matcher, ParamValue, PathMatch};
pub use router::{EndpointHandler, Route, RouteKind, RouteTable, SocketHandler};
pub use template::{Token, TemplateError};
