//! Origin requirement variants and evaluation.
//!
//! # Responsibilities
//! - Model the per-scope CORS policy as a tagged variant tree
//! - Evaluate a requirement against a request origin
//!
//! # Design Decisions
//! - "Any origin" is an explicit variant, never a sentinel compared by value
//! - Predicates are async (the only IO-bound step in CORS resolution)
//! - Lists evaluate sequentially and short-circuit on the first allow; this
//!   ordering is a contract because predicates may have side effects
//! - List evaluation never yields Defer; an inner Defer counts as no-allow

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use regex::Regex;

/// Async origin predicate: `fn(origin) -> bool`.
pub type OriginPredicate = Arc<dyn Fn(&str) -> BoxFuture<'static, bool> + Send + Sync>;

/// The configured CORS policy for a scope (service-level or route-level).
#[derive(Clone)]
pub enum OriginRequirement {
    /// Fall through to the next level. Invalid at the service level.
    Defer,
    /// Accept every request origin, including an absent one.
    AnyOrigin,
    /// Exact origin string.
    Literal(String),
    /// Pattern match against the origin.
    Pattern(Regex),
    /// Caller-supplied async decision.
    Predicate(OriginPredicate),
    /// Ordered alternatives; first allow wins.
    List(Vec<OriginRequirement>),
}

impl fmt::Debug for OriginRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginRequirement::Defer => write!(f, "Defer"),
            OriginRequirement::AnyOrigin => write!(f, "AnyOrigin"),
            OriginRequirement::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            OriginRequirement::Pattern(p) => f.debug_tuple("Pattern").field(&p.as_str()).finish(),
            OriginRequirement::Predicate(_) => write!(f, "Predicate(<function>)"),
            OriginRequirement::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

impl OriginRequirement {
    /// Wrap an async closure as a predicate requirement.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> BoxFuture<'static, bool> + Send + Sync + 'static,
    {
        OriginRequirement::Predicate(Arc::new(f))
    }
}

/// Outcome of resolving an origin against the full requirement chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedOrigin {
    Rejected,
    AnyOrigin,
    Literal(String),
}

impl MatchedOrigin {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, MatchedOrigin::Rejected)
    }
}

/// Outcome of evaluating a single requirement level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Allow(MatchedOrigin),
    Reject,
    Defer,
}

/// Evaluate one requirement against the request origin.
///
/// `AnyOrigin` allows even an absent origin; every other variant rejects a
/// request that carries no origin header.
pub fn evaluate<'a>(
    requirement: &'a OriginRequirement,
    origin: Option<&'a str>,
) -> BoxFuture<'a, Evaluation> {
    Box::pin(async move {
        match requirement {
            OriginRequirement::AnyOrigin => Evaluation::Allow(MatchedOrigin::AnyOrigin),
            OriginRequirement::Defer => Evaluation::Defer,
            OriginRequirement::Literal(expected) => match origin {
                Some(origin) if origin == expected => {
                    Evaluation::Allow(MatchedOrigin::Literal(origin.to_string()))
                }
                _ => Evaluation::Reject,
            },
            OriginRequirement::Pattern(pattern) => match origin {
                Some(origin) if pattern.is_match(origin) => {
                    Evaluation::Allow(MatchedOrigin::Literal(origin.to_string()))
                }
                _ => Evaluation::Reject,
            },
            OriginRequirement::Predicate(predicate) => match origin {
                Some(origin) if predicate(origin).await => {
                    Evaluation::Allow(MatchedOrigin::Literal(origin.to_string()))
                }
                _ => Evaluation::Reject,
            },
            OriginRequirement::List(items) => {
                for item in items {
                    if let Evaluation::Allow(matched) = evaluate(item, origin).await {
                        return Evaluation::Allow(matched);
                    }
                }
                Evaluation::Reject
            }
        }
    })
}
