//! Two-level origin resolution and CORS response headers.
//!
//! # Responsibilities
//! - Resolve route-level then service-level requirements
//! - Build preflight (OPTIONS) responses
//! - Attach allow headers to admitted responses
//!
//! # Design Decisions
//! - A service-level Defer is a configuration error, reported distinctly
//!   from a request-level rejection
//! - Preflight is terminal: answered directly, 204 either way, with the
//!   allow-origin header omitted entirely on rejection
//! - Literal origins get credentials + `Vary: Origin`; the wildcard never
//!   carries a credentials header

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use thiserror::Error;
use tracing::warn;

use crate::cors::requirement::{evaluate, Evaluation, MatchedOrigin, OriginRequirement};

/// Fixed preflight allow-list.
pub const ALLOWED_HEADERS: &str = "Cookie, Authorization, Content-Type";

/// Fixed preflight cache lifetime, in seconds.
pub const MAX_AGE_SECS: u32 = 3600;

/// Configuration-level failures in origin resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorsError {
    /// The service-level requirement must decide; Defer there means the
    /// service was misconfigured, not that the request was bad.
    #[error("service-level origin requirement resolved to Defer")]
    ServiceLevelDefer,
}

/// Resolve the request origin for a route.
///
/// The route's own requirement is consulted first; Defer falls back to the
/// owning service's requirement.
pub async fn resolve(
    route: Option<&OriginRequirement>,
    service: &OriginRequirement,
    origin: Option<&str>,
) -> Result<MatchedOrigin, CorsError> {
    if let Some(requirement) = route {
        match evaluate(requirement, origin).await {
            Evaluation::Allow(matched) => return Ok(matched),
            Evaluation::Reject => return Ok(MatchedOrigin::Rejected),
            Evaluation::Defer => {}
        }
    }
    match evaluate(service, origin).await {
        Evaluation::Allow(matched) => Ok(matched),
        Evaluation::Reject => Ok(MatchedOrigin::Rejected),
        Evaluation::Defer => Err(CorsError::ServiceLevelDefer),
    }
}

/// Attach `Access-Control-Allow-Origin` (and companions) for an admitted
/// request. No-op on rejection.
pub fn apply_allow_headers(headers: &mut HeaderMap, matched: &MatchedOrigin) {
    match matched {
        MatchedOrigin::Rejected => {}
        MatchedOrigin::AnyOrigin => {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        }
        MatchedOrigin::Literal(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
                headers.insert(header::VARY, HeaderValue::from_static("Origin"));
            }
            Err(_) => {
                warn!(origin = %origin, "Origin not representable as a header value, omitting allow headers");
            }
        },
    }
}

/// Build the terminal preflight response.
///
/// Always 204; header content depends on the decision. `Content-Length: 0`
/// is set explicitly because several clients stall on an empty 204 body
/// without it.
pub fn preflight_response(matched: &MatchedOrigin, methods: &[Method]) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .unwrap_or_else(|_| Response::new(Body::empty()));
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));

    if matched.is_allowed() {
        apply_allow_headers(headers, matched);
        let joined = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&joined) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_str(&MAX_AGE_SECS.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("3600")),
        );
    }

    response
}
