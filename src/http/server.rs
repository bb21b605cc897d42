//! HTTP server and request dispatcher.
//!
//! # Responsibilities
//! - Accept every inbound request on a catch-all route
//! - Resolve the path against the route table
//! - Enforce the origin policy (preflight answered here, terminally)
//! - Negotiate WebSocket subprotocols and hand upgraded sockets to their
//!   route handlers as message channels
//!
//! # Design Decisions
//! - One axum catch-all; path matching is our own compiler, not axum's
//! - Origin rejection is 403 for real requests but still 204 for preflight
//! - A socket route reached without an Upgrade header is a 400, not a 426;
//!   browsers surface the body of a 400
//! - Handler responses pass back through `apply_allow_headers` so admitted
//!   origins are echoed on the actual response, not just the preflight

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::cors::{self, OriginRequirement};
use crate::http::request::{request_id, RequestIdLayer};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{RouteKind, RouteTable};
use crate::shape::ShapeValidator;
use crate::ws::channel::MessageChannel;
use crate::ws::socket::AxumSocket;
use crate::ws::subprotocol::{SubprotocolContract, SubprotocolSet};

/// Shared state handed to the dispatcher.
#[derive(Clone)]
pub struct GatewayState {
    pub table: Arc<RouteTable>,
    pub service_origin: Arc<OriginRequirement>,
    pub validator: Arc<dyn ShapeValidator>,
    pub open_timeout: Duration,
    pub reply_timeout: Duration,
}

/// The gateway HTTP server.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(
        config: &GatewayConfig,
        table: Arc<RouteTable>,
        service_origin: OriginRequirement,
        validator: Arc<dyn ShapeValidator>,
    ) -> Self {
        let state = GatewayState {
            table,
            service_origin: Arc::new(service_origin),
            validator,
            open_timeout: Duration::from_secs(config.timeouts.open_secs),
            reply_timeout: Duration::from_secs(config.timeouts.reply_secs),
        };
        Self {
            router: build_router(state, Duration::from_secs(config.timeouts.request_secs)),
        }
    }

    /// The composed router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on an already-bound listener until ctrl-c.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        if let Ok(address) = listener.local_addr() {
            info!(address = %address, "Gateway listening");
        }

        let shutdown = Shutdown::on_ctrl_c();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.triggered())
            .await
    }
}

/// Build the router: one catch-all dispatcher wrapped in the middleware
/// stack (request ids outermost, then tracing, then the request timeout).
pub fn build_router(state: GatewayState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", any(dispatch))
        .route("/{*path}", any(dispatch))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(RequestIdLayer)
        .with_state(state)
}

async fn dispatch(
    State(state): State<GatewayState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let id = request_id(&request).to_string();
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let Some((route, path_match)) = state.table.resolve(&path) else {
        debug!(request_id = %id, path = %path, "No route matched");
        metrics::record_request("unmatched", 404, started);
        return (StatusCode::NOT_FOUND, "no matching route").into_response();
    };
    let route_name = route.name.clone();

    // Preflight is terminal: answered here, never dispatched onward.
    if method == Method::OPTIONS {
        let matched = match cors::resolve(
            route.origin.as_ref(),
            &state.service_origin,
            origin.as_deref(),
        )
        .await
        {
            Ok(matched) => matched,
            Err(e) => return misconfigured(&id, &route_name, e, started),
        };
        if !matched.is_allowed() {
            debug!(request_id = %id, route = %route_name, origin = ?origin, "Preflight origin rejected");
        }
        let response = cors::preflight_response(&matched, &route.allowed_methods());
        metrics::record_request(&route_name, response.status().as_u16(), started);
        return response;
    }

    let matched = match cors::resolve(
        route.origin.as_ref(),
        &state.service_origin,
        origin.as_deref(),
    )
    .await
    {
        Ok(matched) => matched,
        Err(e) => return misconfigured(&id, &route_name, e, started),
    };
    if !matched.is_allowed() {
        warn!(request_id = %id, route = %route_name, origin = ?origin, "Origin rejected");
        metrics::record_cors_rejection(&route_name);
        metrics::record_request(&route_name, 403, started);
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    match &route.kind {
        RouteKind::Endpoint { methods, handler } => {
            if !methods.contains(&method) {
                metrics::record_request(&route_name, 405, started);
                return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
            }
            let handler = handler.clone();
            let mut response = handler(path_match, request).await;
            cors::apply_allow_headers(response.headers_mut(), &matched);
            metrics::record_request(&route_name, response.status().as_u16(), started);
            response
        }
        RouteKind::Socket {
            contract,
            subprotocols,
            handler,
        } => {
            let upgrade = match upgrade {
                Ok(upgrade) => upgrade,
                Err(rejection) => {
                    debug!(request_id = %id, route = %route_name, "Socket route hit without upgrade");
                    metrics::record_request(&route_name, 400, started);
                    return (
                        StatusCode::BAD_REQUEST,
                        format!("websocket upgrade required: {rejection}"),
                    )
                        .into_response();
                }
            };

            let offered = match request
                .headers()
                .get(header::SEC_WEBSOCKET_PROTOCOL)
                .and_then(|value| value.to_str().ok())
            {
                Some(raw) => match SubprotocolSet::parse(raw) {
                    Ok(set) => Some(set),
                    Err(e) => {
                        warn!(request_id = %id, route = %route_name, error = %e, "Bad subprotocol header");
                        metrics::record_request(&route_name, 400, started);
                        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
                    }
                },
                None => None,
            };

            let chosen = match (&offered, subprotocols) {
                (None, SubprotocolContract::Any) => None,
                (None, _) => {
                    metrics::record_request(&route_name, 400, started);
                    return (StatusCode::BAD_REQUEST, "subprotocol required").into_response();
                }
                (Some(set), contract) => match contract.check(set) {
                    Ok(()) => contract.negotiate(set).map(str::to_owned),
                    Err(e) => {
                        warn!(request_id = %id, route = %route_name, error = %e, "Subprotocol contract violated");
                        metrics::record_request(&route_name, 400, started);
                        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
                    }
                },
            };

            let upgrade = match &chosen {
                Some(protocol) => upgrade.protocols([protocol.clone()]),
                None => upgrade,
            };

            let contract = contract.clone();
            let handler = handler.clone();
            let validator = state.validator.clone();
            let open_timeout = state.open_timeout;
            let reply_timeout = state.reply_timeout;
            let connection_id = id.clone();
            let label = route_name.clone();
            let mut response = upgrade.on_upgrade(move |ws| async move {
                metrics::channel_opened();
                let raw = AxumSocket::spawn(ws);
                match MessageChannel::wrap(raw, contract, validator, open_timeout, reply_timeout)
                    .await
                {
                    Ok(channel) => handler(channel, path_match).await,
                    Err(e) => {
                        warn!(request_id = %connection_id, route = %label, error = %e, "Channel never opened")
                    }
                }
                metrics::channel_closed();
            });
            cors::apply_allow_headers(response.headers_mut(), &matched);
            metrics::record_request(&route_name, response.status().as_u16(), started);
            response
        }
    }
}

fn misconfigured(id: &str, route: &str, error: cors::CorsError, started: Instant) -> Response {
    error!(request_id = %id, route = %route, error = %error, "Origin policy misconfigured");
    metrics::record_request(route, 500, started);
    (StatusCode::INTERNAL_SERVER_ERROR, "origin policy misconfigured").into_response()
}
