//! Route registry and lookup.
//!
//! # Responsibilities
//! - Hold compiled routes with their handlers and policies
//! - Resolve an inbound path to the first matching route
//! - Stay immutable after construction (shared via Arc, no locks)
//!
//! # Design Decisions
//! - Routes are tried in registration order; first match wins
//! - Explicit `None` on no match rather than a silent default
//! - Matchers are compiled once here; a template that fails to compile
//!   prevents the table from being built at all

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::cors::OriginRequirement;
use crate::routing::compiler::{Matcher, PathMatch};
use crate::routing::template::TemplateError;
use crate::ws::channel::{MessageChannel, MessageContract};
use crate::ws::subprotocol::SubprotocolContract;

/// Handler for a unary request/response route.
pub type EndpointHandler =
    Arc<dyn Fn(PathMatch, Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Handler owning a WebSocket connection for its lifetime.
pub type SocketHandler =
    Arc<dyn Fn(MessageChannel, PathMatch) -> BoxFuture<'static, ()> + Send + Sync>;

/// What kind of traffic a route serves.
#[derive(Clone)]
pub enum RouteKind {
    Endpoint {
        methods: Vec<Method>,
        handler: EndpointHandler,
    },
    Socket {
        contract: MessageContract,
        subprotocols: SubprotocolContract,
        handler: SocketHandler,
    },
}

/// A registered route: compiled matcher plus policies and handler.
#[derive(Clone)]
pub struct Route {
    pub name: String,
    matcher: Matcher,
    pub kind: RouteKind,
    /// Route-level origin requirement; `None` defers to the service level.
    pub origin: Option<OriginRequirement>,
}

impl Route {
    pub fn endpoint(
        name: impl Into<String>,
        template: &str,
        methods: Vec<Method>,
        handler: EndpointHandler,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            name: name.into(),
            matcher: Matcher::compile(template)?,
            kind: RouteKind::Endpoint { methods, handler },
            origin: None,
        })
    }

    pub fn socket(
        name: impl Into<String>,
        template: &str,
        contract: MessageContract,
        subprotocols: SubprotocolContract,
        handler: SocketHandler,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            name: name.into(),
            matcher: Matcher::compile(template)?,
            kind: RouteKind::Socket {
                contract,
                subprotocols,
                handler,
            },
            origin: None,
        })
    }

    pub fn with_origin(mut self, origin: OriginRequirement) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Methods advertised in preflight responses.
    pub fn allowed_methods(&self) -> Vec<Method> {
        match &self.kind {
            RouteKind::Endpoint { methods, .. } => methods.clone(),
            RouteKind::Socket { .. } => vec![Method::GET],
        }
    }

    pub fn is_socket(&self) -> bool {
        matches!(self.kind, RouteKind::Socket { .. })
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("template", &self.matcher.template())
            .field(
                "kind",
                &match self.kind {
                    RouteKind::Endpoint { .. } => "endpoint",
                    RouteKind::Socket { .. } => "socket",
                },
            )
            .finish()
    }
}

/// Immutable table of registered routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Resolve a path to the first matching route.
    pub fn resolve(&self, path: &str) -> Option<(&Route, PathMatch)> {
        self.routes
            .iter()
            .find_map(|route| route.matcher.matches(path).map(|m| (route, m)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}
