//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::cors::OriginRequirement;
use crate::ws::channel::{DEFAULT_OPEN_TIMEOUT, DEFAULT_REPLY_TIMEOUT};
use crate::ws::subprotocol::SubprotocolContract;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service-level settings, including the origin fallback policy.
    pub service: ServiceConfig,

    /// Route definitions (path templates, kinds, per-route policies).
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Service-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name for logging.
    pub name: String,

    /// Fallback origin policy for routes that defer. Must never be "defer".
    pub origin: OriginConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "wiregate".to_string(),
            origin: OriginConfig::One("any".to_string()),
        }
    }
}

/// Route configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path template (`:name`, `*name`, `{…}` groups, `\` escapes).
    pub path: String,

    /// Endpoint (unary) or socket (duplex).
    #[serde(default)]
    pub kind: RouteKindConfig,

    /// Allowed methods for endpoint routes.
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,

    /// Route-level origin policy; absent means defer to the service level.
    #[serde(default)]
    pub origin: Option<OriginConfig>,

    /// Subprotocol contract for socket routes.
    #[serde(default)]
    pub subprotocol: Option<SubprotocolConfig>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteKindConfig {
    #[default]
    Endpoint,
    Socket,
}

/// Origin policy in config form.
///
/// A bare string is `"any"`, `"defer"`, or a literal origin; a table with a
/// `pattern` key is a regex requirement; a list is ordered alternatives.
/// Predicate requirements exist only in the programmatic API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OriginConfig {
    One(String),
    Pattern { pattern: String },
    Many(Vec<OriginConfig>),
}

impl OriginConfig {
    pub fn to_requirement(&self) -> Result<OriginRequirement, regex::Error> {
        Ok(match self {
            OriginConfig::One(s) => match s.as_str() {
                "any" => OriginRequirement::AnyOrigin,
                "defer" => OriginRequirement::Defer,
                literal => OriginRequirement::Literal(literal.to_string()),
            },
            OriginConfig::Pattern { pattern } => {
                OriginRequirement::Pattern(regex::Regex::new(pattern)?)
            }
            OriginConfig::Many(items) => OriginRequirement::List(
                items
                    .iter()
                    .map(OriginConfig::to_requirement)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}

/// Subprotocol contract in config form.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SubprotocolConfig {
    /// Exactly this token list, in order.
    pub exact: Option<Vec<String>>,

    /// One required literal token…
    pub literal: Option<String>,

    /// …plus this many free-form tokens.
    pub free: usize,
}

impl SubprotocolConfig {
    pub fn to_contract(&self) -> SubprotocolContract {
        if let Some(exact) = &self.exact {
            SubprotocolContract::Exact(exact.clone())
        } else if let Some(literal) = &self.literal {
            SubprotocolContract::LiteralPlusFree {
                literal: literal.clone(),
                free: self.free,
            }
        } else {
            SubprotocolContract::Any
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Bounded wait for a socket to reach Open, in seconds.
    pub open_secs: u64,

    /// Default reply-wait timeout in seconds.
    pub reply_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            open_secs: DEFAULT_OPEN_TIMEOUT.as_secs(),
            reply_secs: DEFAULT_REPLY_TIMEOUT.as_secs(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Whether to expose Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics exporter bind address.
    pub metrics_address: String,

    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
            log_filter: "wiregate=debug,tower_http=debug".to_string(),
        }
    }
}
