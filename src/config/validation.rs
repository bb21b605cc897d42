//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route template; a template error here aborts startup
//! - Enforce the service-level origin invariant (never "defer")
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<…>>
//! - Runs before the config is accepted into the system

use std::collections::HashSet;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, RouteKindConfig};
use crate::cors::OriginRequirement;
use crate::routing::compiler::Matcher;
use crate::routing::template::TemplateError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("route {route:?}: invalid path template: {source}")]
    Template {
        route: String,
        source: TemplateError,
    },
    #[error("service-level origin requirement must not be \"defer\"")]
    ServiceDefer,
    #[error("service-level origin pattern invalid: {reason}")]
    ServiceOriginPattern { reason: String },
    #[error("route {route:?}: origin pattern invalid: {reason}")]
    OriginPattern { route: String, reason: String },
    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),
    #[error("route {route:?}: endpoint routes need at least one method")]
    NoMethods { route: String },
    #[error("route {route:?}: unknown method {method:?}")]
    BadMethod { route: String, method: String },
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.service.origin.to_requirement() {
        Ok(OriginRequirement::Defer) => errors.push(ValidationError::ServiceDefer),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::ServiceOriginPattern {
            reason: e.to_string(),
        }),
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if !seen.insert(route.name.clone()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if let Err(source) = Matcher::compile(&route.path) {
            errors.push(ValidationError::Template {
                route: route.name.clone(),
                source,
            });
        }

        if let Some(origin) = &route.origin {
            if let Err(e) = origin.to_requirement() {
                errors.push(ValidationError::OriginPattern {
                    route: route.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if route.kind == RouteKindConfig::Endpoint {
            if route.methods.is_empty() {
                errors.push(ValidationError::NoMethods {
                    route: route.name.clone(),
                });
            }
            for method in &route.methods {
                if Method::from_str(method).is_err() {
                    errors.push(ValidationError::BadMethod {
                        route: route.name.clone(),
                        method: method.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> GatewayConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let cfg = config(
            r#"
            [[routes]]
            name = "users"
            path = "/users/:id"
            methods = ["GET", "POST"]
            "#,
        );
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn bad_template_is_fatal() {
        let cfg = config(
            r#"
            [[routes]]
            name = "broken"
            path = "/x/:a:b"
            "#,
        );
        let errors = validate_config(&cfg).unwrap_err();
        assert!(matches!(errors[0], ValidationError::Template { .. }));
    }

    #[test]
    fn service_defer_is_a_configuration_error() {
        let cfg = config(
            r#"
            [service]
            origin = "defer"
            "#,
        );
        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ServiceDefer]);
    }

    #[test]
    fn all_errors_are_collected() {
        let cfg = config(
            r#"
            [service]
            origin = "defer"

            [[routes]]
            name = "dup"
            path = "/a"

            [[routes]]
            name = "dup"
            path = "/b{"
            methods = []
            "#,
        );
        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors.len() >= 4, "got: {errors:?}");
        assert!(errors.contains(&ValidationError::ServiceDefer));
        assert!(errors.contains(&ValidationError::DuplicateRoute("dup".into())));
    }
}
