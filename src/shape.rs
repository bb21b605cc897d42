//! Message-shape validation seam.
//!
//! # Responsibilities
//! - Define the `ShapeValidator` interface consumed by the message channel
//!   and request-body validation
//! - Ship a minimal structural validator for dispatch and tests
//!
//! # Design Decisions
//! - Schema validation proper is an external collaborator; this crate only
//!   owns the seam and a basic structural checker
//! - Shapes are plain JSON descriptions so routes can declare them in config

use serde_json::Value;
use thiserror::Error;

/// Reason a value failed shape validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ShapeError {
    reason: String,
}

impl ShapeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// An externally supplied schema describing an expected runtime value.
///
/// The description is a JSON object with a `type` tag (`"string"`, `"number"`,
/// `"boolean"`, `"object"`, `"array"`, `"any"`) and, for objects, optional
/// `properties` and `required` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape(Value);

impl Shape {
    pub fn new(description: Value) -> Self {
        Self(description)
    }

    pub fn description(&self) -> &Value {
        &self.0
    }

    /// Shorthand for a bare `{"type": …}` shape.
    pub fn of_type(type_name: &str) -> Self {
        Self(serde_json::json!({ "type": type_name }))
    }
}

/// Collaborator interface: given a shape and a value, decide valid/invalid
/// with a reason.
pub trait ShapeValidator: Send + Sync {
    fn validate(&self, shape: &Shape, value: &Value) -> Result<(), ShapeError>;
}

/// Structural validator covering type tags, object properties and required
/// keys. Enough for routing-layer contracts; anything richer belongs to the
/// external schema engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl BasicValidator {
    fn check(&self, description: &Value, value: &Value, path: &str) -> Result<(), ShapeError> {
        let type_tag = description
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("any");

        let matches = match type_tag {
            "any" => true,
            "string" => value.is_string(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            other => {
                return Err(ShapeError::new(format!(
                    "unknown shape type {other:?} at {path}"
                )))
            }
        };
        if !matches {
            return Err(ShapeError::new(format!(
                "expected {type_tag} at {path}, got {}",
                type_name(value)
            )));
        }

        if type_tag == "object" {
            let fields = value.as_object().unwrap_or_else(|| unreachable!());
            if let Some(required) = description.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !fields.contains_key(key) {
                        return Err(ShapeError::new(format!(
                            "missing required property {key:?} at {path}"
                        )));
                    }
                }
            }
            if let Some(props) = description.get("properties").and_then(Value::as_object) {
                for (key, sub) in props {
                    if let Some(field) = fields.get(key) {
                        self.check(sub, field, &format!("{path}.{key}"))?;
                    }
                }
            }
        }

        Ok(())
    }
}

impl ShapeValidator for BasicValidator {
    fn validate(&self, shape: &Shape, value: &Value) -> Result<(), ShapeError> {
        self.check(shape.description(), value, "$")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
