use reflow_value::Value;
use serde::{Deserialize, Serialize};

/// Incoming action dispatched through the registry: a discriminant naming
/// the action's kind plus an optional payload of arbitrary shape.
/// Read-only during reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}
