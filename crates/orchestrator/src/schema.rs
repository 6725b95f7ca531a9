//! Schema registry for inbound completion events.
//!
//! Validation is a pure function of `(event_type, payload, registry)`. A
//! rejected event never reaches the ledger, so a redelivery is validated
//! again from scratch.

use std::collections::HashMap;

use matchflow_bus::topics;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("{event_type}: field '{field}' {reason}")]
    SchemaViolation {
        event_type: String,
        field: String,
        reason: String,
    },
}

impl SchemaError {
    fn violation(event_type: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            event_type: event_type.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string.
    Identifier,
    String,
    Bool,
    Integer,
    Number,
    Object,
    Array,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Identifier => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            FieldKind::String => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::Identifier => "a non-empty string",
            FieldKind::String => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Integer => "an integer",
            FieldKind::Number => "a number",
            FieldKind::Object => "an object",
            FieldKind::Array => "an array",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Declared shape of one event type. Extra fields are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub event_type: String,
    pub fields: Vec<FieldSpec>,
}

impl EventSchema {
    /// A schema carrying the fields every event needs: `event_id` and `job_id`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Vec::new(),
        }
        .required("event_id", FieldKind::Identifier)
        .required("job_id", FieldKind::Identifier)
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// A field that may be absent (or null) but must have `kind` when present.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    fn check(&self, payload: &Value) -> Result<(), SchemaError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| SchemaError::violation(&self.event_type, "$", "payload must be an object"))?;

        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::violation(&self.event_type, &field.name, "is missing"));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.matches(value) => {
                    return Err(SchemaError::violation(
                        &self.event_type,
                        &field.name,
                        format!("must be {}", field.kind.describe()),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Registered schemas keyed by event type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, EventSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every completion event the orchestrator consumes.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for event_type in topics::COMPLETION_EVENTS {
            let schema = EventSchema::new(event_type);
            let schema = if event_type == topics::VIDEO_KEYPOINTS_COMPLETED {
                schema.optional("has_partial_completion", FieldKind::Bool)
            } else {
                schema
            };
            registry.register(schema);
        }
        registry
    }

    /// Add a schema, replacing any previous one for the same event type.
    pub fn register(&mut self, schema: EventSchema) {
        self.schemas.insert(schema.event_type.clone(), schema);
    }

    /// Registered event types, sorted for stable subscription order.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.schemas.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn validate(&self, event_type: &str, payload: &Value) -> Result<(), SchemaError> {
        let schema = self
            .schemas
            .get(event_type)
            .ok_or_else(|| SchemaError::UnknownEventType(event_type.to_string()))?;
        schema.check(payload)
    }
}
