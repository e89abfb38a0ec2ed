//! Required-field validation for decoded uploads.
//!
//! The rules live in [`REQUIRED_FIELDS`], an explicit list evaluated against a
//! [`MeasurementPayload`]. "Required" means present with a value of the right
//! type; zero is a perfectly good value.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Measurement, MeasurementPayload};

/// JSON shape a required field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A string with at least one character.
    NonEmptyText,
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::NonEmptyText => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::NonEmptyText => f.write_str("string"),
            FieldKind::Number => f.write_str("number"),
            FieldKind::Integer => f.write_str("integer"),
        }
    }
}

/// One required-field constraint.
#[derive(Clone, Copy)]
pub struct FieldRule {
    /// Field name as it appears on the wire.
    pub field: &'static str,
    pub kind: FieldKind,
    read: fn(&MeasurementPayload) -> Option<&Value>,
}

impl FieldRule {
    /// Check this rule against a payload.
    pub fn check(&self, payload: &MeasurementPayload) -> Option<Violation> {
        let field = self.field;
        match (self.read)(payload) {
            None => Some(Violation::Missing { field }),
            Some(value) if !self.kind.accepts(value) => Some(Violation::WrongType {
                field,
                expected: self.kind,
            }),
            Some(Value::String(text)) if text.is_empty() => Some(Violation::Empty { field }),
            Some(_) => None,
        }
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Fields every persisted measurement must carry.
pub const REQUIRED_FIELDS: &[FieldRule] = &[
    FieldRule {
        field: "browserID",
        kind: FieldKind::NonEmptyText,
        read: browser_id,
    },
    FieldRule {
        field: "download",
        kind: FieldKind::Number,
        read: download,
    },
    FieldRule {
        field: "upload",
        kind: FieldKind::Number,
        read: upload,
    },
    FieldRule {
        field: "latency",
        kind: FieldKind::Integer,
        read: latency,
    },
];

fn browser_id(p: &MeasurementPayload) -> Option<&Value> {
    p.browser_id.as_ref()
}

fn download(p: &MeasurementPayload) -> Option<&Value> {
    p.download.as_ref()
}

fn upload(p: &MeasurementPayload) -> Option<&Value> {
    p.upload.as_ref()
}

fn latency(p: &MeasurementPayload) -> Option<&Value> {
    p.latency.as_ref()
}

/// A single broken constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    Missing {
        field: &'static str,
    },
    WrongType {
        field: &'static str,
        expected: FieldKind,
    },
    Empty {
        field: &'static str,
    },
}

impl Violation {
    pub fn field(&self) -> &'static str {
        match self {
            Violation::Missing { field }
            | Violation::WrongType { field, .. }
            | Violation::Empty { field } => field,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing { field } => write!(f, "{field} is required"),
            Violation::WrongType { field, expected } => {
                write!(f, "{field} must be of type {expected}")
            }
            Violation::Empty { field } => write!(f, "{field} must not be empty"),
        }
    }
}

/// Every violation found in one payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid measurement: {}", summary(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn summary(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Evaluate [`REQUIRED_FIELDS`] and build the typed record.
///
/// The returned measurement has no `id` and no `timestamp`; both are assigned
/// later by the handler and the store.
pub fn validate(payload: MeasurementPayload) -> Result<Measurement, ValidationError> {
    let violations: Vec<Violation> = REQUIRED_FIELDS
        .iter()
        .filter_map(|rule| rule.check(&payload))
        .collect();

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let (Some(browser_id), Some(download), Some(upload), Some(latency)) = (
        payload.browser_id.as_ref().and_then(Value::as_str),
        payload.download.as_ref().and_then(Value::as_f64),
        payload.upload.as_ref().and_then(Value::as_f64),
        payload.latency.as_ref().and_then(Value::as_i64),
    ) else {
        // Only reachable when a u64 latency overflows i64.
        return Err(ValidationError {
            violations: vec![Violation::WrongType {
                field: "latency",
                expected: FieldKind::Integer,
            }],
        });
    };

    Ok(Measurement {
        id: 0,
        timestamp: None,
        uuid: payload.uuid.filter(|uuid| !uuid.is_empty()),
        browser_id: browser_id.to_owned(),
        device_type: payload.device_type.unwrap_or_default(),
        notes: payload.notes.unwrap_or_default(),
        client_info: payload.client_info,
        server_info: payload.server_info,
        download,
        upload,
        latency,
        results: payload.results.unwrap_or_default(),
    })
}
