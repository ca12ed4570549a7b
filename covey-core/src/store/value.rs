//! Typed column values
//!
//! Field extraction happens at the HTTP boundary, not via reflection: a
//! JSON body is folded into [`FieldValue`]s once, and everything past that
//! point works with the typed form. Composite values survive as an opaque
//! JSON blob; values with no transport-safe form are dropped with a logged
//! warning and never fail the originating write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value in a row or replication message
///
/// Serializes untagged, so the wire form is plain JSON: `42`, `"name"`,
/// `true`, `null`, or the raw array/object for the blob fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// SQL NULL / JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text (timestamps travel as RFC 3339 text)
    Text(String),
    /// Opaque JSON blob fallback for composite values
    Json(serde_json::Value),
}

impl FieldValue {
    /// Convert a JSON value into its typed form
    ///
    /// Returns `None` for values with no transport-safe representation
    /// (numbers that fit neither `i64` nor a finite `f64`).
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Some(Self::Float(f)),
                        _ => None,
                    }
                }
            }
            serde_json::Value::String(s) => Some(Self::Text(s)),
            composite @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Some(Self::Json(composite))
            }
        }
    }
}

/// Fold a JSON object into a typed field map
///
/// Unrepresentable values are dropped with a warning; the write itself is
/// never failed on their account.
pub fn sanitize_fields(object: serde_json::Map<String, serde_json::Value>) -> Fields {
    let mut fields = BTreeMap::new();

    for (column, value) in object {
        match FieldValue::from_json(value) {
            Some(value) => {
                fields.insert(column, value);
            }
            None => {
                tracing::warn!("Dropping unrepresentable value for column {}", column);
            }
        }
    }

    fields
}

/// Column-to-value mapping used by rows and replication messages
pub type Fields = BTreeMap<String, FieldValue>;
