//! Deterministic JSON encoding used as the exact input to signing.
//!
//! Rules:
//! - object keys are emitted in ascending byte order, whatever the insertion order
//! - arrays keep their order
//! - scalars use `serde_json`'s compact encoding (no slash or unicode escaping,
//!   shortest round-trip floats, exact integers)
//! - no insignificant whitespace

use crate::LicenseGateError;
use serde::Serialize;
use serde_json::Value;

/// Canonical bytes of a JSON value.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_value(value, &mut out);
    out.into_bytes()
}

/// Canonical bytes of any serializable value.
pub fn canonicalize_serializable<T: Serialize>(value: &T) -> Result<Vec<u8>, LicenseGateError> {
    let value = serde_json::to_value(value)
        .map_err(|e| LicenseGateError::ProtocolError(format!("Cannot canonicalize: {}", e)))?;
    Ok(canonicalize(&value))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Scalars: Value's Display is the compact JSON encoding.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
