//! Normalisation of older license document shapes.
//!
//! Handled shapes:
//! - `{ "schema_version"?, "payload": {...}, "signature": "..." | {"alg", "sig", "kid"?} }`
//!   is flattened into the top-level form
//! - `fingerprint.hash` is aliased to `fingerprint.fingerprint_hash`
//!
//! Pure: no I/O, so the migration can be tested on its own.

use crate::storage::format::SUPPORTED_SCHEMA_VERSION;
use crate::LicenseGateError;
use serde_json::{Map, Value};

/// Output of [`normalize_license_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Top-level license document.
    pub document: Map<String, Value>,
    /// `fingerprint.fingerprint_hash` was copied from a legacy `hash` key.
    pub aliased_fingerprint_hash: bool,
}

/// Bring a license document into the current top-level shape.
pub fn normalize_license_document(raw: Value) -> Result<Normalized, LicenseGateError> {
    let Value::Object(mut doc) = raw else {
        return Err(LicenseGateError::LicenseMalformed(
            "license document must be a JSON object".to_string(),
        ));
    };

    if matches!(doc.get("payload"), Some(Value::Object(_))) {
        doc = flatten_wrapper(doc);
    }

    let mut aliased_fingerprint_hash = false;
    if let Some(Value::Object(fp)) = doc.get_mut("fingerprint") {
        if !fp.contains_key("fingerprint_hash") {
            if let Some(hash) = fp.get("hash").cloned() {
                fp.insert("fingerprint_hash".to_string(), hash);
                aliased_fingerprint_hash = true;
            }
        }
    }

    Ok(Normalized {
        document: doc,
        aliased_fingerprint_hash,
    })
}

fn flatten_wrapper(mut wrapper: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(
        "schema_version".to_string(),
        wrapper
            .remove("schema_version")
            .unwrap_or_else(|| Value::from(SUPPORTED_SCHEMA_VERSION)),
    );

    if let Some(Value::Object(payload)) = wrapper.remove("payload") {
        out.extend(payload);
    }

    match wrapper.remove("signature") {
        Some(Value::Object(mut sig)) => {
            out.insert(
                "signature_alg".to_string(),
                sig.remove("alg").unwrap_or(Value::Null),
            );
            if let Some(kid) = sig.remove("kid") {
                out.insert("signature_kid".to_string(), kid);
            }
            out.insert(
                "signature".to_string(),
                sig.remove("sig").unwrap_or(Value::Null),
            );
        }
        Some(other) => {
            out.insert("signature".to_string(), other);
        }
        None => {}
    }

    out
}
