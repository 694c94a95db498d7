//! Signed license issuance.

use crate::crypto::signing::sign_with_key;
use crate::storage::format::{SUPPORTED_SCHEMA_VERSION, UNSIGNED_FIELDS};
use crate::LicenseGateError;
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};

/// Sign `payload` and return the flattened license document.
///
/// Any signature fields or `schema_version` already in `payload` are
/// dropped first; the result carries `schema_version`, the payload fields,
/// `signature_alg`, `signature_kid` and `signature`.
pub fn issue_license(
    payload: &Value,
    signing_key: &SigningKey,
    key_id: &str,
) -> Result<Value, LicenseGateError> {
    let Value::Object(fields) = payload else {
        return Err(LicenseGateError::LicenseMalformed(
            "license payload must be a JSON object".to_string(),
        ));
    };

    let mut signed = fields.clone();
    for field in UNSIGNED_FIELDS {
        signed.remove(field);
    }
    let block = sign_with_key(&Value::Object(signed.clone()), signing_key, key_id);

    let mut document = serde_json::Map::new();
    document.insert("schema_version".into(), json!(SUPPORTED_SCHEMA_VERSION));
    document.extend(signed);
    document.insert("signature_alg".into(), json!(block.alg));
    document.insert("signature_kid".into(), json!(block.kid));
    document.insert("signature".into(), json!(block.sig));
    Ok(Value::Object(document))
}
