//! License signature pipeline.
//!
//! 1. Reject unsupported algorithms and missing signatures
//! 2. Rebuild the signed payload (signature fields and `schema_version` removed)
//! 3. Canonicalize
//! 4. Verify Ed25519

use crate::crypto::canonical::canonicalize;
use crate::crypto::signing::SIGNATURE_ALG;
use crate::crypto::verify::verify_ed25519;
use crate::storage::format::License;
use ed25519_dalek::VerifyingKey;

/// Whether `license` carries a valid signature from `verifying_key`.
///
/// Never errors: anything malformed is simply "not verified".
pub fn verify_license(license: &License, verifying_key: &VerifyingKey) -> bool {
    let Some(signature) = license.signature.as_deref() else {
        return false;
    };

    if let Some(alg) = license.signature_alg.as_deref() {
        if !alg.eq_ignore_ascii_case(SIGNATURE_ALG) {
            return false;
        }
    }

    let message = canonicalize(&license.signed_payload());
    verify_ed25519(signature, &message, verifying_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::{decode_signing_key, sign_with_key, DEFAULT_KEY_ID};
    use crate::crypto::verify::decode_public_key;
    use serde_json::{json, Value};

    const TEST_SEED_B64: &str = "nWGxne/9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A=";
    const TEST_PUBLIC_KEY_B64: &str = "11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=";

    fn payload() -> Value {
        json!({
            "license_id": "LIC-1",
            "product_id": "calcpro_calculator",
            "status": "ACTIVE",
            "expires_at": "2030-01-01T00:00:00+00:00",
            "fingerprint": {"mode": "machine", "bound": true, "fingerprint_hash": "sha256:abc"},
            "policy": {"check_interval_days": 30, "warn_after_days": 180, "max_offline_days": 365}
        })
    }

    fn signed_document(payload: &Value) -> Value {
        let key = decode_signing_key(TEST_SEED_B64).unwrap();
        let block = sign_with_key(payload, &key, DEFAULT_KEY_ID);
        let mut doc = payload.as_object().unwrap().clone();
        doc.insert("schema_version".into(), json!(1));
        doc.insert("signature_alg".into(), json!(block.alg));
        doc.insert("signature_kid".into(), json!(block.kid));
        doc.insert("signature".into(), json!(block.sig));
        Value::Object(doc)
    }

    fn public_key() -> VerifyingKey {
        decode_public_key(TEST_PUBLIC_KEY_B64).unwrap()
    }

    #[test]
    fn verifies_signed_license() {
        let license = License::from_value(signed_document(&payload())).unwrap();
        assert!(verify_license(&license, &public_key()));
    }

    #[test]
    fn key_order_does_not_matter() {
        let doc = signed_document(&payload());
        // Re-parse from text with keys in a different order.
        let mut entries: Vec<(String, Value)> = doc.as_object().unwrap().clone().into_iter().collect();
        entries.reverse();
        let reordered = format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect::<Vec<_>>()
                .join(",")
        );
        let license = License::from_json(&reordered).unwrap();
        assert!(verify_license(&license, &public_key()));
    }

    #[test]
    fn any_value_change_breaks_signature() {
        let mut doc = signed_document(&payload());
        doc["expires_at"] = json!("2099-01-01T00:00:00+00:00");
        let license = License::from_value(doc).unwrap();
        assert!(!verify_license(&license, &public_key()));

        let mut doc = signed_document(&payload());
        doc["fingerprint"]["bound"] = json!(false);
        let license = License::from_value(doc).unwrap();
        assert!(!verify_license(&license, &public_key()));
    }

    #[test]
    fn schema_version_is_not_signed() {
        let mut doc = signed_document(&payload());
        doc["schema_version"] = json!(7);
        let license = License::from_value(doc).unwrap();
        assert!(verify_license(&license, &public_key()));
    }

    #[test]
    fn other_key_fails() {
        let license = License::from_value(signed_document(&payload())).unwrap();
        let other = crate::crypto::signing::generate_keypair();
        let other_key = decode_public_key(&other.public_key_b64).unwrap();
        assert!(!verify_license(&license, &other_key));
    }

    #[test]
    fn missing_or_garbled_signature_fails_closed() {
        let mut doc = signed_document(&payload());
        doc.as_object_mut().unwrap().remove("signature");
        assert!(!verify_license(&License::from_value(doc).unwrap(), &public_key()));

        let mut doc = signed_document(&payload());
        doc["signature"] = json!("%%% not base64 %%%");
        assert!(!verify_license(&License::from_value(doc).unwrap(), &public_key()));
    }

    #[test]
    fn unsupported_algorithm_fails() {
        let mut doc = signed_document(&payload());
        doc["signature_alg"] = json!("rsa-sha256");
        assert!(!verify_license(&License::from_value(doc).unwrap(), &public_key()));
    }

    #[test]
    fn legacy_wrapper_with_hash_alias_still_verifies() {
        let mut legacy_payload = payload();
        let fp = legacy_payload["fingerprint"].as_object_mut().unwrap();
        fp.remove("fingerprint_hash");
        fp.insert("hash".into(), json!("sha256:abc"));

        let key = decode_signing_key(TEST_SEED_B64).unwrap();
        let block = sign_with_key(&legacy_payload, &key, DEFAULT_KEY_ID);
        let wrapper = json!({
            "payload": legacy_payload,
            "signature": {"alg": block.alg, "sig": block.sig}
        });

        let license = License::from_value(wrapper).unwrap();
        assert_eq!(
            license.fingerprint.as_ref().unwrap().fingerprint_hash.as_deref(),
            Some("sha256:abc")
        );
        assert!(verify_license(&license, &public_key()));
    }
}
