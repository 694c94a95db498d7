//! Ed25519 signature verification.
//!
//! Everything here fails closed: malformed keys, malformed signatures and
//! decoding errors all come back as "not verified".

use crate::crypto::canonical::canonicalize;
use crate::LicenseGateError;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, VerifyingKey};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Cache for decoded verifying keys.
static KEY_CACHE: OnceCell<RwLock<HashMap<String, VerifyingKey>>> = OnceCell::new();

/// Decode a base64 Ed25519 public key.
///
/// The key is cached after first decode.
pub fn decode_public_key(key_b64: &str) -> Result<VerifyingKey, LicenseGateError> {
    let key_b64 = key_b64.trim();
    let cache = KEY_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    if let Ok(guard) = cache.read() {
        if let Some(key) = guard.get(key_b64) {
            return Ok(*key);
        }
    }

    let bytes = STANDARD
        .decode(key_b64)
        .map_err(|e| LicenseGateError::KeyError(format!("Invalid public key base64: {}", e)))?;

    let key_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| LicenseGateError::KeyError("Public key must be 32 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|e| LicenseGateError::KeyError(format!("Invalid Ed25519 public key: {}", e)))?;

    // Best-effort insert into cache. If locking fails, still return the decoded key.
    if let Ok(mut guard) = cache.write() {
        guard.insert(key_b64.to_string(), verifying_key);
    }

    Ok(verifying_key)
}

/// Verify a base64 Ed25519 signature over raw bytes.
pub fn verify_ed25519(
    signature_b64: &str,
    message: &[u8],
    verifying_key: &VerifyingKey,
) -> Result<(), LicenseGateError> {
    let sig_bytes = STANDARD
        .decode(signature_b64.trim())
        .map_err(|_| LicenseGateError::SignatureInvalid)?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| LicenseGateError::SignatureInvalid)?;

    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify_strict(message, &signature)
        .map_err(|_| LicenseGateError::SignatureInvalid)
}

/// Check a signature against the canonical form of `payload`.
pub fn verify_canonical(payload: &Value, signature_b64: &str, verifying_key: &VerifyingKey) -> bool {
    verify_ed25519(signature_b64, &canonicalize(payload), verifying_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const TEST_SIGNING_SEED_BYTES: [u8; 32] = [
        0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60, 0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c,
        0xc4, 0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19, 0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae,
        0x7f, 0x60,
    ];
    const TEST_PUBLIC_KEY_B64: &str = "11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=";

    #[test]
    fn test_decode_public_key_valid() {
        let key = decode_public_key(TEST_PUBLIC_KEY_B64).unwrap();
        let expected = SigningKey::from_bytes(&TEST_SIGNING_SEED_BYTES).verifying_key();
        assert_eq!(key, expected);
    }

    #[test]
    fn test_decode_public_key_invalid_base64() {
        let result = decode_public_key("not-valid-base64!!!");
        assert!(matches!(result, Err(LicenseGateError::KeyError(_))));
    }

    #[test]
    fn test_decode_public_key_wrong_length() {
        let result = decode_public_key("AAAA");
        assert!(matches!(result, Err(LicenseGateError::KeyError(_))));
    }

    #[test]
    fn test_verify_round_trip() {
        let signing_key = SigningKey::from_bytes(&TEST_SIGNING_SEED_BYTES);
        let message = b"canonical bytes";
        let sig = STANDARD.encode(signing_key.sign(message).to_bytes());
        let key = decode_public_key(TEST_PUBLIC_KEY_B64).unwrap();

        assert!(verify_ed25519(&sig, message, &key).is_ok());
        assert!(matches!(
            verify_ed25519(&sig, b"canonical byteS", &key),
            Err(LicenseGateError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_verify_invalid_base64_fails_closed() {
        let key = decode_public_key(TEST_PUBLIC_KEY_B64).unwrap();
        let result = verify_ed25519("not-valid-base64!!!", b"test", &key);
        assert!(matches!(result, Err(LicenseGateError::SignatureInvalid)));
    }

    #[test]
    fn test_verify_wrong_signature_length() {
        let key = decode_public_key(TEST_PUBLIC_KEY_B64).unwrap();
        let result = verify_ed25519("dGVzdA==", b"test", &key);
        assert!(matches!(result, Err(LicenseGateError::SignatureInvalid)));
    }

    #[test]
    fn test_verify_zero_signature() {
        let key = decode_public_key(TEST_PUBLIC_KEY_B64).unwrap();
        let fake_sig = STANDARD.encode([0u8; 64]);
        assert!(verify_ed25519(&fake_sig, b"test signing string", &key).is_err());
    }
}
