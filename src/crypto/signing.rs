//! Ed25519 signing over canonical payloads, plus key handling.
//!
//! Secret keys are accepted either as a 32-byte seed or as the 64-byte
//! `seed || public` form produced by libsodium.

use crate::crypto::canonical::canonicalize;
use crate::LicenseGateError;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Algorithm label written into signed licenses.
pub const SIGNATURE_ALG: &str = "ed25519";

/// Key id written when the caller does not provide one.
pub const DEFAULT_KEY_ID: &str = "lic-v1";

/// Detached signature over a canonical payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Signature algorithm (`ed25519`).
    pub alg: String,
    /// Identifier of the signing key.
    pub kid: String,
    /// Base64 signature.
    pub sig: String,
}

/// Freshly generated key pair, base64 encoded.
#[derive(Clone)]
pub struct GeneratedKeyPair {
    /// 32-byte public key.
    pub public_key_b64: String,
    /// 64-byte `seed || public` secret key.
    pub secret_key_b64: String,
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("public_key_b64", &self.public_key_b64)
            .field("secret_key_b64", &"<redacted>")
            .finish()
    }
}

/// Generate a new Ed25519 key pair from the OS RNG.
pub fn generate_keypair() -> GeneratedKeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    GeneratedKeyPair {
        public_key_b64: STANDARD.encode(signing_key.verifying_key().to_bytes()),
        secret_key_b64: STANDARD.encode(signing_key.to_keypair_bytes()),
    }
}

/// Decode a base64 secret key (32-byte seed or 64-byte keypair).
pub fn decode_signing_key(secret_key_b64: &str) -> Result<SigningKey, LicenseGateError> {
    let bytes = STANDARD
        .decode(secret_key_b64.trim())
        .map_err(|e| LicenseGateError::KeyError(format!("Invalid secret key base64: {}", e)))?;

    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let mut keypair = [0u8; 64];
            keypair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&keypair).map_err(|e| {
                LicenseGateError::KeyError(format!("Secret key halves do not match: {}", e))
            })
        }
        n => Err(LicenseGateError::KeyError(format!(
            "Secret key must be 32 or 64 bytes, got {}",
            n
        ))),
    }
}

/// Sign the canonical form of `payload` with an already decoded key.
pub fn sign_with_key(payload: &Value, signing_key: &SigningKey, key_id: &str) -> SignatureBlock {
    let message = canonicalize(payload);
    let signature = signing_key.sign(&message);
    SignatureBlock {
        alg: SIGNATURE_ALG.to_string(),
        kid: key_id.to_string(),
        sig: STANDARD.encode(signature.to_bytes()),
    }
}

/// Sign the canonical form of `payload` with a base64 secret key.
pub fn sign_payload(payload: &Value, secret_key_b64: &str) -> Result<SignatureBlock, LicenseGateError> {
    let signing_key = decode_signing_key(secret_key_b64)?;
    Ok(sign_with_key(payload, &signing_key, DEFAULT_KEY_ID))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify::{decode_public_key, verify_canonical};
    use serde_json::json;

    const TEST_SEED_B64: &str = "nWGxne/9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A=";
    const TEST_KEYPAIR_B64: &str =
        "nWGxne/9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2DXWpgBgrEKt9VL/tPJZAc6DuFy89qmIyWvAhpo9wdRGg==";
    const TEST_PUBLIC_KEY_B64: &str = "11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo=";

    #[test]
    fn seed_and_keypair_forms_agree() {
        let from_seed = decode_signing_key(TEST_SEED_B64).unwrap();
        let from_pair = decode_signing_key(TEST_KEYPAIR_B64).unwrap();
        assert_eq!(from_seed.to_bytes(), from_pair.to_bytes());
        assert_eq!(
            STANDARD.encode(from_seed.verifying_key().to_bytes()),
            TEST_PUBLIC_KEY_B64
        );
    }

    #[test]
    fn rejects_bad_key_sizes() {
        assert!(matches!(
            decode_signing_key("AAAA"),
            Err(LicenseGateError::KeyError(_))
        ));
        assert!(matches!(
            decode_signing_key("not base64!!"),
            Err(LicenseGateError::KeyError(_))
        ));
    }

    #[test]
    fn rejects_mismatched_keypair() {
        let mut bytes = STANDARD.decode(TEST_KEYPAIR_B64).unwrap();
        bytes[63] ^= 0xff;
        let tampered = STANDARD.encode(bytes);
        assert!(decode_signing_key(&tampered).is_err());
    }

    #[test]
    fn signature_block_fields() {
        let block = sign_payload(&json!({"license_id": "L1"}), TEST_SEED_B64).unwrap();
        assert_eq!(block.alg, "ed25519");
        assert_eq!(block.kid, "lic-v1");
        assert_eq!(STANDARD.decode(&block.sig).unwrap().len(), 64);
    }

    #[test]
    fn generated_pair_signs_and_verifies() {
        let pair = generate_keypair();
        let payload = json!({"product_id": "p", "status": "ACTIVE"});
        let block = sign_payload(&payload, &pair.secret_key_b64).unwrap();

        let key = decode_public_key(&pair.public_key_b64).unwrap();
        assert!(verify_canonical(&payload, &block.sig, &key));

        let other = generate_keypair();
        let other_key = decode_public_key(&other.public_key_b64).unwrap();
        assert!(!verify_canonical(&payload, &block.sig, &other_key));
    }

    #[test]
    fn debug_redacts_secret() {
        let pair = generate_keypair();
        let debug = format!("{:?}", pair);
        assert!(!debug.contains(&pair.secret_key_b64));
        assert!(debug.contains("<redacted>"));
    }
}
