//! On-disk record formats.
//!
//! The license is kept as the exact JSON document the issuer signed, with a
//! typed view over the fields the engine reads. Re-serializing a typed struct
//! could change the bytes that were signed, so the document is authoritative.

use crate::storage::legacy::{normalize_license_document, Normalized};
use crate::LicenseGateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// License schema version supported by this engine.
pub const SUPPORTED_SCHEMA_VERSION: i64 = 1;

/// Fields excluded from the signed payload.
pub const UNSIGNED_FIELDS: [&str; 4] = [
    "signature",
    "signature_alg",
    "signature_kid",
    "schema_version",
];

/// License status as issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LicenseStatus {
    /// Normal paid license.
    Active,
    /// Trial period running.
    Trial,
    /// Temporarily disabled by the issuer.
    Suspended,
    /// Permanently withdrawn.
    Revoked,
    /// Term ended.
    Expired,
    /// Trial ended.
    TrialExpired,
    /// Status not known to this engine; not blocking.
    Other(String),
}

impl LicenseStatus {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Trial => "TRIAL",
            Self::Suspended => "SUSPENDED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::TrialExpired => "TRIAL_EXPIRED",
            Self::Other(s) => s,
        }
    }

    /// Whether the status forbids running the application.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::Suspended | Self::Revoked | Self::Expired | Self::TrialExpired
        )
    }
}

impl From<String> for LicenseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ACTIVE" => Self::Active,
            "TRIAL" => Self::Trial,
            "SUSPENDED" => Self::Suspended,
            "REVOKED" => Self::Revoked,
            "EXPIRED" => Self::Expired,
            "TRIAL_EXPIRED" => Self::TrialExpired,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for LicenseStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<LicenseStatus> for String {
    fn from(status: LicenseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine binding block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintBinding {
    /// Binding mode (e.g. `machine`).
    #[serde(default)]
    pub mode: Option<String>,
    /// `false` means unrestricted machine use.
    #[serde(default)]
    pub bound: bool,
    /// Expected `sha256:<hex>` fingerprint.
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
}

/// Offline policy embedded in a license (or returned by the issuer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    /// Days between scheduled check-ins.
    #[serde(
        default,
        deserialize_with = "int_or_numeric_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub check_interval_days: Option<i64>,
    /// Days offline before warning.
    #[serde(
        default,
        deserialize_with = "int_or_numeric_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub warn_after_days: Option<i64>,
    /// Days offline before hard block.
    #[serde(
        default,
        deserialize_with = "int_or_numeric_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_offline_days: Option<i64>,
}

/// Integers may arrive as JSON strings when the issuer signs raw database rows.
fn int_or_numeric_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got \"{}\"", s))),
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LicenseFields {
    #[serde(default, deserialize_with = "int_or_numeric_string")]
    schema_version: Option<i64>,
    #[serde(default)]
    license_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    status: Option<LicenseStatus>,
    #[serde(default)]
    issued_at: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    updates_until: Option<String>,
    #[serde(default)]
    fingerprint: Option<FingerprintBinding>,
    #[serde(default)]
    policy: Option<PolicyOverrides>,
    #[serde(default)]
    signature_alg: Option<String>,
    #[serde(default)]
    signature_kid: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

/// A signed license record.
#[derive(Debug, Clone)]
pub struct License {
    /// Schema version (0 when absent).
    pub schema_version: i64,
    /// License identifier.
    pub license_id: String,
    /// Product this license is for.
    pub product_id: String,
    /// Issued status; `None` when the document has none.
    pub status: Option<LicenseStatus>,
    /// RFC 3339 issue time.
    pub issued_at: Option<String>,
    /// RFC 3339 expiry time.
    pub expires_at: Option<String>,
    /// RFC 3339 end of update entitlement.
    pub updates_until: Option<String>,
    /// Machine binding.
    pub fingerprint: Option<FingerprintBinding>,
    /// Embedded offline policy.
    pub policy: Option<PolicyOverrides>,
    /// Signature algorithm label.
    pub signature_alg: Option<String>,
    /// Signing key id.
    pub signature_kid: Option<String>,
    /// Base64 detached signature.
    pub signature: Option<String>,

    document: Map<String, Value>,
    aliased_fingerprint_hash: bool,
}

impl License {
    /// Build a license from a raw (possibly legacy-shaped) JSON document.
    pub fn from_value(raw: Value) -> Result<Self, LicenseGateError> {
        let Normalized {
            document,
            aliased_fingerprint_hash,
        } = normalize_license_document(raw)?;

        let fields: LicenseFields = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| LicenseGateError::LicenseMalformed(e.to_string()))?;

        Ok(Self {
            schema_version: fields.schema_version.unwrap_or(0),
            license_id: fields.license_id.unwrap_or_default(),
            product_id: fields.product_id.unwrap_or_default(),
            status: fields.status,
            issued_at: fields.issued_at,
            expires_at: fields.expires_at,
            updates_until: fields.updates_until,
            fingerprint: fields.fingerprint,
            policy: fields.policy,
            signature_alg: fields.signature_alg,
            signature_kid: fields.signature_kid,
            signature: fields.signature,
            document,
            aliased_fingerprint_hash,
        })
    }

    /// Parse a license from JSON text.
    pub fn from_json(json: &str) -> Result<Self, LicenseGateError> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| LicenseGateError::LicenseMalformed(e.to_string()))?;
        Self::from_value(raw)
    }

    /// The normalized document, including any legacy aliases.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Document as written to disk.
    ///
    /// A `fingerprint_hash` introduced by legacy aliasing is left out so the
    /// alias is recreated, and excluded from the signed payload, on reload.
    pub fn stored_document(&self) -> Map<String, Value> {
        let mut document = self.document.clone();
        if self.aliased_fingerprint_hash {
            if let Some(Value::Object(fp)) = document.get_mut("fingerprint") {
                fp.remove("fingerprint_hash");
            }
        }
        document
    }

    /// Serialize the document for storage.
    pub fn to_json(&self) -> Result<String, LicenseGateError> {
        serde_json::to_string_pretty(&self.stored_document())
            .map_err(|e| LicenseGateError::StorageIO(format!("Failed to serialize license: {}", e)))
    }

    /// The exact payload the issuer signed.
    ///
    /// Signature fields and `schema_version` are removed, as is a
    /// `fingerprint_hash` key that only exists because of legacy aliasing.
    pub fn signed_payload(&self) -> Value {
        let mut payload = self.stored_document();
        for field in UNSIGNED_FIELDS {
            payload.remove(field);
        }
        Value::Object(payload)
    }

    /// Parsed `expires_at`.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.expires_at.as_deref())
    }

    /// Parsed `updates_until`.
    pub fn updates_until_utc(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.updates_until.as_deref())
    }
}

/// Parse an optional RFC 3339 timestamp into UTC.
pub fn parse_rfc3339(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Clock guard ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockGuardState {
    /// Last wall-clock time the engine observed.
    #[serde(default)]
    pub last_seen_time: Option<DateTime<Utc>>,
    /// Backward jumps seen so far; never reset by the engine.
    #[serde(default)]
    pub rollback_count: u32,
}

fn default_state_schema() -> u32 {
    1
}

/// Mutable per-installation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// State file format version.
    #[serde(default = "default_state_schema")]
    pub schema_version: u32,
    /// License this installation was activated with.
    #[serde(default)]
    pub license_id: Option<String>,
    /// Product this installation belongs to.
    #[serde(default)]
    pub product_id: Option<String>,
    /// First successful activation; set once.
    #[serde(default)]
    pub first_activated_at: Option<DateTime<Utc>>,
    /// Last successful issuer check-in.
    #[serde(default)]
    pub last_success_check_at: Option<DateTime<Utc>>,
    /// When the next check-in is scheduled.
    #[serde(default)]
    pub next_check_due_at: Option<DateTime<Utc>>,
    /// Status last reported by the issuer.
    #[serde(default)]
    pub last_server_status: Option<String>,
    /// Last issuer message or advisory note.
    #[serde(default)]
    pub last_server_message: Option<String>,
    /// Fingerprint recorded at activation.
    #[serde(default)]
    pub locked_to_fingerprint_hash: Option<String>,
    /// Rollback detection ledger.
    #[serde(default)]
    pub clock_guard: ClockGuardState,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            schema_version: default_state_schema(),
            license_id: None,
            product_id: None,
            first_activated_at: None,
            last_success_check_at: None,
            next_check_due_at: None,
            last_server_status: None,
            last_server_message: None,
            locked_to_fingerprint_hash: None,
            clock_guard: ClockGuardState::default(),
        }
    }
}

impl ClientState {
    /// Serialize the state to JSON.
    pub fn to_json(&self) -> Result<String, LicenseGateError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LicenseGateError::StorageIO(format!("Failed to serialize state: {}", e)))
    }

    /// Deserialize state from JSON.
    pub fn from_json(json: &str) -> Result<Self, LicenseGateError> {
        serde_json::from_str(json).map_err(|e| LicenseGateError::StateCorrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Value {
        json!({
            "schema_version": 1,
            "license_id": "LIC-001",
            "product_id": "calcpro_calculator",
            "status": "ACTIVE",
            "plan": "trial",
            "issued_at": "2025-01-01T00:00:00+00:00",
            "expires_at": "2026-01-01T00:00:00+00:00",
            "updates_until": "2027-01-01T00:00:00+00:00",
            "fingerprint": {"mode": "machine", "bound": true, "fingerprint_hash": "sha256:abc"},
            "policy": {"check_interval_days": 30, "warn_after_days": 180, "max_offline_days": 365},
            "signature_alg": "ed25519",
            "signature_kid": "lic-v1",
            "signature": "c2ln"
        })
    }

    #[test]
    fn parses_typed_view() {
        let license = License::from_value(sample_document()).unwrap();
        assert_eq!(license.schema_version, 1);
        assert_eq!(license.license_id, "LIC-001");
        assert_eq!(license.status, Some(LicenseStatus::Active));
        assert!(license.fingerprint.as_ref().unwrap().bound);
        assert_eq!(license.policy.as_ref().unwrap().max_offline_days, Some(365));
        assert!(license.expires_at_utc().is_some());
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let mut doc = sample_document();
        doc["schema_version"] = json!("1");
        doc["policy"] = json!({
            "check_interval_days": "14",
            "warn_after_days": " 90 ",
            "max_offline_days": 200
        });

        let license = License::from_value(doc).unwrap();
        assert_eq!(license.schema_version, 1);
        let policy = license.policy.unwrap();
        assert_eq!(policy.check_interval_days, Some(14));
        assert_eq!(policy.warn_after_days, Some(90));
        assert_eq!(policy.max_offline_days, Some(200));
    }

    #[test]
    fn non_numeric_policy_string_is_malformed() {
        let mut doc = sample_document();
        doc["policy"] = json!({"check_interval_days": "weekly"});
        assert!(matches!(
            License::from_value(doc),
            Err(LicenseGateError::LicenseMalformed(_))
        ));
    }

    #[test]
    fn legacy_alias_is_not_persisted() {
        let license = License::from_value(json!({
            "schema_version": 1,
            "license_id": "LIC-7",
            "fingerprint": {"bound": true, "hash": "sha256:abc"}
        }))
        .unwrap();
        assert_eq!(
            license.document()["fingerprint"]["fingerprint_hash"],
            json!("sha256:abc")
        );

        let reloaded = License::from_json(&license.to_json().unwrap()).unwrap();
        assert!(reloaded.stored_document()["fingerprint"]
            .get("fingerprint_hash")
            .is_none());
        assert_eq!(reloaded.signed_payload(), license.signed_payload());
        assert_eq!(
            reloaded.fingerprint.unwrap().fingerprint_hash.as_deref(),
            Some("sha256:abc")
        );
    }

    #[test]
    fn signed_payload_strips_signature_fields() {
        let license = License::from_value(sample_document()).unwrap();
        let payload = license.signed_payload();
        let obj = payload.as_object().unwrap();
        for field in UNSIGNED_FIELDS {
            assert!(!obj.contains_key(field), "{} should be stripped", field);
        }
        assert_eq!(obj.get("plan"), Some(&json!("trial")));
    }

    #[test]
    fn document_is_preserved_byte_for_byte_in_values() {
        let license = License::from_value(sample_document()).unwrap();
        assert_eq!(
            license.document().get("issued_at"),
            Some(&json!("2025-01-01T00:00:00+00:00"))
        );
    }

    #[test]
    fn status_classification() {
        assert!(LicenseStatus::from("REVOKED").is_blocking());
        assert!(LicenseStatus::from("TRIAL_EXPIRED").is_blocking());
        assert!(!LicenseStatus::from("ACTIVE").is_blocking());
        assert!(!LicenseStatus::from("GRANDFATHERED").is_blocking());
        assert_eq!(LicenseStatus::from("GRANDFATHERED").as_str(), "GRANDFATHERED");
    }

    #[test]
    fn rejects_non_object_license() {
        assert!(matches!(
            License::from_value(json!([1, 2])),
            Err(LicenseGateError::LicenseMalformed(_))
        ));
        assert!(matches!(
            License::from_json("not json"),
            Err(LicenseGateError::LicenseMalformed(_))
        ));
    }

    #[test]
    fn state_defaults_and_roundtrip() {
        let state = ClientState::default();
        assert_eq!(state.schema_version, 1);
        assert_eq!(state.clock_guard.rollback_count, 0);

        let json = state.to_json().unwrap();
        assert_eq!(ClientState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn state_tolerates_missing_fields() {
        let state = ClientState::from_json(r#"{"license_id":"LIC-1"}"#).unwrap();
        assert_eq!(state.license_id.as_deref(), Some("LIC-1"));
        assert!(state.clock_guard.last_seen_time.is_none());
    }

    #[test]
    fn corrupt_state_is_reported() {
        assert!(matches!(
            ClientState::from_json("{\"clock_guard\": 7"),
            Err(LicenseGateError::StateCorrupt(_))
        ));
    }
}
