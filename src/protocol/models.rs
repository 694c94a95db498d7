//! Issuer wire types.
//!
//! Every response is wrapped in an `ok` envelope: `{"ok": true, "data": ...}`
//! on success, `{"ok": false, "error": "...", "code": "..."}` on failure.

use crate::storage::format::PolicyOverrides;
use crate::LicenseGateError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Issuer endpoint, selected with `?action=<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuerAction {
    /// Exchange a license id for a signed license.
    Activate,
    /// Periodic check-in.
    Validate,
    /// Update entitlement query.
    Updates,
    /// Open a machine transfer request.
    TransferRequest,
}

impl IssuerAction {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Validate => "validate",
            Self::Updates => "updates",
            Self::TransferRequest => "transfer_request",
        }
    }
}

impl FromStr for IssuerAction {
    type Err = LicenseGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activate" => Ok(Self::Activate),
            "validate" => Ok(Self::Validate),
            "updates" => Ok(Self::Updates),
            "transfer_request" => Ok(Self::TransferRequest),
            other => Err(LicenseGateError::ProtocolError(format!(
                "Unknown action: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for IssuerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuer error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed body, missing field or unknown action.
    InvalidRequest,
    /// No license with that id for that product.
    LicenseNotFound,
    /// License is bound to another machine.
    FingerprintMismatch,
    /// Issuer-side failure.
    InternalError,
}

impl ErrorCode {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::LicenseNotFound => "LICENSE_NOT_FOUND",
            Self::FingerprintMismatch => "FINGERPRINT_MISMATCH",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Envelope {
    /// Successful response carrying `data`.
    pub fn success(data: impl Serialize) -> Result<Self, LicenseGateError> {
        let data = serde_json::to_value(data)
            .map_err(|e| LicenseGateError::ProtocolError(format!("Failed to serialize: {}", e)))?;
        Ok(Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        })
    }

    /// Failure response.
    pub fn failure(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.as_str().to_string()),
        }
    }

    /// Failure code, if this is a failure.
    pub fn error_code(&self) -> Option<&str> {
        if self.ok {
            None
        } else {
            self.code.as_deref()
        }
    }

    /// Decode `data`, or turn `ok:false` into [`LicenseGateError::ServerRejected`].
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, LicenseGateError> {
        if !self.ok {
            return Err(LicenseGateError::ServerRejected {
                code: self.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                message: self.error.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        serde_json::from_value(self.data.unwrap_or(Value::Object(Map::new())))
            .map_err(|e| LicenseGateError::ProtocolError(format!("Unexpected response data: {}", e)))
    }
}

/// `activate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateRequest {
    /// License to activate.
    pub license_id: String,
    /// Product the caller runs.
    pub product_id: String,
    /// Caller's machine fingerprint.
    pub fingerprint_hash: String,
    /// Free-form machine description.
    #[serde(default)]
    pub machine: Map<String, Value>,
}

/// `activate` response data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivateData {
    /// Issuer clock (RFC 3339).
    #[serde(default)]
    pub server_time: Option<String>,
    /// License status on the issuer.
    #[serde(default)]
    pub status: Option<String>,
    /// Issuer message.
    #[serde(default)]
    pub message: Option<String>,
    /// Signed license document; absent when activation is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_payload: Option<Value>,
}

/// Client state summary sent with a check-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStateSummary {
    /// Last successful check-in (RFC 3339).
    #[serde(default)]
    pub last_success_check_at: Option<String>,
}

/// `validate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// License being checked.
    pub license_id: String,
    /// Product the caller runs.
    pub product_id: String,
    /// Caller's machine fingerprint.
    pub fingerprint_hash: String,
    /// Client-side view of its check-in history.
    #[serde(default)]
    pub client_state: ClientStateSummary,
}

/// A released product version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Version label.
    pub version: String,
    /// Release date (RFC 3339 or `YYYY-MM-DD`).
    pub release_date: String,
    /// Where to fetch it.
    #[serde(default)]
    pub download_url: Option<String>,
}

/// `validate` response data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateData {
    /// Issuer clock (RFC 3339).
    #[serde(default)]
    pub server_time: Option<String>,
    /// Authoritative license status.
    #[serde(default)]
    pub status: Option<String>,
    /// Issuer message.
    #[serde(default)]
    pub message: Option<String>,
    /// Current offline policy on the issuer.
    #[serde(default)]
    pub policy: Option<PolicyOverrides>,
    /// Update entitlement end.
    #[serde(default)]
    pub updates_until: Option<String>,
    /// Newest release of the product.
    #[serde(default)]
    pub latest_version: Option<ProductVersion>,
}

/// `updates` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatesRequest {
    /// License being queried.
    pub license_id: String,
    /// Product the caller runs.
    pub product_id: String,
    /// Caller's machine fingerprint.
    pub fingerprint_hash: String,
}

/// `updates` response data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatesData {
    /// Update entitlement end.
    #[serde(default)]
    pub updates_until: Option<String>,
    /// Whether the newest release is covered.
    #[serde(default)]
    pub eligible: bool,
    /// Newest release of the product.
    #[serde(default)]
    pub latest_version: Option<ProductVersion>,
}

/// Contact details attached to a transfer request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferContact {
    /// Contact name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
}

/// `transfer_request` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// License to move.
    pub license_id: String,
    /// Product the caller runs.
    pub product_id: String,
    /// Machine the license is on now.
    pub from_fingerprint_hash: String,
    /// Machine it should move to.
    pub to_fingerprint_hash: String,
    /// Why.
    #[serde(default)]
    pub reason: Option<String>,
    /// Who to contact.
    #[serde(default)]
    pub contact: Option<TransferContact>,
}

/// `transfer_request` response data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferData {
    /// Issuer-assigned id (`TR-XXXXXXXX`).
    pub request_id: String,
    /// Request status, `OPEN` on creation.
    pub status: String,
    /// Issuer message.
    #[serde(default)]
    pub message: Option<String>,
}
