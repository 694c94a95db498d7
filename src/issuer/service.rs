//! Issuer endpoint handlers.
//!
//! `handle` never fails: every outcome, including malformed input and store
//! failures, is encoded in the response envelope.

use crate::client::Transport;
use crate::clock::{Clock, SystemClock};
use crate::crypto::signing::DEFAULT_KEY_ID;
use crate::issuer::issue::issue_license;
use crate::issuer::store::{Checkin, LicenseStore, TransferRecord};
use crate::protocol::models::{
    ActivateData, ActivateRequest, Envelope, ErrorCode, IssuerAction, TransferData,
    TransferRequest, UpdatesData, UpdatesRequest, ValidateData, ValidateRequest,
};
use crate::validator::parse_release_date;
use crate::LicenseGateError;
use ed25519_dalek::SigningKey;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Statuses for which activation is refused.
pub const ACTIVATION_REFUSED: [&str; 3] = ["REVOKED", "SUSPENDED", "EXPIRED"];

const LICENSE_FIELDS: [&str; 3] = ["license_id", "product_id", "fingerprint_hash"];
const TRANSFER_FIELDS: [&str; 4] = [
    "license_id",
    "product_id",
    "from_fingerprint_hash",
    "to_fingerprint_hash",
];

/// Issuer API over an injected store.
pub struct IssuerService<S: LicenseStore> {
    store: S,
    signing_key: SigningKey,
    key_id: String,
    clock: Arc<dyn Clock>,
}

impl<S: LicenseStore> IssuerService<S> {
    /// Service signing with `signing_key` under the default key id.
    pub fn new(store: S, signing_key: SigningKey) -> Self {
        Self {
            store,
            signing_key,
            key_id: DEFAULT_KEY_ID.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use another key id in issued licenses.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Use another time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one request for the named action.
    pub fn handle(&self, action: &str, body: &Value) -> Envelope {
        if action.is_empty() {
            return Envelope::failure("Missing action", ErrorCode::InvalidRequest);
        }
        let Ok(action) = action.parse::<IssuerAction>() else {
            return Envelope::failure("Unknown action", ErrorCode::InvalidRequest);
        };
        if !body.is_object() {
            return Envelope::failure("Invalid JSON body", ErrorCode::InvalidRequest);
        }

        let result = match action {
            IssuerAction::Activate => self.activate(body),
            IssuerAction::Validate => self.validate(body),
            IssuerAction::Updates => self.updates(body),
            IssuerAction::TransferRequest => self.transfer_request(body),
        };

        match result {
            Ok(envelope) => envelope,
            Err(LicenseGateError::ProtocolError(message)) => {
                debug!(action = %action, %message, "Rejected malformed request");
                Envelope::failure(message, ErrorCode::InvalidRequest)
            }
            Err(e) => {
                error!(action = %action, error = %e, "Issuer request failed");
                Envelope::failure("Internal server error", ErrorCode::InternalError)
            }
        }
    }

    fn now_rfc3339(&self) -> String {
        self.clock.now_utc().to_rfc3339()
    }

    fn activate(&self, body: &Value) -> Result<Envelope, LicenseGateError> {
        let req: ActivateRequest = parse_request(body, &LICENSE_FIELDS)?;

        let Some(license) = self.store.find_license(&req.license_id, &req.product_id)? else {
            return Ok(not_found());
        };

        if ACTIVATION_REFUSED.contains(&license.status.as_str()) {
            return Envelope::success(ActivateData {
                status: Some(license.status),
                message: Some("License not allowed to activate".to_string()),
                ..Default::default()
            });
        }

        if license.fingerprint_bound {
            if license.fingerprint_hash.as_deref() != Some(req.fingerprint_hash.as_str()) {
                return Ok(Envelope::failure(
                    "License bound to another machine",
                    ErrorCode::FingerprintMismatch,
                ));
            }
        } else {
            self.store
                .bind_fingerprint(&license.license_id, &license.product_id, &req.fingerprint_hash)?;
        }

        self.record(&license.license_id, &req.fingerprint_hash, IssuerAction::Activate, &license.status)?;

        let document = issue_license(
            &license.payload(&req.fingerprint_hash),
            &self.signing_key,
            &self.key_id,
        )?;

        info!(license_id = %license.license_id, "License activated");
        Envelope::success(ActivateData {
            server_time: Some(self.now_rfc3339()),
            status: Some(license.status),
            message: Some("Activated".to_string()),
            license_payload: Some(document),
        })
    }

    fn validate(&self, body: &Value) -> Result<Envelope, LicenseGateError> {
        let req: ValidateRequest = parse_request(body, &LICENSE_FIELDS)?;

        let Some(license) = self.store.find_license(&req.license_id, &req.product_id)? else {
            return Ok(not_found());
        };

        if license.fingerprint_bound
            && license.fingerprint_hash.as_deref() != Some(req.fingerprint_hash.as_str())
        {
            return Ok(Envelope::failure(
                "Fingerprint mismatch",
                ErrorCode::FingerprintMismatch,
            ));
        }

        self.record(&license.license_id, &req.fingerprint_hash, IssuerAction::Validate, &license.status)?;

        let latest_version = self.store.latest_version(&license.product_id)?;
        let policy = serde_json::from_value(license.policy()).ok();

        Envelope::success(ValidateData {
            server_time: Some(self.now_rfc3339()),
            status: Some(license.status),
            message: Some("OK".to_string()),
            policy,
            updates_until: license.updates_until,
            latest_version,
        })
    }

    fn updates(&self, body: &Value) -> Result<Envelope, LicenseGateError> {
        let req: UpdatesRequest = parse_request(body, &LICENSE_FIELDS)?;

        let Some(license) = self.store.find_license(&req.license_id, &req.product_id)? else {
            return Ok(not_found());
        };

        let latest_version = self.store.latest_version(&license.product_id)?;
        let until = license
            .updates_until
            .as_deref()
            .and_then(parse_release_date);
        let eligible = match (&latest_version, until) {
            (Some(latest), Some(until)) => {
                parse_release_date(&latest.release_date).is_some_and(|release| release <= until)
            }
            _ => false,
        };

        Envelope::success(UpdatesData {
            updates_until: license.updates_until,
            eligible,
            latest_version,
        })
    }

    fn transfer_request(&self, body: &Value) -> Result<Envelope, LicenseGateError> {
        let req: TransferRequest = parse_request(body, &TRANSFER_FIELDS)?;

        let request_id = new_request_id();
        self.store.insert_transfer(TransferRecord {
            request_id: request_id.clone(),
            license_id: req.license_id,
            from_fingerprint_hash: req.from_fingerprint_hash,
            to_fingerprint_hash: req.to_fingerprint_hash,
            reason: req.reason.filter(|r| !r.is_empty()),
            contact: req.contact,
            status: "OPEN".to_string(),
            created_at: self.clock.now_utc(),
        })?;

        info!(%request_id, "Transfer request received");
        Envelope::success(TransferData {
            request_id,
            status: "OPEN".to_string(),
            message: Some("Transfer request received".to_string()),
        })
    }

    fn record(
        &self,
        license_id: &str,
        fingerprint_hash: &str,
        action: IssuerAction,
        status: &str,
    ) -> Result<(), LicenseGateError> {
        self.store.record_checkin(Checkin {
            license_id: license_id.to_string(),
            fingerprint_hash: fingerprint_hash.to_string(),
            action,
            server_status: status.to_string(),
            at: self.clock.now_utc(),
        })
    }
}

impl<S: LicenseStore> Transport for IssuerService<S> {
    fn call(&self, action: IssuerAction, body: &Value) -> Result<Envelope, LicenseGateError> {
        Ok(self.handle(action.as_str(), body))
    }
}

fn not_found() -> Envelope {
    Envelope::failure("License not found", ErrorCode::LicenseNotFound)
}

/// `TR-` followed by 8 upper-case hex digits.
fn new_request_id() -> String {
    format!("TR-{}", hex::encode_upper(rand::random::<[u8; 4]>()))
}

fn parse_request<T: DeserializeOwned>(body: &Value, required: &[&str]) -> Result<T, LicenseGateError> {
    for field in required {
        if body.get(field).is_none() {
            return Err(LicenseGateError::ProtocolError(format!(
                "Missing field: {}",
                field
            )));
        }
    }
    serde_json::from_value(body.clone())
        .map_err(|e| LicenseGateError::ProtocolError(format!("Invalid request: {}", e)))
}
