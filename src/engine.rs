//! License engine - the main public API for licensegate.
//!
//! The `LicenseEngine` ties the local records, the validator and the optional
//! issuer round trip together:
//! - `assert_valid` once at startup
//! - `activate` on first install (or after a transfer)
//! - `request_transfer` to move a license to another machine

use crate::client::{self, IssuerClient, Transport};
use crate::clock::{Clock, SystemClock};
use crate::config::LicenseGateConfig;
use crate::crypto::verify::decode_public_key;
use crate::errors::{Advisory, CheckOutcome};
use crate::fingerprint::current_fingerprint_hash;
use crate::policy::{compute_offline_state, ClockGuard, OfflineState, Policy};
use crate::protocol::models::{
    ActivateData, ActivateRequest, ClientStateSummary, ErrorCode, IssuerAction, ProductVersion,
    TransferContact, TransferData, TransferRequest, UpdatesData, UpdatesRequest, ValidateData,
    ValidateRequest,
};
use crate::storage::file::FileStore;
use crate::storage::format::{ClientState, License, LicenseStatus, PolicyOverrides};
use crate::validator::{check_signature, validate_core, validate_fingerprint};
use crate::LicenseGateError;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::VerifyingKey;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of an issuer check-in performed during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCheck {
    /// Issuer clock at the time of the check.
    pub server_time: Option<String>,
    /// Authoritative license status.
    pub status: String,
    /// Issuer message.
    pub message: String,
    /// Offline policy currently held by the issuer.
    pub policy: Option<PolicyOverrides>,
    /// Update entitlement end according to the issuer.
    pub updates_until: Option<String>,
    /// Newest product release.
    pub latest_version: Option<ProductVersion>,
}

/// Successful validation.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// The trusted license.
    pub license: License,
    /// Effective offline policy.
    pub policy: Policy,
    /// Offline posture after any check-in.
    pub offline: OfflineState,
    /// Non-blocking conditions for optional display.
    pub advisories: Vec<Advisory>,
    /// Present when the issuer was contacted successfully.
    pub server_check: Option<ServerCheck>,
}

/// Main license engine.
///
/// Create one per process. The engine is the only writer of the license and
/// state files.
pub struct LicenseEngine {
    config: LicenseGateConfig,
    clock: Arc<dyn Clock>,
    store: FileStore,
    transport: Option<Arc<dyn Transport>>,
    guard: ClockGuard,
    verifying_key: Option<VerifyingKey>,
    fingerprint_hash: String,
}

impl LicenseEngine {
    /// Create an engine from configuration.
    ///
    /// An HTTP issuer client is built when `server.enabled` is set.
    ///
    /// # Errors
    /// - `ConfigError` if validation fails or no data directory exists
    /// - `KeyError` if the public key cannot be decoded
    pub fn new(config: LicenseGateConfig) -> Result<Self, LicenseGateError> {
        config.validate()?;
        let transport = http_transport(&config)?;
        Self::build(config, Arc::new(SystemClock), transport)
    }

    /// Create an engine that talks to the issuer through `transport`.
    ///
    /// Server integration is on regardless of `server.enabled`, and
    /// `server.base_url` is not required.
    pub fn with_transport(
        config: LicenseGateConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, LicenseGateError> {
        config.validate_without_endpoint()?;
        Self::build(config, Arc::new(SystemClock), Some(transport))
    }

    /// Create an engine with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: LicenseGateConfig,
        clock: Arc<dyn Clock>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, LicenseGateError> {
        let transport = match transport {
            Some(transport) => {
                config.validate_without_endpoint()?;
                Some(transport)
            }
            None => {
                config.validate()?;
                http_transport(&config)?
            }
        };
        Self::build(config, clock, transport)
    }

    /// Pretend to run on a machine with the given fingerprint (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn with_fingerprint_hash(mut self, fingerprint_hash: impl Into<String>) -> Self {
        self.fingerprint_hash = fingerprint_hash.into();
        self
    }

    fn build(
        config: LicenseGateConfig,
        clock: Arc<dyn Clock>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Self, LicenseGateError> {
        let verifying_key = config
            .signature
            .public_key_b64
            .as_deref()
            .map(decode_public_key)
            .transpose()?;
        let store = FileStore::new(config.license_path()?, config.state_path()?);
        let guard = ClockGuard::new(config.clock_guard.max_rollback_count);

        Ok(Self {
            config,
            clock,
            store,
            transport,
            guard,
            verifying_key,
            fingerprint_hash: current_fingerprint_hash(),
        })
    }

    /// Fingerprint hash of this machine.
    pub fn fingerprint_hash(&self) -> &str {
        &self.fingerprint_hash
    }

    /// Engine configuration.
    pub fn config(&self) -> &LicenseGateConfig {
        &self.config
    }

    /// Whether issuer calls are possible.
    pub fn server_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Current persisted client state.
    pub fn state(&self) -> Result<ClientState, LicenseGateError> {
        self.store.load_state()
    }

    /// Stored license, if any. No checks are applied.
    pub fn license(&self) -> Result<Option<License>, LicenseGateError> {
        self.store.load_license()
    }

    /// Decide whether the application may run.
    ///
    /// Stages, first failure wins:
    /// 1. Clock guard (ledger persisted before anything else)
    /// 2. Load license
    /// 3. Signature gate
    /// 4. Core checks (schema, product, status, expiry)
    /// 5. Machine binding
    /// 6. Offline hard limit
    /// 7. Best-effort issuer check-in when due
    ///
    /// # Errors
    /// Every `Err` is fatal for the host application. Transport failures
    /// during the check-in are reported as [`Advisory::CheckSkipped`].
    pub fn assert_valid(&self) -> Result<ValidationReport, LicenseGateError> {
        let now = self.clock.now_utc();
        let mut state = self.store.load_state()?;

        let observed = self.guard.observe(&mut state.clock_guard, now);
        self.store.save_state(&state)?;
        observed?;

        let license = self
            .store
            .load_license()?
            .ok_or(LicenseGateError::MissingLicense)?;

        check_signature(
            &license,
            self.verifying_key.as_ref(),
            self.config.signature.require_signature,
        )?;
        validate_core(&license, &self.config.product_id, now)?;
        validate_fingerprint(&license, &self.fingerprint_hash)?;

        let policy = Policy::resolve(&license, &self.config.defaults);
        let offline = compute_offline_state(&policy, &state, now);
        debug!(
            offline_days = ?offline.offline_days,
            due = offline.due,
            warn = offline.warn,
            "Offline posture computed"
        );

        if offline.hard_block {
            return Err(LicenseGateError::OfflineLimitExceeded {
                offline_days: offline.offline_days.unwrap_or_default(),
                max_offline_days: policy.max_offline_days(),
            });
        }

        let mut skipped = None;
        let mut server_check = None;

        if let Some(transport) = self.transport.as_deref() {
            if offline.due {
                let result =
                    self.try_server_validate(transport, &license, &policy, &mut state, now);
                self.store.save_state(&state)?;
                match result? {
                    (CheckOutcome::Completed, check) => server_check = check,
                    (CheckOutcome::Recovered(advisory), _) => skipped = Some(advisory),
                }
            } else {
                self.store.save_state(&state)?;
            }
        } else {
            self.store.save_state(&state)?;
        }

        let offline = compute_offline_state(&policy, &state, now);
        let mut advisories = self.advisories(&offline);
        if let Some(advisory) = skipped {
            advisories.insert(0, advisory);
        }

        info!(
            license_id = %license.license_id,
            advisories = advisories.len(),
            "License valid"
        );

        Ok(ValidationReport {
            license,
            policy,
            offline,
            advisories,
            server_check,
        })
    }

    /// One check-in with the issuer.
    ///
    /// Updates `state` in every branch; the caller persists it before
    /// propagating an error.
    fn try_server_validate(
        &self,
        transport: &dyn Transport,
        license: &License,
        policy: &Policy,
        state: &mut ClientState,
        now: DateTime<Utc>,
    ) -> Result<(CheckOutcome, Option<ServerCheck>), LicenseGateError> {
        let request = ValidateRequest {
            license_id: license.license_id.clone(),
            product_id: self.config.product_id.clone(),
            fingerprint_hash: self.fingerprint_hash.clone(),
            client_state: ClientStateSummary {
                last_success_check_at: state.last_success_check_at.map(|t| t.to_rfc3339()),
            },
        };

        let envelope = match client::exchange(transport, IssuerAction::Validate, &request) {
            Ok(envelope) => envelope,
            Err(e) => return Ok((self.skip_check(state, e.to_string()), None)),
        };

        if !envelope.ok {
            let message = envelope
                .error
                .clone()
                .unwrap_or_else(|| "Validation failed".to_string());
            if envelope.error_code() == Some(ErrorCode::InternalError.as_str()) {
                return Ok((self.skip_check(state, message), None));
            }
            state.last_server_message = Some(message);
        }

        let data: ValidateData = match envelope.into_data() {
            Ok(data) => data,
            Err(e @ LicenseGateError::ServerRejected { .. }) => {
                warn!(error = %e, "Issuer rejected check-in");
                return Err(e);
            }
            Err(e) => return Ok((self.skip_check(state, e.to_string()), None)),
        };

        let status = data.status.unwrap_or_else(|| "ACTIVE".to_string());
        let message = data.message.unwrap_or_else(|| "OK".to_string());

        state.last_success_check_at = Some(now);
        state.next_check_due_at = days_after(now, policy.check_interval_days());
        state.last_server_status = Some(status.clone());
        state.last_server_message = Some(message.clone());

        if LicenseStatus::from(status.as_str()).is_blocking() {
            warn!(status = %status, "Issuer reports blocking status");
            return Err(LicenseGateError::ServerBlocked(status));
        }

        info!(status = %status, "Issuer check-in completed");
        Ok((
            CheckOutcome::Completed,
            Some(ServerCheck {
                server_time: data.server_time,
                status,
                message,
                policy: data.policy,
                updates_until: data.updates_until,
                latest_version: data.latest_version,
            }),
        ))
    }

    fn skip_check(&self, state: &mut ClientState, reason: String) -> CheckOutcome {
        warn!(%reason, "Validation check skipped");
        let advisory = Advisory::CheckSkipped { reason };
        state.last_server_message = Some(advisory.to_string());
        CheckOutcome::Recovered(advisory)
    }

    fn advisories(&self, offline: &OfflineState) -> Vec<Advisory> {
        let mut advisories = Vec::new();
        if offline.warn {
            if let Some(offline_days) = offline.offline_days {
                advisories.push(Advisory::ValidationOverdue { offline_days });
            }
        }
        if !self.server_enabled() {
            advisories.push(Advisory::ServerDisabled);
        }
        advisories
    }

    /// Advisories for the stored license and state, without network access.
    ///
    /// Empty when no license is stored.
    pub fn warnings(&self) -> Result<Vec<Advisory>, LicenseGateError> {
        let Some(license) = self.store.load_license()? else {
            return Ok(Vec::new());
        };
        let state = self.store.load_state()?;
        let policy = Policy::resolve(&license, &self.config.defaults);
        let offline = compute_offline_state(&policy, &state, self.clock.now_utc());
        Ok(self.advisories(&offline))
    }

    /// Whether a release dated `release_date` is covered by the stored
    /// license's update entitlement. `false` when no license is stored.
    pub fn can_receive_updates(&self, release_date: &str) -> Result<bool, LicenseGateError> {
        Ok(self
            .store
            .load_license()?
            .map(|license| crate::validator::can_receive_updates(&license, release_date))
            .unwrap_or(false))
    }

    /// Exchange `license_id` for a signed license and store it.
    ///
    /// # Errors
    /// - `ServerDisabled` without server integration
    /// - `ServerRejected` on `ok:false`
    /// - `ServerBlocked` when the issuer refuses activation for the license status
    /// - `ProtocolError` when the response carries no usable license
    /// - `SignatureMissing` / `SignatureInvalid` when the returned license fails the signature gate
    pub fn activate(
        &self,
        license_id: &str,
        machine: Map<String, Value>,
    ) -> Result<License, LicenseGateError> {
        let transport = self.transport_for("activation")?;
        let request = ActivateRequest {
            license_id: license_id.to_string(),
            product_id: self.config.product_id.clone(),
            fingerprint_hash: self.fingerprint_hash.clone(),
            machine,
        };

        let ActivateData {
            status,
            message,
            license_payload,
            ..
        } = client::request(transport, IssuerAction::Activate, &request)?;

        let Some(payload) = license_payload else {
            let status = status.unwrap_or_default();
            if LicenseStatus::from(status.as_str()).is_blocking() {
                return Err(LicenseGateError::ServerBlocked(status));
            }
            return Err(LicenseGateError::ProtocolError(
                "Activation response missing license_payload".to_string(),
            ));
        };

        let license = License::from_value(payload).map_err(|e| {
            LicenseGateError::ProtocolError(format!("Activation returned an unusable license: {}", e))
        })?;
        check_signature(
            &license,
            self.verifying_key.as_ref(),
            self.config.signature.require_signature,
        )?;

        self.store.save_license(&license)?;

        let now = self.clock.now_utc();
        let policy = Policy::resolve(&license, &self.config.defaults);
        let mut state = self.store.load_state()?;
        state.license_id = Some(if license.license_id.is_empty() {
            license_id.to_string()
        } else {
            license.license_id.clone()
        });
        state.product_id = Some(self.config.product_id.clone());
        state.first_activated_at.get_or_insert(now);
        state.locked_to_fingerprint_hash = Some(self.fingerprint_hash.clone());
        state.last_success_check_at = Some(now);
        state.next_check_due_at = days_after(now, policy.check_interval_days());
        state.last_server_status = Some(status.unwrap_or_else(|| "ACTIVE".to_string()));
        state.last_server_message = Some(message.unwrap_or_else(|| "Activated".to_string()));
        self.store.save_state(&state)?;

        info!(license_id = %license.license_id, "License activated");
        Ok(license)
    }

    /// Ask the issuer to move `license_id` to another machine.
    ///
    /// Local records are not touched; the move completes when the new
    /// machine activates.
    pub fn request_transfer(
        &self,
        license_id: &str,
        to_fingerprint_hash: &str,
        reason: Option<String>,
        contact: Option<TransferContact>,
    ) -> Result<TransferData, LicenseGateError> {
        let transport = self.transport_for("transfer requests")?;
        let request = TransferRequest {
            license_id: license_id.to_string(),
            product_id: self.config.product_id.clone(),
            from_fingerprint_hash: self.fingerprint_hash.clone(),
            to_fingerprint_hash: to_fingerprint_hash.to_string(),
            reason,
            contact,
        };
        let data: TransferData = client::request(transport, IssuerAction::TransferRequest, &request)?;
        info!(request_id = %data.request_id, "Transfer requested");
        Ok(data)
    }

    /// Ask the issuer whether the newest release is covered.
    pub fn check_updates(&self) -> Result<UpdatesData, LicenseGateError> {
        let transport = self.transport_for("update checks")?;
        let license = self
            .store
            .load_license()?
            .ok_or(LicenseGateError::MissingLicense)?;
        let request = UpdatesRequest {
            license_id: license.license_id,
            product_id: self.config.product_id.clone(),
            fingerprint_hash: self.fingerprint_hash.clone(),
        };
        client::request(transport, IssuerAction::Updates, &request)
    }

    fn transport_for(&self, operation: &'static str) -> Result<&dyn Transport, LicenseGateError> {
        self.transport
            .as_deref()
            .ok_or(LicenseGateError::ServerDisabled(operation))
    }
}

fn http_transport(
    config: &LicenseGateConfig,
) -> Result<Option<Arc<dyn Transport>>, LicenseGateError> {
    if !config.server.enabled {
        return Ok(None);
    }
    let client: Arc<dyn Transport> = Arc::new(IssuerClient::new(config)?);
    Ok(Some(client))
}

fn days_after(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|d| now.checked_add_signed(d))
}
