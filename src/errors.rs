//! Error and advisory types.
//!
//! Every error returned by the engine is fatal for the host application.
//! Non-blocking conditions are reported as [`Advisory`] values instead.

use std::fmt;
use thiserror::Error;

/// Fatal conditions raised by license validation, activation or persistence.
#[derive(Debug, Error)]
pub enum LicenseGateError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A server-backed operation was requested while server integration is off.
    #[error("Server integration is disabled: {0}")]
    ServerDisabled(&'static str),

    /// No license file is present.
    #[error("No license found. Please activate the software.")]
    MissingLicense,

    /// License file exists but is not a usable license document.
    #[error("License file is malformed: {0}")]
    LicenseMalformed(String),

    /// License schema version is not the one this engine understands.
    #[error("Unsupported license schema version {found} (expected {expected})")]
    SchemaMismatch {
        /// Version found in the license.
        found: i64,
        /// Version supported by the engine.
        expected: i64,
    },

    /// License was issued for another product.
    #[error("License product mismatch")]
    ProductMismatch,

    /// License carries no status.
    #[error("License status missing")]
    StatusMissing,

    /// License status forbids use.
    #[error("License not valid for use: {0}")]
    StatusBlocked(String),

    /// `expires_at` is absent or not RFC 3339.
    #[error("License expires_at missing or invalid")]
    ExpiryInvalid,

    /// License is past its expiry.
    #[error("License expired at {expires_at}")]
    Expired {
        /// Expiry timestamp as stored in the license.
        expires_at: String,
    },

    /// License is machine-bound but carries no fingerprint hash.
    #[error("License fingerprint missing")]
    FingerprintMissing,

    /// License is bound to another machine.
    #[error("Machine fingerprint mismatch")]
    FingerprintMismatch,

    /// Signature enforcement is on and the license is unsigned.
    #[error("License signature missing")]
    SignatureMissing,

    /// License signature did not verify.
    #[error("License signature verification failed")]
    SignatureInvalid,

    /// System clock was moved backwards too many times.
    #[error("System clock rollback detected too many times ({count} > {max})")]
    ClockRollback {
        /// Rollbacks observed so far.
        count: u32,
        /// Configured ceiling.
        max: u32,
    },

    /// Client has been offline longer than the policy allows.
    #[error("License requires internet validation. Offline limit exceeded ({offline_days} > {max_offline_days} days)")]
    OfflineLimitExceeded {
        /// Whole days since the last successful check-in.
        offline_days: i64,
        /// Policy ceiling.
        max_offline_days: i64,
    },

    /// Issuer answered `ok:false`.
    #[error("Issuer rejected request ({code}): {message}")]
    ServerRejected {
        /// Issuer error code (e.g. `LICENSE_NOT_FOUND`).
        code: String,
        /// Issuer error message.
        message: String,
    },

    /// Issuer reported a blocking license status during a check-in.
    #[error("License not valid: {0}")]
    ServerBlocked(String),

    /// Response from the issuer could not be interpreted.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Network failure, timeout or non-JSON response.
    #[error("Issuer transport error: {0}")]
    Transport(String),

    /// Reading or writing a local record failed.
    #[error("Storage I/O error: {0}")]
    StorageIO(String),

    /// State file exists but cannot be parsed.
    #[error("License state file is corrupt: {0}")]
    StateCorrupt(String),

    /// Key material could not be decoded.
    #[error("Invalid key material: {0}")]
    KeyError(String),

    /// Issuer-side store failure.
    #[error("Issuer store error: {0}")]
    StoreError(String),
}

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed or incomplete configuration.
    Configuration,
    /// The license itself cannot be trusted.
    Trust,
    /// Tamper heuristics tripped.
    Integrity,
    /// Offline policy exceeded.
    Policy,
    /// Network-level failure.
    Transport,
    /// Issuer declared the license unusable.
    Server,
    /// Local environment could not persist or read records.
    Persistence,
}

impl LicenseGateError {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_INVALID",
            Self::ServerDisabled(_) => "SERVER_DISABLED",
            Self::MissingLicense => "LICENSE_MISSING",
            Self::LicenseMalformed(_) => "LICENSE_MALFORMED",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::ProductMismatch => "PRODUCT_MISMATCH",
            Self::StatusMissing => "STATUS_MISSING",
            Self::StatusBlocked(_) => "STATUS_BLOCKED",
            Self::ExpiryInvalid => "EXPIRY_INVALID",
            Self::Expired { .. } => "LICENSE_EXPIRED",
            Self::FingerprintMissing => "FINGERPRINT_MISSING",
            Self::FingerprintMismatch => "FINGERPRINT_MISMATCH",
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::ClockRollback { .. } => "CLOCK_ROLLBACK",
            Self::OfflineLimitExceeded { .. } => "OFFLINE_LIMIT",
            Self::ServerRejected { .. } => "SERVER_REJECTED",
            Self::ServerBlocked(_) => "SERVER_BLOCKED",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::StorageIO(_) => "STORAGE_IO",
            Self::StateCorrupt(_) => "STATE_CORRUPT",
            Self::KeyError(_) => "KEY_INVALID",
            Self::StoreError(_) => "STORE_ERROR",
        }
    }

    /// Which part of the taxonomy this failure belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ConfigError(_) | Self::ServerDisabled(_) | Self::KeyError(_) => {
                FailureKind::Configuration
            }
            Self::MissingLicense
            | Self::LicenseMalformed(_)
            | Self::SchemaMismatch { .. }
            | Self::ProductMismatch
            | Self::StatusMissing
            | Self::StatusBlocked(_)
            | Self::ExpiryInvalid
            | Self::Expired { .. }
            | Self::FingerprintMissing
            | Self::FingerprintMismatch
            | Self::SignatureMissing
            | Self::SignatureInvalid => FailureKind::Trust,
            Self::ClockRollback { .. } => FailureKind::Integrity,
            Self::OfflineLimitExceeded { .. } => FailureKind::Policy,
            Self::Transport(_) | Self::ProtocolError(_) => FailureKind::Transport,
            Self::ServerRejected { .. } | Self::ServerBlocked(_) => FailureKind::Server,
            Self::StorageIO(_) | Self::StateCorrupt(_) | Self::StoreError(_) => {
                FailureKind::Persistence
            }
        }
    }
}

/// Non-blocking condition surfaced to the host for optional display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Offline long enough to warn, still inside the grace window.
    ValidationOverdue {
        /// Whole days since the last successful check-in.
        offline_days: i64,
    },
    /// Remote revocation and transfers are unavailable.
    ServerDisabled,
    /// A due check-in could not reach the issuer.
    CheckSkipped {
        /// Why the check did not complete.
        reason: String,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationOverdue { offline_days } => write!(
                f,
                "Validation overdue. Offline days: {}. Please connect to the internet.",
                offline_days
            ),
            Self::ServerDisabled => f.write_str(
                "Online validation is disabled. Remote revocation and transfers are not available.",
            ),
            Self::CheckSkipped { reason } => write!(f, "Validation check skipped: {}", reason),
        }
    }
}

/// Result of a best-effort step. Fatal outcomes travel as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The step ran to completion.
    Completed,
    /// The step failed in a recoverable way; cached trust stands.
    Recovered(Advisory),
}
