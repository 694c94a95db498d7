//! Pure license checks.
//!
//! Nothing in here touches disk, network or the wall clock; `now` is always
//! passed in. The first failing check determines the error.

use crate::crypto::pipeline::verify_license;
use crate::storage::format::{parse_rfc3339, License, SUPPORTED_SCHEMA_VERSION};
use crate::LicenseGateError;
use chrono::{DateTime, NaiveDate, Utc};
use ed25519_dalek::VerifyingKey;
use tracing::debug;

/// Structural and temporal checks.
///
/// Order: schema version, product, status present, status not blocked,
/// expiry parseable, not expired. A license expiring exactly at `now` is
/// still valid.
pub fn validate_core(
    license: &License,
    expected_product_id: &str,
    now: DateTime<Utc>,
) -> Result<(), LicenseGateError> {
    if license.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(LicenseGateError::SchemaMismatch {
            found: license.schema_version,
            expected: SUPPORTED_SCHEMA_VERSION,
        });
    }

    if license.product_id != expected_product_id {
        return Err(LicenseGateError::ProductMismatch);
    }

    let status = match &license.status {
        Some(status) if !status.as_str().trim().is_empty() => status,
        _ => return Err(LicenseGateError::StatusMissing),
    };
    if status.is_blocking() {
        return Err(LicenseGateError::StatusBlocked(status.to_string()));
    }

    let expires_at = license
        .expires_at_utc()
        .ok_or(LicenseGateError::ExpiryInvalid)?;
    if now > expires_at {
        return Err(LicenseGateError::Expired {
            expires_at: license.expires_at.clone().unwrap_or_default(),
        });
    }

    debug!(license_id = %license.license_id, "License core checks passed");
    Ok(())
}

/// Machine binding check. Unbound licenses always pass.
pub fn validate_fingerprint(license: &License, current_hash: &str) -> Result<(), LicenseGateError> {
    let Some(binding) = &license.fingerprint else {
        return Ok(());
    };
    if !binding.bound {
        return Ok(());
    }

    let expected = binding
        .fingerprint_hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(LicenseGateError::FingerprintMissing)?;

    if expected != current_hash {
        return Err(LicenseGateError::FingerprintMismatch);
    }
    Ok(())
}

/// Signature gate.
///
/// With a key configured, any signature present must verify. With
/// `required`, an unsigned license is rejected.
pub fn check_signature(
    license: &License,
    verifying_key: Option<&VerifyingKey>,
    required: bool,
) -> Result<(), LicenseGateError> {
    let signed = license
        .signature
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());

    if !signed {
        return if required {
            Err(LicenseGateError::SignatureMissing)
        } else {
            Ok(())
        };
    }

    match verifying_key {
        Some(key) if verify_license(license, key) => Ok(()),
        Some(_) => Err(LicenseGateError::SignatureInvalid),
        None if required => Err(LicenseGateError::SignatureInvalid),
        None => Ok(()),
    }
}

/// Whether a release published at `release_date` is covered by the
/// license's update entitlement. Unparseable dates are never covered.
pub fn can_receive_updates(license: &License, release_date: &str) -> bool {
    match (license.updates_until_utc(), parse_release_date(release_date)) {
        (Some(until), Some(release)) => release <= until,
        _ => false,
    }
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_release_date(s: &str) -> Option<DateTime<Utc>> {
    parse_rfc3339(Some(s)).or_else(|| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}
