//! Issuer-side data access.
//!
//! The service never opens a connection itself; it is handed a
//! [`LicenseStore`] at construction.

use crate::protocol::models::{IssuerAction, ProductVersion, TransferContact};
use crate::validator::parse_release_date;
use crate::LicenseGateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A license row as the issuer holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedLicense {
    /// License identifier.
    pub license_id: String,
    /// Product identifier.
    pub product_id: String,
    /// Current status (`ACTIVE`, `REVOKED`, ...).
    pub status: String,
    /// RFC 3339 issue time.
    #[serde(default)]
    pub issued_at: Option<String>,
    /// RFC 3339 expiry.
    #[serde(default)]
    pub expires_at: Option<String>,
    /// RFC 3339 end of update entitlement.
    #[serde(default)]
    pub updates_until: Option<String>,
    /// Whether the license is bound to a machine.
    #[serde(default)]
    pub fingerprint_bound: bool,
    /// Bound machine.
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
    /// Days between check-ins.
    pub check_interval_days: i64,
    /// Days offline before a warning.
    pub warn_after_days: i64,
    /// Days offline before a hard block.
    pub max_offline_days: i64,
}

impl IssuedLicense {
    /// Active license with the built-in policy numbers.
    pub fn new(license_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            license_id: license_id.into(),
            product_id: product_id.into(),
            status: "ACTIVE".to_string(),
            issued_at: None,
            expires_at: None,
            updates_until: None,
            fingerprint_bound: false,
            fingerprint_hash: None,
            check_interval_days: 30,
            warn_after_days: 180,
            max_offline_days: 365,
        }
    }

    /// Policy block as sent on the wire.
    pub fn policy(&self) -> Value {
        json!({
            "check_interval_days": self.check_interval_days,
            "warn_after_days": self.warn_after_days,
            "max_offline_days": self.max_offline_days,
        })
    }

    /// Unsigned license payload bound to `fingerprint_hash`.
    pub fn payload(&self, fingerprint_hash: &str) -> Value {
        json!({
            "license_id": self.license_id,
            "product_id": self.product_id,
            "status": self.status,
            "issued_at": self.issued_at,
            "expires_at": self.expires_at,
            "updates_until": self.updates_until,
            "fingerprint": {
                "mode": "machine",
                "bound": true,
                "fingerprint_hash": fingerprint_hash,
            },
            "policy": self.policy(),
        })
    }
}

/// A recorded issuer interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkin {
    /// License checked in.
    pub license_id: String,
    /// Machine that checked in.
    pub fingerprint_hash: String,
    /// Endpoint used.
    pub action: IssuerAction,
    /// Status reported back.
    pub server_status: String,
    /// When.
    pub at: DateTime<Utc>,
}

/// A pending machine transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// `TR-XXXXXXXX`.
    pub request_id: String,
    /// License to move.
    pub license_id: String,
    /// Current machine.
    pub from_fingerprint_hash: String,
    /// Target machine.
    pub to_fingerprint_hash: String,
    /// Stated reason.
    pub reason: Option<String>,
    /// Contact details.
    pub contact: Option<TransferContact>,
    /// `OPEN` on creation.
    pub status: String,
    /// When the request was received.
    pub created_at: DateTime<Utc>,
}

/// Query contract the issuer service needs from its data store.
pub trait LicenseStore: Send + Sync {
    /// License by id within a product.
    fn find_license(
        &self,
        license_id: &str,
        product_id: &str,
    ) -> Result<Option<IssuedLicense>, LicenseGateError>;

    /// Bind a license to a machine.
    fn bind_fingerprint(
        &self,
        license_id: &str,
        product_id: &str,
        fingerprint_hash: &str,
    ) -> Result<(), LicenseGateError>;

    /// Append a check-in record.
    fn record_checkin(&self, checkin: Checkin) -> Result<(), LicenseGateError>;

    /// Most recent release of a product.
    fn latest_version(&self, product_id: &str) -> Result<Option<ProductVersion>, LicenseGateError>;

    /// Persist a transfer request.
    fn insert_transfer(&self, transfer: TransferRecord) -> Result<(), LicenseGateError>;
}

/// `(product_id, license_id)`; license ids are only unique within a product.
type LicenseKey = (String, String);

fn license_key(product_id: &str, license_id: &str) -> LicenseKey {
    (product_id.to_string(), license_id.to_string())
}

#[derive(Debug, Default)]
struct Tables {
    licenses: HashMap<LicenseKey, IssuedLicense>,
    versions: HashMap<String, Vec<ProductVersion>>,
    checkins: Vec<Checkin>,
    transfers: Vec<TransferRecord>,
}

/// In-memory [`LicenseStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, LicenseGateError> {
        self.tables
            .lock()
            .map_err(|_| LicenseGateError::StoreError("store lock poisoned".to_string()))
    }

    /// Insert or replace a license row.
    pub fn insert_license(&self, license: IssuedLicense) -> Result<(), LicenseGateError> {
        let key = license_key(&license.product_id, &license.license_id);
        self.tables()?.licenses.insert(key, license);
        Ok(())
    }

    /// Change a license's status.
    pub fn set_status(
        &self,
        license_id: &str,
        product_id: &str,
        status: &str,
    ) -> Result<(), LicenseGateError> {
        let mut tables = self.tables()?;
        let license = tables
            .licenses
            .get_mut(&license_key(product_id, license_id))
            .ok_or_else(|| {
                LicenseGateError::StoreError(format!("no license {} for {}", license_id, product_id))
            })?;
        license.status = status.to_string();
        Ok(())
    }

    /// Register a product release.
    pub fn add_version(
        &self,
        product_id: &str,
        version: ProductVersion,
    ) -> Result<(), LicenseGateError> {
        self.tables()?
            .versions
            .entry(product_id.to_string())
            .or_default()
            .push(version);
        Ok(())
    }

    /// Current license row.
    pub fn license(
        &self,
        license_id: &str,
        product_id: &str,
    ) -> Result<Option<IssuedLicense>, LicenseGateError> {
        Ok(self
            .tables()?
            .licenses
            .get(&license_key(product_id, license_id))
            .cloned())
    }

    /// All recorded check-ins.
    pub fn checkins(&self) -> Result<Vec<Checkin>, LicenseGateError> {
        Ok(self.tables()?.checkins.clone())
    }

    /// All transfer requests.
    pub fn transfers(&self) -> Result<Vec<TransferRecord>, LicenseGateError> {
        Ok(self.tables()?.transfers.clone())
    }
}

impl LicenseStore for MemoryStore {
    fn find_license(
        &self,
        license_id: &str,
        product_id: &str,
    ) -> Result<Option<IssuedLicense>, LicenseGateError> {
        self.license(license_id, product_id)
    }

    fn bind_fingerprint(
        &self,
        license_id: &str,
        product_id: &str,
        fingerprint_hash: &str,
    ) -> Result<(), LicenseGateError> {
        let mut tables = self.tables()?;
        if let Some(license) = tables.licenses.get_mut(&license_key(product_id, license_id)) {
            license.fingerprint_bound = true;
            license.fingerprint_hash = Some(fingerprint_hash.to_string());
        }
        Ok(())
    }

    fn record_checkin(&self, checkin: Checkin) -> Result<(), LicenseGateError> {
        self.tables()?.checkins.push(checkin);
        Ok(())
    }

    fn latest_version(&self, product_id: &str) -> Result<Option<ProductVersion>, LicenseGateError> {
        Ok(self.tables()?.versions.get(product_id).and_then(|versions| {
            versions
                .iter()
                .max_by_key(|v| parse_release_date(&v.release_date))
                .cloned()
        }))
    }

    fn insert_transfer(&self, transfer: TransferRecord) -> Result<(), LicenseGateError> {
        self.tables()?.transfers.push(transfer);
        Ok(())
    }
}
