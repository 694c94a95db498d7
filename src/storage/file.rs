//! File-based storage for the license and state records.
//!
//! Writes go to `<file>.tmp`, are flushed to disk, then renamed over the
//! target, so readers see either the old or the new content, never a
//! partial file.

use crate::storage::format::{ClientState, License};
use crate::LicenseGateError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable store for the two local records.
#[derive(Debug, Clone)]
pub struct FileStore {
    license_path: PathBuf,
    state_path: PathBuf,
}

impl FileStore {
    /// Create a store over the given paths. Nothing is touched on disk yet.
    pub fn new(license_path: PathBuf, state_path: PathBuf) -> Self {
        Self {
            license_path,
            state_path,
        }
    }

    /// License file location.
    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    /// State file location.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load the license; `Ok(None)` when no file exists.
    pub fn load_license(&self) -> Result<Option<License>, LicenseGateError> {
        let Some(json) = read_optional(&self.license_path)? else {
            return Ok(None);
        };
        let license = License::from_json(&json)?;
        debug!(license_id = %license.license_id, "license loaded");
        Ok(Some(license))
    }

    /// Replace the license file atomically.
    pub fn save_license(&self, license: &License) -> Result<(), LicenseGateError> {
        write_atomic(&self.license_path, license.to_json()?.as_bytes())
    }

    /// Load client state; an absent file yields the default state.
    pub fn load_state(&self) -> Result<ClientState, LicenseGateError> {
        match read_optional(&self.state_path)? {
            Some(json) => ClientState::from_json(&json),
            None => Ok(ClientState::default()),
        }
    }

    /// Replace the state file atomically.
    pub fn save_state(&self, state: &ClientState) -> Result<(), LicenseGateError> {
        write_atomic(&self.state_path, state.to_json()?.as_bytes())
    }
}

/// Temp file used while replacing `target`.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

fn read_optional(path: &Path) -> Result<Option<String>, LicenseGateError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path).map(Some).map_err(|e| {
        LicenseGateError::StorageIO(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Write `bytes` to `target` via temp file + rename.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), LicenseGateError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            LicenseGateError::StorageIO(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let temp_path = temp_path_for(target);

    let mut file = File::create(&temp_path)
        .map_err(|e| LicenseGateError::StorageIO(format!("Failed to create temp file: {}", e)))?;
    file.write_all(bytes)
        .map_err(|e| LicenseGateError::StorageIO(format!("Failed to write temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| LicenseGateError::StorageIO(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, target).map_err(|e| {
        LicenseGateError::StorageIO(format!("Failed to replace {}: {}", target.display(), e))
    })?;

    debug!(path = %target.display(), "record persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileStore {
        FileStore::new(
            dir.path().join("license.key"),
            dir.path().join("license.state.json"),
        )
    }

    #[test]
    fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.load_license().unwrap().is_none());
        assert_eq!(store.load_state().unwrap(), ClientState::default());
    }

    #[test]
    fn test_state_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = ClientState::default();
        state.license_id = Some("LIC-1".to_string());
        state.clock_guard.rollback_count = 2;
        state.last_success_check_at = Some(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap());
        store.save_state(&state).unwrap();

        assert_eq!(store.load_state().unwrap(), state);
        assert!(!temp_path_for(store.state_path()).exists());
    }

    #[test]
    fn test_license_roundtrip_keeps_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let license = License::from_value(json!({
            "schema_version": 1,
            "license_id": "LIC-1",
            "product_id": "p",
            "status": "ACTIVE",
            "custom": {"nested": [1, 2, 3]}
        }))
        .unwrap();
        store.save_license(&license).unwrap();

        let loaded = store.load_license().unwrap().unwrap();
        assert_eq!(loaded.document(), license.document());
    }

    #[test]
    fn test_legacy_license_is_normalized_on_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.license_path(),
            r#"{"payload":{"license_id":"LIC-9","product_id":"p"},"signature":{"alg":"ed25519","sig":"c2ln"}}"#,
        )
        .unwrap();

        let license = store.load_license().unwrap().unwrap();
        assert_eq!(license.license_id, "LIC-9");
        assert_eq!(license.schema_version, 1);
        assert_eq!(license.signature.as_deref(), Some("c2ln"));
    }

    #[test]
    fn test_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(
            dir.path().join("nested/a/license.key"),
            dir.path().join("nested/b/license.state.json"),
        );
        store.save_state(&ClientState::default()).unwrap();
        assert!(store.state_path().exists());
    }

    #[test]
    fn test_crash_before_rename_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut previous = ClientState::default();
        previous.clock_guard.rollback_count = 1;
        store.save_state(&previous).unwrap();

        // A crash after the temp write but before rename leaves a partial temp file behind.
        fs::write(temp_path_for(store.state_path()), b"{\"schema_version\": 1, \"clock_gu").unwrap();

        assert_eq!(store.load_state().unwrap(), previous);

        // The next write replaces the stale temp file and lands intact.
        let mut next = previous.clone();
        next.clock_guard.rollback_count = 2;
        store.save_state(&next).unwrap();
        assert_eq!(store.load_state().unwrap(), next);
        assert!(!temp_path_for(store.state_path()).exists());
    }

    #[test]
    fn test_corrupt_state_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.state_path(), b"{ truncated").unwrap();

        assert!(matches!(
            store.load_state(),
            Err(LicenseGateError::StateCorrupt(_))
        ));
    }

    #[test]
    fn test_unwritable_location_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file-not-dir");
        fs::write(&blocker, b"x").unwrap();
        let store = FileStore::new(blocker.join("license.key"), blocker.join("state.json"));

        assert!(matches!(
            store.save_state(&ClientState::default()),
            Err(LicenseGateError::StorageIO(_))
        ));
    }

    #[test]
    fn test_temp_path_naming() {
        assert_eq!(
            temp_path_for(Path::new("/var/app/license.state.json")),
            PathBuf::from("/var/app/license.state.json.tmp")
        );
    }
}
