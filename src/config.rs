//! Engine configuration.
//!
//! Loaded once at startup (usually from a JSON file next to the host
//! application) and validated before the engine is built.

use crate::LicenseGateError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no public key is configured.
pub const PUBLIC_KEY_ENV: &str = "PUBLIC_KEY_B64";

/// Default issuer request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 8;

/// Default number of tolerated clock rollbacks.
pub const DEFAULT_MAX_ROLLBACK_COUNT: u32 = 3;

/// Configuration for the license engine.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseGateConfig {
    /// Product identifier; must match `product_id` in the license.
    pub product_id: String,

    /// Signed license record. Defaults to `<data_dir>/<product_id>/license.key`.
    #[serde(default)]
    pub license_file: Option<PathBuf>,

    /// Mutable client state. Defaults to `<data_dir>/<product_id>/license.state.json`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Issuer connectivity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Offline policy used when the license carries none.
    #[serde(default)]
    pub defaults: PolicyDefaults,

    /// Clock rollback tolerance.
    #[serde(default)]
    pub clock_guard: ClockGuardConfig,

    /// Signature enforcement.
    #[serde(default)]
    pub signature: SignatureConfig,
}

/// Issuer connectivity settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Whether the engine talks to the issuer at all.
    #[serde(default)]
    pub enabled: bool,

    /// Issuer endpoint; the action is passed as `?action=<name>`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Sent as `X-Client-Version`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            client_version: default_client_version(),
        }
    }
}

/// Offline policy defaults. Unset values fall back to the built-in numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyDefaults {
    /// Days between scheduled check-ins.
    #[serde(default)]
    pub check_interval_days: Option<i64>,
    /// Days offline before a warning is raised.
    #[serde(default)]
    pub warn_after_days: Option<i64>,
    /// Days offline before the engine refuses to run.
    #[serde(default)]
    pub max_offline_days: Option<i64>,
}

/// Clock guard settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockGuardConfig {
    /// Rollbacks tolerated before validation fails.
    #[serde(default = "default_max_rollback_count")]
    pub max_rollback_count: u32,
}

impl Default for ClockGuardConfig {
    fn default() -> Self {
        Self {
            max_rollback_count: DEFAULT_MAX_ROLLBACK_COUNT,
        }
    }
}

/// Signature settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureConfig {
    /// Base64 Ed25519 public key (32 bytes).
    #[serde(default)]
    pub public_key_b64: Option<String>,

    /// Reject licenses that carry no signature.
    #[serde(default)]
    pub require_signature: bool,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_max_rollback_count() -> u32 {
    DEFAULT_MAX_ROLLBACK_COUNT
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl LicenseGateConfig {
    /// Minimal offline configuration for a product.
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            license_file: None,
            state_file: None,
            server: ServerConfig::default(),
            defaults: PolicyDefaults::default(),
            clock_guard: ClockGuardConfig::default(),
            signature: SignatureConfig::default(),
        }
    }

    /// Parse configuration from JSON text and apply environment fallbacks.
    pub fn from_json_str(json: &str) -> Result<Self, LicenseGateError> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| LicenseGateError::ConfigError(format!("Invalid config JSON: {}", e)))?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LicenseGateError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            LicenseGateError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    fn apply_env_fallbacks(&mut self) {
        if self.signature.public_key_b64.is_none() {
            if let Ok(key) = std::env::var(PUBLIC_KEY_ENV) {
                if !key.trim().is_empty() {
                    self.signature.public_key_b64 = Some(key.trim().to_string());
                }
            }
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LicenseGateError> {
        self.check(self.server.enabled)
    }

    /// Validation for an engine given its own transport; no URL is needed.
    pub(crate) fn validate_without_endpoint(&self) -> Result<(), LicenseGateError> {
        self.check(false)
    }

    fn check(&self, require_base_url: bool) -> Result<(), LicenseGateError> {
        if self.product_id.trim().is_empty() {
            return Err(LicenseGateError::ConfigError(
                "product_id cannot be empty".to_string(),
            ));
        }
        if require_base_url && self.base_url().is_none() {
            return Err(LicenseGateError::ConfigError(
                "server.base_url is required when server.enabled is true".to_string(),
            ));
        }
        if self.server.timeout_seconds == 0 {
            return Err(LicenseGateError::ConfigError(
                "server.timeout_seconds must be positive".to_string(),
            ));
        }
        match self.signature.public_key_b64.as_deref() {
            Some(key) => {
                let bytes = STANDARD.decode(key.trim()).map_err(|e| {
                    LicenseGateError::ConfigError(format!("public_key_b64 is not base64: {}", e))
                })?;
                if bytes.len() != 32 {
                    return Err(LicenseGateError::ConfigError(format!(
                        "public_key_b64 must decode to 32 bytes, got {}",
                        bytes.len()
                    )));
                }
            }
            None if self.signature.require_signature => {
                return Err(LicenseGateError::ConfigError(
                    "require_signature is set but no public key is configured".to_string(),
                ));
            }
            None => {}
        }
        Ok(())
    }

    /// Non-empty issuer base URL, if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.server
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Resolved license file location.
    pub fn license_path(&self) -> Result<PathBuf, LicenseGateError> {
        match &self.license_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.default_dir()?.join("license.key")),
        }
    }

    /// Resolved state file location.
    pub fn state_path(&self) -> Result<PathBuf, LicenseGateError> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.default_dir()?.join("license.state.json")),
        }
    }

    fn default_dir(&self) -> Result<PathBuf, LicenseGateError> {
        let base = dirs::data_dir().ok_or_else(|| {
            LicenseGateError::ConfigError("Could not find data directory".to_string())
        })?;
        Ok(base.join(&self.product_id))
    }
}
