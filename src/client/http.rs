//! Reqwest-based HTTP client for the issuer API.
//!
//! The body is parsed as an envelope whatever the HTTP status; only network
//! failures and non-JSON bodies are transport errors.

use crate::client::Transport;
use crate::config::LicenseGateConfig;
use crate::protocol::models::{Envelope, IssuerAction};
use crate::LicenseGateError;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the product id.
pub const PRODUCT_ID_HEADER: &str = "X-Product-Id";

/// Header carrying the client version.
pub const CLIENT_VERSION_HEADER: &str = "X-Client-Version";

/// Blocking issuer client.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    client: Client,
    base_url: String,
    product_id: String,
    client_version: String,
    user_agent: String,
    timeout: Duration,
}

impl IssuerClient {
    /// Build a client from config. Requires `server.base_url`.
    pub fn new(config: &LicenseGateConfig) -> Result<Self, LicenseGateError> {
        let base_url = config.base_url().ok_or_else(|| {
            LicenseGateError::ConfigError("server.base_url is not configured".to_string())
        })?;
        let timeout = Duration::from_secs(config.server.timeout_seconds);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LicenseGateError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            product_id: config.product_id.clone(),
            client_version: config.server.client_version.clone(),
            user_agent: build_user_agent(config),
            timeout,
        })
    }

    /// Full URL for an action.
    pub fn endpoint(&self, action: IssuerAction) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}action={}", self.base_url, separator, action.as_str())
    }

    /// Configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for IssuerClient {
    fn call(&self, action: IssuerAction, body: &Value) -> Result<Envelope, LicenseGateError> {
        let url = self.endpoint(action);
        debug!(action = %action, "Calling issuer");

        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(PRODUCT_ID_HEADER, &self.product_id)
            .header(CLIENT_VERSION_HEADER, &self.client_version)
            .json(body)
            .send()
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("Request timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("HTTP request failed: {}", e)
                };
                warn!(action = %action, %reason, "Issuer unreachable");
                LicenseGateError::Transport(reason)
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| LicenseGateError::Transport(format!("Failed to read body: {}", e)))?;

        serde_json::from_str::<Envelope>(&text).map_err(|_| {
            warn!(action = %action, status, "Issuer returned a non-JSON body");
            LicenseGateError::Transport(format!("Invalid server response (HTTP {})", status))
        })
    }
}

/// `licensegate/<version> <product>/<client_version>`
pub fn build_user_agent(config: &LicenseGateConfig) -> String {
    format!(
        "licensegate/{} {}/{}",
        env!("CARGO_PKG_VERSION"),
        config.product_id,
        config.server.client_version
    )
}
