//! Issuer transport.

pub mod http;

pub use http::IssuerClient;

use crate::protocol::models::{Envelope, IssuerAction};
use crate::LicenseGateError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// One request/response exchange with the issuer.
///
/// `Err` means the exchange itself failed (network, timeout, non-JSON).
/// An issuer-side refusal arrives as an `Ok` envelope with `ok: false`.
pub trait Transport: Send + Sync {
    /// Send `body` to `action` and return the decoded envelope.
    fn call(&self, action: IssuerAction, body: &Value) -> Result<Envelope, LicenseGateError>;
}

/// Serialize `request`, send it and return the raw envelope.
pub fn exchange<Req: Serialize>(
    transport: &dyn Transport,
    action: IssuerAction,
    request: &Req,
) -> Result<Envelope, LicenseGateError> {
    let body = serde_json::to_value(request)
        .map_err(|e| LicenseGateError::ProtocolError(format!("Failed to serialize: {}", e)))?;
    transport.call(action, &body)
}

/// [`exchange`] and decode the `data` member.
pub fn request<Req: Serialize, Resp: DeserializeOwned>(
    transport: &dyn Transport,
    action: IssuerAction,
    request: &Req,
) -> Result<Resp, LicenseGateError> {
    exchange(transport, action, request)?.into_data()
}
