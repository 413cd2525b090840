//! Client for the Relay Gateway
//!
//! Deliberately thin: it attaches the shared credential, sends the request,
//! and hands back whatever the gateway said. It never retries and never sets
//! its own timeout; the gateway's job deadline bounds every call.

use relay_common::{
    models::{DepositRequest, ErrorResponse, WithdrawRequest, AUTH_HEADER, CORRELATION_HEADER},
    Credential, ErrorCode, OperationKind,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Failures reaching or understanding the gateway, as opposed to errors the
/// gateway itself classified.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Relay gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Relay gateway returned {status} without a readable error body")]
    BadStatus { status: u16, body: String },

    #[error("Relay gateway returned a malformed body: {0}")]
    MalformedBody(String),
}

impl ForwardError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::TransportError
    }

    /// Finer-grained transport failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::BadStatus { .. } => "bad_status",
            ForwardError::MalformedBody(_) => "malformed_body",
        }
    }
}

/// A gateway response, relayed unmodified.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub status: u16,
    pub correlation_id: Option<String>,
    pub body: serde_json::Value,
}

impl GatewayReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Client for forwarding operations to the Relay Gateway
pub struct ForwardingClient {
    base_url: String,
    credential: Option<Credential>,
    http: reqwest::Client,
}

impl ForwardingClient {
    /// Create a new forwarding client
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn deposit(&self, request: &DepositRequest) -> Result<GatewayReply, ForwardError> {
        self.forward(OperationKind::Deposit, request).await
    }

    pub async fn withdraw(&self, request: &WithdrawRequest) -> Result<GatewayReply, ForwardError> {
        self.forward(OperationKind::Withdraw, request).await
    }

    /// Send an operation to the gateway's `/{kind}` endpoint.
    pub async fn forward<B: Serialize + ?Sized>(
        &self,
        kind: OperationKind,
        body: &B,
    ) -> Result<GatewayReply, ForwardError> {
        let url = format!("{}/{}", self.base_url, kind.as_str());
        debug!("Forwarding {} to relay gateway: {}", kind, url);

        let mut request = self.http.post(&url).json(body);
        if let Some(credential) = &self.credential {
            request = request.header(AUTH_HEADER, credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ForwardError::Unreachable(e.to_string()))?;

        read_reply(response).await
    }

    /// Fetch the gateway's health report.
    pub async fn health(&self) -> Result<GatewayReply, ForwardError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ForwardError::Unreachable(e.to_string()))?;

        read_reply(response).await
    }
}

async fn read_reply(response: reqwest::Response) -> Result<GatewayReply, ForwardError> {
    let status = response.status().as_u16();
    let correlation_id = response
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let raw = response
        .text()
        .await
        .map_err(|e| ForwardError::MalformedBody(e.to_string()))?;

    if (200..300).contains(&status) {
        let body: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ForwardError::MalformedBody(e.to_string()))?;
        if !body.is_object() {
            return Err(ForwardError::MalformedBody(
                "expected a JSON object".to_string(),
            ));
        }
        return Ok(GatewayReply {
            status,
            correlation_id,
            body,
        });
    }

    // Non-2xx: relay it only if it is a classified gateway error
    let classified = serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .filter(|body| serde_json::from_value::<ErrorResponse>(body.clone()).is_ok());

    match classified {
        Some(body) => Ok(GatewayReply {
            status,
            correlation_id,
            body,
        }),
        None => {
            warn!(status, "Relay gateway returned an unclassified error");
            Err(ForwardError::BadStatus { status, body: raw })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ForwardingClient::new("http://127.0.0.1:8090/", None);
        assert_eq!(client.base_url(), "http://127.0.0.1:8090");
    }

    #[test]
    fn test_transport_errors_share_one_code() {
        let errors = [
            ForwardError::Unreachable("refused".into()),
            ForwardError::BadStatus {
                status: 502,
                body: "<html>".into(),
            },
            ForwardError::MalformedBody("eof".into()),
        ];
        let kinds: Vec<_> = errors.iter().map(ForwardError::kind).collect();
        assert_eq!(kinds, ["unreachable", "bad_status", "malformed_body"]);
        assert!(errors.iter().all(|e| e.code() == ErrorCode::TransportError));
    }
}
