use reqwest::{Response, StatusCode};
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no credential stored for tenant {0}")]
    CredentialNotFound(String),

    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("{operation} returned {status}: {body}")]
    UpstreamRequestFailed {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unable to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn upstream(operation: &'static str, status: StatusCode, body: String) -> Self {
        Self::UpstreamRequestFailed {
            operation,
            status,
            body,
        }
    }

    /// Passes 2xx responses through and turns anything else into
    /// `UpstreamRequestFailed` carrying the response body.
    pub async fn check_response(
        operation: &'static str,
        response: Response,
    ) -> BridgeResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Self::upstream(operation, status, body))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::UpstreamRequestFailed {
                status: StatusCode::CONFLICT,
                ..
            }
        )
    }
}
