use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Longest upstream body echoed back inside an error envelope
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Unified error type for the catalog relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No egress proxies configured")]
    NoProxiesConfigured,

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // Transport errors
    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    // Terminal relay outcomes
    #[error("Upstream returned status {status}")]
    UpstreamPermanent { status: u16, body: String },

    #[error("Max retries exceeded after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Invalid response body: {0}")]
    InvalidResponseBody(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            RelayError::ProxyConnectionFailed(_)
            | RelayError::Http(_)
            | RelayError::UpstreamPermanent { .. }
            | RelayError::RetriesExhausted { .. }
            | RelayError::InvalidResponseBody(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RelayError::InvalidConfig(_)
            | RelayError::NoProxiesConfigured
            | RelayError::InvalidProxyAddress(_)
            | RelayError::Io(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind used in the error envelope
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::UpstreamPermanent { .. } => "upstream_error",
            RelayError::RetriesExhausted { .. } => "exhausted",
            RelayError::InvalidResponseBody(_) => "invalid_response_body",
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::Timeout => "timeout",
            RelayError::ProxyConnectionFailed(_) | RelayError::Http(_) => "transport_error",
            _ => "internal_error",
        }
    }

    /// Build the JSON error envelope returned to API callers
    pub fn envelope(&self) -> Value {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("error".into(), json!(self.kind()));
        body.insert("message".into(), json!(self.to_string()));

        match self {
            RelayError::UpstreamPermanent { status, body: text } => {
                body.insert("status_code".into(), json!(status));
                body.insert("body".into(), json!(truncate_body(text)));
            }
            RelayError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                body.insert("attempts".into(), json!(attempts));
                if let Some(last) = last_error {
                    body.insert("last_error".into(), json!(truncate_body(last)));
                }
            }
            _ => {}
        }

        Value::Object(body)
    }
}

/// Truncate a body to [`MAX_ERROR_BODY_CHARS`] characters
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else if err.is_connect() {
            RelayError::ProxyConnectionFailed(err.to_string())
        } else {
            RelayError::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::InvalidProxyAddress(err.to_string())
    }
}
