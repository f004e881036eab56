//! Error kinds shared by the request client and the loader, and parsing
//! of server error bodies.

use serde::Deserialize;
use thiserror::Error;

/// Network-level failure kinds. These are the only failures the request
/// client retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    /// The attempt did not complete (connect, send or receive) in time.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    ConnectionError(String),
    /// The server answered with a 5xx status.
    #[error("server error: HTTP {0}")]
    ServerError(u16),
}

/// Terminal outcome of a logical API call, as seen by callers and the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Caller-supplied input was rejected before any request was sent.
    #[error("invalid input: {0}")]
    Validation(String),
    /// A 4xx response (other than session expiry).
    #[error("request rejected with HTTP {status}: {message}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// `msg` / `error` field of the response body, or a generic text.
        message: String,
    },
    /// The bearer token has expired; stored credentials were cleared.
    #[error("session expired, please log in again")]
    SessionExpired,
    /// Retry budget exhausted on a network-level failure.
    #[error("network failure: {0}")]
    Network(#[from] NetworkFailure),
    /// A 2xx body could not be decoded into the expected shape.
    #[error("could not decode response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Shorthand for [`ApiError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => Some(*status),
            Self::SessionExpired => Some(401),
            Self::Network(NetworkFailure::ServerError(status)) => Some(*status),
            _ => None,
        }
    }
}

/// Error body shape returned by the upstream API: `{msg}` or `{error}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Preferred message field.
    #[serde(default)]
    pub msg: Option<String>,
    /// Fallback message field.
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Parses an error body; anything that is not a JSON object yields an
    /// empty body.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Human readable message, falling back to `HTTP <status>`.
    pub fn message(&self, status: u16) -> String {
        self.msg
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("HTTP {status}"))
    }

    /// True when the body reports an expired bearer token.
    pub fn indicates_expired_token(&self) -> bool {
        [self.msg.as_deref(), self.error.as_deref()]
            .into_iter()
            .flatten()
            .any(|m| m.to_ascii_lowercase().contains("token has expired"))
    }
}
