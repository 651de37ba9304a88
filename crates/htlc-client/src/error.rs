use thiserror::Error;

use crate::types::Endpoint;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error ([`reqwest::Error`])
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP status {code} on {endpoint}: {body}")]
    Status {
        /// Route that was called
        endpoint: Endpoint,
        /// Returned status code
        code: u16,
        /// Raw response body
        body: String,
    },

    /// Response envelope without a `data` field
    #[error("Missing data in response from {endpoint}: {}", .msg.as_deref().unwrap_or("no message"))]
    MissingData {
        /// Route that was called
        endpoint: Endpoint,
        /// Message of the envelope
        msg: Option<String>,
    },

    /// Response `data` could not be interpreted
    #[error("Invalid response data: {0}")]
    InvalidData(String),

    /// Serialization error ([`serde_json::Error`])
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal client error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code returned by the service, if the request reached it
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { code, .. } => Some(*code),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Main result type
pub type Result<T> = core::result::Result<T, Error>;
