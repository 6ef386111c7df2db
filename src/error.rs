use std::{io, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`crate::client::VaultClient`] and upload transports.
///
/// The `Display` output of each variant is what ends up in a per-file
/// `Error` status, so it is written for people rather than logs.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a structured error body.
    #[error("{message}")]
    Server { status: StatusCode, message: String },

    /// Non-success status without a usable error body.
    #[error("{operation} failed: {reason}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        reason: String,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid response from server: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The server reported the operation did not take effect (e.g. a delete answering `false`).
    #[error("{operation} was rejected by the server")]
    Rejected { operation: &'static str },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Server { status, .. } | ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_displays_message_only() {
        let err = ApiError::Server {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "File too large".to_string(),
        };
        assert_eq!(err.to_string(), "File too large");
        assert_eq!(err.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));
    }

    #[test]
    fn test_status_error_includes_operation() {
        let err = ApiError::Status {
            operation: "Upload",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: "Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "Upload failed: Internal Server Error");
    }
}
