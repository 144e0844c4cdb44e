use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::utils::{extract_html_message, truncate};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Login on cooldown until {until}")]
    LoginOnCooldown { until: DateTime<Utc> },

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("HTTP {code}: {message}")]
    RequestRejected { code: u16, message: String },

    #[error("Received a text response, expected JSON response. Message: {0}")]
    UnexpectedTextResponse(String),

    #[error("Credential storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No account configured - set AUTH_EMAIL and AUTH_PW, or UBI_BASIC_TOKEN")]
    MissingAccount,

    #[error("Invalid value for header {0}")]
    InvalidHeader(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Maximum length for response bodies embedded in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Message used when a non-JSON response had nothing readable in it
const EMPTY_BODY_MESSAGE: &str = "empty response body";

impl ApiError {
    /// Build the error for a body that could not be decoded as JSON.
    pub fn unexpected_text(body: &str) -> Self {
        let message = extract_html_message(body);
        if message.is_empty() {
            return ApiError::UnexpectedTextResponse(EMPTY_BODY_MESSAGE.to_string());
        }
        ApiError::UnexpectedTextResponse(truncate(&message, MAX_ERROR_BODY_LENGTH))
    }

    pub fn storage(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        ApiError::Storage {
            path: path.into(),
            source: source.into(),
        }
    }

    /// True for the application-level 401 envelope that triggers reacquisition.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::RequestRejected { code: 401, .. })
    }

    /// Errors that fail identically on an immediate second attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApiError::LoginOnCooldown { .. }
                | ApiError::Cancelled
                | ApiError::Storage { .. }
                | ApiError::MissingAccount
                | ApiError::InvalidHeader(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejected_display() {
        let err = ApiError::RequestRejected {
            code: 404,
            message: "Missing resource profiles/abc".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: Missing resource profiles/abc");
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_is_unauthorized() {
        let err = ApiError::RequestRejected {
            code: 401,
            message: String::new(),
        };
        assert!(err.is_unauthorized());
        assert!(!ApiError::AuthRejected("nope".into()).is_unauthorized());
    }

    #[test]
    fn test_unexpected_text_truncates() {
        let body = "x".repeat(2000);
        match ApiError::unexpected_text(&body) {
            ApiError::UnexpectedTextResponse(msg) => {
                assert_eq!(msg.chars().count(), MAX_ERROR_BODY_LENGTH);
                assert!(msg.ends_with("..."));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_text_empty_body() {
        for body in ["", "   \n", "<html><body><h1></h1></body></html>"] {
            match ApiError::unexpected_text(body) {
                ApiError::UnexpectedTextResponse(msg) => assert_eq!(msg, EMPTY_BODY_MESSAGE),
                other => panic!("unexpected variant: {other:?}"),
            }
        }
    }

    #[test]
    fn test_terminal_errors() {
        assert!(ApiError::Cancelled.is_terminal());
        assert!(ApiError::LoginOnCooldown { until: Utc::now() }.is_terminal());
        assert!(!ApiError::AuthRejected("HTTP 401: bad".into()).is_terminal());
    }
}
