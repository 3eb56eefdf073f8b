use serde::Deserialize;
use thiserror::Error;

use crate::auth::StorageError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Server returned an empty or unusable response")]
    EmptyBody,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("No saved credentials - please log in first")]
    CredentialsNotFound,

    #[error("No valid token - please log in again")]
    NoValidToken,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// The part of an error body we try to surface to the user.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an `Http` error, preferring the server's `message` field.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .map(|m| Self::truncate_body(&m))
            .unwrap_or_else(|| format!("Server error: {}", status.as_u16()));

        ApiError::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Http { .. } | ApiError::EmptyBody
        )
    }

    /// Whether the local session must be dropped and the user sent to login.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::NoValidToken)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::EmptyBody
        } else if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: format!("Server error: {}", status.as_u16()),
            }
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_uses_server_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"message":"Email already registered","status":"error"}"#,
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[test]
    fn test_from_status_falls_back_to_status() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(err.to_string(), "Server error: 502");

        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":""}"#);
        assert_eq!(err.to_string(), "Server error: 500");
    }

    #[test]
    fn test_long_message_is_truncated() {
        let long = "x".repeat(2_000);
        let body = format!(r#"{{"message":"{}"}}"#, long);
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().contains("truncated, 2000 total bytes"));
    }

    #[test]
    fn test_retry_classification() {
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(ApiError::EmptyBody.is_retryable());
        assert!(ApiError::Http { status: 503, message: "down".into() }.is_retryable());
        assert!(!ApiError::SessionExpired.is_retryable());
        assert!(!ApiError::NoValidToken.is_retryable());
        assert!(!ApiError::CredentialsNotFound.is_retryable());
        assert!(!ApiError::Storage("disk".into()).is_retryable());
    }

    #[test]
    fn test_requires_login() {
        assert!(ApiError::SessionExpired.requires_login());
        assert!(ApiError::NoValidToken.requires_login());
        assert!(!ApiError::Network("timeout".into()).requires_login());
        assert!(!ApiError::CredentialsNotFound.requires_login());
    }
}
