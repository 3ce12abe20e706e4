//! Client error types

use apimart_core::{CoreError, ResponseCode, ValidationErrors};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What the backend said about a failed request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub code: Option<ResponseCode>,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl ApiFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Client error types
///
/// Cloneable so a single refresh failure can be handed to every request
/// queued behind it.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(Arc<reqwest::Error>),

    /// The request did not finish within its timeout
    #[error("Request timeout")]
    Timeout,

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// 400 from the backend
    #[error("Bad request: {0}")]
    BadRequest(ApiFailure),

    /// 401 from the backend
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(ApiFailure),

    /// 403 from the backend
    #[error("Forbidden: {0}")]
    Forbidden(ApiFailure),

    /// 404 from the backend
    #[error("Resource not found: {0}")]
    NotFound(ApiFailure),

    /// Any other non-2xx status
    #[error("Server error {status}: {failure}")]
    ServerError { status: u16, failure: ApiFailure },

    /// 2xx response whose envelope reports `success: false`
    #[error("Request rejected: {0}")]
    Rejected(ApiFailure),

    /// Token refresh failed; local tokens have been cleared
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Input failed client-side validation; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Response was well-formed but missing what the call needs
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Token persistence failed
    #[error("Token store error: {0}")]
    TokenStore(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, failure: ApiFailure) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(failure),
            401 => Self::AuthenticationFailed(failure),
            403 => Self::Forbidden(failure),
            404 => Self::NotFound(failure),
            _ => Self::ServerError {
                status: status.as_u16(),
                failure,
            },
        }
    }

    /// HTTP status behind this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::ServerError { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Backend failure details, if any
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::BadRequest(f)
            | Self::AuthenticationFailed(f)
            | Self::Forbidden(f)
            | Self::NotFound(f)
            | Self::Rejected(f)
            | Self::ServerError { failure: f, .. } => Some(f),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Whether the user has to sign in again
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::SessionExpired(_))
    }

    /// Transient failures worth offering a retry for
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Request(_) => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(Arc::new(err))
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn maps_status_codes() {
        let failure = ApiFailure::new("nope");
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, failure.clone()),
            ClientError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::FORBIDDEN, failure.clone()),
            ClientError::Forbidden(_)
        ));
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, failure);
        assert_eq!(err.status(), Some(502));
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_expiry_covers_refresh_failure() {
        assert!(ClientError::SessionExpired("gone".into()).is_auth_expired());
        assert!(ClientError::AuthenticationFailed(ApiFailure::new("401")).is_auth_expired());
        assert!(!ClientError::Timeout.is_auth_expired());
    }

    #[test]
    fn failure_display_includes_code() {
        let failure = ApiFailure {
            code: Some(ResponseCode::Text("API_NOT_FOUND".into())),
            message: "API does not exist".into(),
            details: None,
        };
        let err = ClientError::NotFound(failure);
        assert_eq!(
            err.to_string(),
            "Resource not found: API does not exist (API_NOT_FOUND)"
        );
    }
}
