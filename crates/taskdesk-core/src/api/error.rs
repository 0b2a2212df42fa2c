use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// What the server said about a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Server-supplied `error` field, else its `detail` field
    pub message: Option<String>,
    /// Raw response body, truncated
    pub body: String,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.body.is_empty()) {
            (Some(message), _) => f.write_str(message),
            (None, false) => f.write_str(&self.body),
            (None, true) => f.write_str("no details"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(ErrorDetail),

    #[error("Access denied: {0}")]
    AccessDenied(ErrorDetail),

    #[error("Resource not found: {0}")]
    NotFound(ErrorDetail),

    #[error("Request rejected ({status}): {detail}")]
    Validation { status: u16, detail: ErrorDetail },

    #[error("Rate limited - please wait before retrying")]
    RateLimited(ErrorDetail),

    #[error("Server error ({status}): {detail}")]
    ServerError { status: u16, detail: ErrorDetail },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session refresh failed: {0}")]
    RefreshFailed(#[source] Box<ApiError>),

    #[error("Session storage error: {0}")]
    Storage(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

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

    /// Pull the `error` field, else the `detail` field, out of a JSON body
    fn server_message_from(body: &str) -> Option<String> {
        let parsed: ServerErrorBody = serde_json::from_str(body).ok()?;
        let as_text = |value: serde_json::Value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Null => None,
            serde_json::Value::String(_) => None,
            other => Some(other.to_string()),
        };
        parsed
            .error
            .and_then(as_text)
            .or_else(|| parsed.detail.and_then(as_text))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = ErrorDetail {
            message: Self::server_message_from(body),
            body: Self::truncate_body(body),
        };
        match status.as_u16() {
            401 => ApiError::Unauthorized(detail),
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            429 => ApiError::RateLimited(detail),
            code @ 500..=599 => ApiError::ServerError {
                status: code,
                detail,
            },
            code => ApiError::Validation {
                status: code,
                detail,
            },
        }
    }

    /// HTTP status of the failed response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited(_) => Some(429),
            ApiError::Validation { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            ApiError::Unauthorized(detail)
            | ApiError::AccessDenied(detail)
            | ApiError::NotFound(detail)
            | ApiError::RateLimited(detail) => Some(detail),
            ApiError::Validation { detail, .. } | ApiError::ServerError { detail, .. } => {
                Some(detail)
            }
            _ => None,
        }
    }

    /// Message the server put in its `error` or `detail` field
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::RefreshFailed(inner) => inner.server_message(),
            other => other.detail().and_then(|d| d.message.as_deref()),
        }
    }

    /// Text for a user-visible notice: server message first, then our own
    pub fn user_message(&self) -> String {
        match self.server_message() {
            Some(message) => message.to_string(),
            None => match self {
                ApiError::NetworkError(e) => e.to_string(),
                other => other.to_string(),
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}
