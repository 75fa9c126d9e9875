use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Unauthorized - event code may be invalid")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// How the engine should treat a failed remote read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// No record yet; an empty but valid result
    NotFound,
    /// Permission problem; never retried
    Denied,
    /// Server-side or transport hiccup; worth retrying
    Transient,
    /// Payload did not have the expected shape
    Malformed,
    Other,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

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

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(truncated),
            404 => ApiError::NotFound(truncated),
            408 => ApiError::Timeout(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            code => ApiError::UnexpectedStatus {
                status: code,
                body: truncated,
            },
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            ApiError::NotFound(_) => FailureClass::NotFound,
            ApiError::Forbidden(_) | ApiError::Unauthorized => FailureClass::Denied,
            ApiError::RateLimited
            | ApiError::ServerError(_)
            | ApiError::Timeout(_)
            | ApiError::NetworkError(_) => FailureClass::Transient,
            ApiError::InvalidResponse(_) => FailureClass::Malformed,
            ApiError::InvalidUrl(_) | ApiError::UnexpectedStatus { .. } => FailureClass::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, &err.to_string())
        } else {
            ApiError::NetworkError(err)
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}
