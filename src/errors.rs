use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_SERVER_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    NetworkError,
    Timeout,
    ConnectionError,
    ParseError,
    /// Opaque code supplied by the server, or `HTTP_<status>` when it sent none.
    Server(String),
}

impl ErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError | ErrorCode::Timeout | ErrorCode::ConnectionError
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::Server(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    pub fn offline() -> Self {
        Self::network("No internet connection")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Server("INVALID_INPUT".to_string()), message)
    }

    pub fn server(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            code: ErrorCode::Server(code.into()),
            message: message.into(),
            details,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::connection(err.to_string())
        } else if err.is_decode() {
            ApiError::parse(err.to_string())
        } else {
            ApiError::network(err.to_string())
        }
    }
}
