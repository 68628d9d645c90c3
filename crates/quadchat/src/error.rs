// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Rejected locally before any network call.
    Validation,
    /// The backend refused the caller's credentials.
    Unauthorized,
    /// Transport failure or timeout talking to the REST API.
    Network,
    /// Non-success response or undecodable body from the REST API.
    Server,
    /// Push channel failure.
    Channel,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Network => "NETWORK",
            Self::Server => "SERVER",
            Self::Channel => "CHANNEL",
        }
    }

    /// Map an HTTP status from the REST API to an error code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            _ => Self::Server,
        }
    }

    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Channel)
    }

    pub fn to_error(self, message: impl Into<String>) -> ChatError {
        ChatError { code: self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by session operations: a machine-readable code and a
/// human-readable message suitable for a transient notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatError {
    pub code: ErrorCode,
    pub message: String,
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ErrorCode::Validation.to_error(message)
    }

    pub fn channel(message: impl Into<String>) -> Self {
        ErrorCode::Channel.to_error(message)
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        let code = match e.status() {
            Some(status) => ErrorCode::from_http_status(status.as_u16()),
            None if e.is_decode() => ErrorCode::Server,
            None => ErrorCode::Network,
        };
        code.to_error(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ErrorCode::Server.to_error(format!("invalid response body: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
