//! Unified error model for the access layer.
//! Every fallible operation in the crate returns `AppResult`, and each variant carries a
//! stable machine code plus a human message, mirroring what the backend sends back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No credential is present; nothing was sent to the backend.
    #[error("{code}: {message}")]
    Unauthenticated { code: String, message: String },
    /// The permission endpoint failed, answered non-2xx or sent an unreadable body.
    #[error("{code}: {message}")]
    PermissionFetchFailed { code: String, message: String },
    /// Persisted credential could not be read back.
    #[error("{code}: {message}")]
    StaleCredential { code: String, message: String },
    /// A downstream call answered 401 or 422. The session is already torn down.
    #[error("{code}: {message}")]
    AuthorizationExpired { code: String, message: String },
    #[error("{code}: {message} (HTTP {status})")]
    Http { code: String, message: String, status: u16 },
    #[error("{code}: {message}")]
    Transport { code: String, message: String },
    #[error("{code}: {message}")]
    Decode { code: String, message: String },
    #[error("{code}: {message}")]
    Config { code: String, message: String },
    #[error("{code}: {message}")]
    Storage { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::PermissionFetchFailed { code, .. }
            | AppError::StaleCredential { code, .. }
            | AppError::AuthorizationExpired { code, .. }
            | AppError::Http { code, .. }
            | AppError::Transport { code, .. }
            | AppError::Decode { code, .. }
            | AppError::Config { code, .. }
            | AppError::Storage { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::PermissionFetchFailed { message, .. }
            | AppError::StaleCredential { message, .. }
            | AppError::AuthorizationExpired { message, .. }
            | AppError::Http { message, .. }
            | AppError::Transport { message, .. }
            | AppError::Decode { message, .. }
            | AppError::Config { message, .. }
            | AppError::Storage { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self { AppError::Unauthenticated { code: "unauthenticated".into(), message: msg.into() } }
    pub fn fetch_failed<S: Into<String>>(code: S, msg: S) -> Self { AppError::PermissionFetchFailed { code: code.into(), message: msg.into() } }
    pub fn stale<S: Into<String>>(msg: S) -> Self { AppError::StaleCredential { code: "stale_credential".into(), message: msg.into() } }
    pub fn expired(status: u16) -> Self { AppError::AuthorizationExpired { code: "authorization_expired".into(), message: format!("backend rejected credential with HTTP {status}") } }
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self { AppError::Http { code: "http_error".into(), message: msg.into(), status } }
    pub fn transport<S: Into<String>>(msg: S) -> Self { AppError::Transport { code: "transport_error".into(), message: msg.into() } }
    pub fn decode<S: Into<String>>(msg: S) -> Self { AppError::Decode { code: "decode_error".into(), message: msg.into() } }
    pub fn config<S: Into<String>>(code: S, msg: S) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn storage<S: Into<String>>(msg: S) -> Self { AppError::Storage { code: "storage_error".into(), message: msg.into() } }

    /// HTTP status that best describes the failure, for hosts that surface errors as responses.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } | AppError::StaleCredential { .. } => 401,
            AppError::AuthorizationExpired { .. } => 401,
            AppError::PermissionFetchFailed { .. } => 502,
            AppError::Http { status, .. } => *status,
            AppError::Transport { .. } => 503,
            AppError::Decode { .. } => 502,
            AppError::Config { .. } | AppError::Storage { .. } => 500,
        }
    }

    /// Failures that end the session rather than being recovered locally.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AppError::AuthorizationExpired { .. })
    }

    /// Re-tag a request-layer failure as a permission fetch failure, keeping its code.
    pub fn into_fetch_failure(self) -> Self {
        match self {
            AppError::PermissionFetchFailed { .. } => self,
            other => AppError::PermissionFetchFailed { code: other.code_str().to_string(), message: other.message().to_string() },
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::decode(err.to_string())
        } else if let Some(status) = err.status() {
            AppError::http(status.as_u16(), err.to_string())
        } else {
            AppError::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self { AppError::decode(err.to_string()) }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self { AppError::storage(err.to_string()) }
}
