//! Unified Error Type System
//!
//! Centralized error types for the orchestrator and the storage layer.
//!
//! ## Error Kinds
//!
//! - **Auth**: Bad or missing credential
//! - **RateLimit**: Backend throttled the request
//! - **Network**: Timeout, connection refused, unreachable host
//! - **InvalidResponse**: Empty or unparsable backend output
//! - **NotFound**: Business-level miss (store only)
//! - **Unavailable**: No backend configured at all
//!
//! Per-backend failures are values (`BackendError`) that the provider chain
//! records and moves past. Storage failures are split into connectivity and
//! business errors by `StoreError::is_connectivity`.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Normalized error taxonomy shared by the provider chain and the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Network,
    InvalidResponse,
    NotFound,
    Unavailable,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "AUTH"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Network => write!(f, "NETWORK"),
            Self::InvalidResponse => write!(f, "INVALID_RESPONSE"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// =============================================================================
// Backend Error
// =============================================================================

/// Failure of a single backend invocation, already normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
    /// Backend that produced the error
    pub backend: Option<String>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(backend) = &self.backend {
            write!(f, "[{}:{}] {}", backend, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backend: None,
        }
    }

    pub fn with_backend(
        kind: ErrorKind,
        message: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            backend: Some(backend.into()),
        }
    }

    /// Add backend context to an existing error
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            ErrorKind::Network,
            format!("Backend did not answer within {:?}", duration),
        )
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider-specific failures onto `ErrorKind`
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-form error message from any backend
    pub fn classify(message: &str, backend: &str) -> BackendError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
            || lower.contains("resource_exhausted")
        {
            return BackendError::with_backend(ErrorKind::RateLimit, message, backend);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("invalid key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
            || lower.contains("authentication")
        {
            return BackendError::with_backend(ErrorKind::Auth, message, backend);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return BackendError::with_backend(ErrorKind::Network, message, backend);
        }

        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("malformed")
            || lower.contains("empty response")
            || lower.contains("unexpected token")
        {
            return BackendError::with_backend(ErrorKind::InvalidResponse, message, backend);
        }

        BackendError::with_backend(ErrorKind::Unknown, message, backend)
    }

    /// Classify an HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, backend: &str) -> BackendError {
        match status {
            429 => BackendError::with_backend(ErrorKind::RateLimit, message, backend),
            401 | 403 => BackendError::with_backend(ErrorKind::Auth, message, backend),
            408 | 502 | 503 | 504 => {
                BackendError::with_backend(ErrorKind::Network, message, backend)
            }
            _ => Self::classify(message, backend),
        }
    }

    /// Classify a transport-level failure from the HTTP client
    pub fn classify_transport(err: &reqwest::Error, backend: &str) -> BackendError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            BackendError::with_backend(ErrorKind::Network, err.to_string(), backend)
        } else if err.is_decode() || err.is_body() {
            BackendError::with_backend(ErrorKind::InvalidResponse, err.to_string(), backend)
        } else if let Some(status) = err.status() {
            Self::classify_http_status(status.as_u16(), &err.to_string(), backend)
        } else {
            Self::classify(&err.to_string(), backend)
        }
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Storage failure, split into connectivity and business errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Durable backend could not be reached (triggers fallback routing)
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    /// Referenced record does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Any other backend failure (corrupt row, serialization, internal error)
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Whether the error indicates the backend itself is unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::Network,
            Self::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly => Self::Unreachable(err.to_string()),
                ErrorCode::ConstraintViolation => Self::Conflict(err.to_string()),
                _ => Self::Backend(err.to_string()),
            },
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        Self::Unreachable(format!("Failed to acquire database connection: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("Corrupted JSON column: {}", err))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Orchestration(#[from] crate::ai::OrchestrationFailure),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> StoreResult<T>;

    fn with_context_fn<F, C>(self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: Into<StoreError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> StoreResult<T> {
        self.map_err(|e| prefix(e.into(), context.into()))
    }

    fn with_context_fn<F, C>(self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| prefix(e.into(), f().into()))
    }
}

/// Prefix the message of a store error while keeping its variant
fn prefix(err: StoreError, context: String) -> StoreError {
    match err {
        StoreError::Unreachable(msg) => StoreError::Unreachable(format!("{}: {}", context, msg)),
        StoreError::Conflict(msg) => StoreError::Conflict(format!("{}: {}", context, msg)),
        StoreError::Invalid(msg) => StoreError::Invalid(format!("{}: {}", context, msg)),
        StoreError::Backend(msg) => StoreError::Backend(format!("{}: {}", context, msg)),
        not_found @ StoreError::NotFound { .. } => not_found,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorKind::InvalidResponse.to_string(), "INVALID_RESPONSE");
        assert_eq!(ErrorKind::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(err.backend.as_deref(), Some("openai"));
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.kind, ErrorKind::Auth);
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("Connection timed out after 30s", "groq");
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn test_classify_malformed() {
        let err = ErrorClassifier::classify("Failed to parse JSON body", "gemini");
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_classify_unknown() {
        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "slow down", "test");
        assert_eq!(rate_limit.kind, ErrorKind::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "nope", "test");
        assert_eq!(auth.kind, ErrorKind::Auth);

        let gateway = ErrorClassifier::classify_http_status(503, "overloaded", "test");
        assert_eq!(gateway.kind, ErrorKind::Network);

        let server = ErrorClassifier::classify_http_status(500, "boom", "test");
        assert_eq!(server.kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::with_backend(ErrorKind::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");

        let bare = BackendError::network("Connection failed");
        assert_eq!(bare.to_string(), "[NETWORK] Connection failed");
    }

    #[test]
    fn test_store_error_connectivity() {
        assert!(StoreError::Unreachable("down".into()).is_connectivity());
        assert!(!StoreError::not_found("project", "p1").is_connectivity());
        assert!(!StoreError::Conflict("dup".into()).is_connectivity());
        assert_eq!(StoreError::not_found("user", "u1").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_sqlite_codes_map_to_connectivity() {
        let cant_open = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            None,
        );
        assert!(StoreError::from(cant_open).is_connectivity());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: users.username".into()),
        );
        assert!(matches!(
            StoreError::from(constraint),
            StoreError::Conflict(_)
        ));
    }

    #[test]
    fn test_context_keeps_variant() {
        let result: std::result::Result<(), StoreError> =
            Err(StoreError::Unreachable("refused".into()));
        let err = result.with_context("Failed to load user").unwrap_err();
        assert!(err.is_connectivity());
        assert!(err.to_string().contains("Failed to load user"));
    }
}
