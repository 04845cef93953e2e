use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    AlreadyExists,
    Transient,
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Transient => "transient",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("series {key} does not exist"))
    }

    pub fn already_exists(key: &str) -> Self {
        Self::new(
            StoreErrorKind::AlreadyExists,
            format!("series {key} already exists"),
        )
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == StoreErrorKind::AlreadyExists
    }
}

#[derive(Debug, Error)]
pub enum SensorlineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid range: from {from_ms} is after to {to_ms}")]
    InvalidRange { from_ms: i64, to_ms: i64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("sample source error: {0}")]
    Source(String),

    #[error("io error: {0}")]
    Io(String),
}

impl SensorlineError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidRange { .. } | Self::Parse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SensorlineError>;
