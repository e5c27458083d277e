//! Error taxonomy for the statistics engine and key store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("{len} values do not fit in {capacity} slots")]
    Size { len: usize, capacity: usize },

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("key cache entry {key_id} is corrupt: {source}")]
    CacheCorrupt {
        key_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote key store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("incompatible operands: {0}")]
    IncompatibleOperands(String),

    #[error("missing evaluation key: {0}")]
    MissingKey(String),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; surface immediately, do not retry
    Caller,
    /// Transient; the caller may retry with backoff
    Retryable,
    /// Internal failure; nothing was written
    Internal,
}

impl StatsError {
    pub fn status_class(&self) -> ErrorClass {
        match self {
            StatsError::Size { .. }
            | StatsError::InvalidCiphertext(_)
            | StatsError::InvalidKeyMaterial(_)
            | StatsError::IncompatibleOperands(_) => ErrorClass::Caller,
            StatsError::RemoteUnavailable(_) => ErrorClass::Retryable,
            StatsError::CacheCorrupt { .. }
            | StatsError::MissingKey(_)
            | StatsError::Computation(_)
            | StatsError::Config(_) => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.status_class() == ErrorClass::Retryable
    }

    pub(crate) fn computation(msg: impl Into<String>) -> Self {
        StatsError::Computation(msg.into())
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        StatsError::Computation(format!("{} lock poisoned", what))
    }
}
