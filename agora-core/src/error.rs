//! Error types for AGORA operations

use crate::AssistantId;
use thiserror::Error;

/// Persistent key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store quota exceeded writing {key} ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },

    #[error("Payload for {key} is {bytes} bytes, limit is {limit}")]
    PayloadTooLarge {
        key: String,
        bytes: usize,
        limit: usize,
    },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns true if the underlying store refused the write for lack of space.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Transport-level errors talking to the directory backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Request to {endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl NetworkError {
    /// Endpoint path the failing request targeted.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::InvalidResponse { endpoint, .. } => endpoint,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all AGORA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgoraError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Version fetch failed: {reason}")]
    VersionFetch { reason: String },

    #[error("Failed to decode {field}: {reason}")]
    Decode { field: String, reason: String },

    #[error("Assistant not found in directory: {assistant_id}")]
    NotFound { assistant_id: AssistantId },

    #[error("No authenticated session")]
    Unauthenticated,

    #[error("Session ended before the operation completed")]
    SessionEnded,
}

/// Result type for AGORA operations.
pub type AgoraResult<T> = Result<T, AgoraError>;
