//! Error types for the `agora` binary.

use agora_core::{AgoraError, NetworkError, StoreError};

use crate::config::ConfigLoadError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Agora(#[from] AgoraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
    #[error("Usage: agora [--config <path>] <list | refresh | hydrate <assistant-id> | watch>")]
    Usage,
}
