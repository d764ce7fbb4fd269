//! Error types for the host adapter.

use thiserror::Error;

/// Errors that can occur when binding to a host runtime.
#[derive(Error, Debug)]
pub enum HostError {
    /// Failed to load the host library.
    #[error("Failed to load host library: {0}")]
    Load(#[from] libloading::Error),

    /// A required accessor is not exported by the host library.
    #[error("Host symbol not found: {0}")]
    SymbolNotFound(String),

    /// No host runtime has been installed.
    #[error("Host runtime is not installed")]
    NotInstalled,

    /// A host runtime was already installed for this process.
    #[error("Host runtime is already installed")]
    AlreadyInstalled,
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
