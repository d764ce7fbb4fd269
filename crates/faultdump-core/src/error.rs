//! Error types for the control surface.

use faultdump_host::HostError;
use std::io;
use thiserror::Error;

/// Errors reported by the control-surface operations.
///
/// Handlers never construct these: a handler that cannot do its job returns
/// silently.
#[derive(Error, Debug)]
pub enum FaultError {
    /// Host runtime error.
    #[error("host runtime error: {0}")]
    Host(#[from] HostError),

    /// `fileno()` failed or returned an out-of-range descriptor.
    #[error("file.fileno() is not a valid file descriptor")]
    InvalidFile,

    /// The host has no standard-error file object.
    #[error("unable to get sys.stderr")]
    MissingStderr,

    /// No thread state for the calling thread.
    #[error("unable to get the current thread state")]
    NoCurrentThread,

    #[error("delay must be greater than 0")]
    InvalidDelay,

    #[error("invalid signal value")]
    InvalidSignal,

    /// Fatal signals are owned by `enable()`.
    #[error("signal {0} cannot be registered by register(): use enable() instead")]
    FatalSignal(i32),

    /// The OS refused the new disposition.
    #[error("unable to install the handler of signal {signum}: {source}")]
    Install {
        signum: i32,
        #[source]
        source: io::Error,
    },

    #[error("unable to set SIGALRM handler")]
    AlarmHandler(#[source] io::Error),

    /// The all-threads walker failed.
    #[error("{0}")]
    Dump(&'static str),

    /// Registry growth failed.
    #[error("out of memory")]
    OutOfMemory,
}

/// Result type for control-surface operations.
pub type FaultResult<T> = Result<T, FaultError>;
