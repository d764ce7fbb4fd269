//! Host-runtime adapter for faultdump.
//!
//! This crate describes the narrow surface faultdump needs from the managed
//! runtime it diagnoses: opaque handles for thread states, interpreters,
//! frames and code objects, the accessors used to walk them, and the
//! file-like objects that supply output descriptors. A host is either
//! implemented in Rust against [`HostRuntime`] or loaded at runtime from a
//! shared library with [`HostLibrary`].

mod error;
mod file;
mod library;
mod runtime;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod text;
mod types;

pub use error::*;
pub use file::*;
pub use library::*;
pub use runtime::*;
pub use text::*;
pub use types::*;
