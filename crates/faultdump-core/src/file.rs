//! Output file resolution for the control surface.

use crate::error::{FaultError, FaultResult};
use faultdump_host::{FileRef, host};
use std::os::fd::RawFd;

/// Resolve the output file of an operation and its descriptor.
///
/// `None` selects the host's standard-error object. The descriptor must be
/// positive and fit a C `int`. The file is flushed so that buffered output
/// precedes the dump; a flush failure is not fatal.
pub(crate) fn resolve_file(file: Option<FileRef>) -> FaultResult<(FileRef, RawFd)> {
    let file = match file {
        Some(file) => file,
        None => host()?.stderr().ok_or(FaultError::MissingStderr)?,
    };

    let fd = match file.fileno() {
        Ok(fd) if fd > 0 && fd < i64::from(i32::MAX) => fd as RawFd,
        Ok(_) | Err(_) => return Err(FaultError::InvalidFile),
    };

    if let Err(err) = file.flush() {
        log::warn!("unable to flush file descriptor {fd}: {err}");
    }
    Ok((file, fd))
}
