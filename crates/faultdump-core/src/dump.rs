//! Immediate dumps requested by the host.

use crate::error::{FaultError, FaultResult};
use crate::file::resolve_file;
use crate::traceback;
use faultdump_host::{FileRef, host};

/// Dump the traceback of the thread holding the interpreter lock, or of
/// every thread with `all_threads`.
///
/// `file` defaults to the host's standard error.
pub fn dump_traceback(file: Option<FileRef>, all_threads: bool) -> FaultResult<()> {
    let (_file, fd) = resolve_file(file)?;
    let host = host()?;
    let tstate = host
        .thread_state_current()
        .ok_or(FaultError::NoCurrentThread)?;

    if all_threads {
        traceback::dump_traceback_threads(fd, host, tstate).map_err(FaultError::Dump)?;
    } else {
        traceback::dump_traceback(fd, host, tstate, true);
    }
    Ok(())
}
