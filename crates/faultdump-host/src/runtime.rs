//! The host-runtime accessor surface and the process-wide host slot.

use crate::error::{HostError, HostResult};
use crate::file::FileRef;
use crate::text::HostText;
use crate::types::{Code, Frame, Interpreter, ThreadState};
use once_cell::sync::OnceCell;

/// Accessors faultdump needs from the managed runtime.
///
/// # Signal safety
///
/// Every method above `thread_state_current` may be called from a signal
/// handler running on any thread, at any point, including while the host's
/// interpreter lock is held by another thread or by the interrupted code.
/// Implementations of those methods must not allocate, take locks, or enter
/// the interpreter. They read plain fields and return.
///
/// `thread_state_current` and `stderr` are tied to the interpreter lock and
/// are only called from control-surface operations.
pub trait HostRuntime: Send + Sync {
    /// Thread state of the calling OS thread, looked up in thread-local
    /// storage. Valid whether or not the thread holds the interpreter lock.
    fn thread_state_this(&self) -> Option<ThreadState>;

    fn thread_interpreter(&self, tstate: ThreadState) -> Option<Interpreter>;

    fn interpreter_thread_head(&self, interp: Interpreter) -> Option<ThreadState>;

    fn thread_next(&self, tstate: ThreadState) -> Option<ThreadState>;

    /// OS-level identifier of the thread owning `tstate`.
    fn thread_id(&self, tstate: ThreadState) -> u64;

    fn thread_top_frame(&self, tstate: ThreadState) -> Option<Frame>;

    /// Sanity check on a frame reached through the chain. A walk stops at the
    /// first frame failing it.
    fn frame_is_valid(&self, _frame: Frame) -> bool {
        true
    }

    /// The calling frame.
    fn frame_back(&self, frame: Frame) -> Option<Frame>;

    fn frame_code(&self, frame: Frame) -> Option<Code>;

    /// Offset of the instruction being executed, in code units.
    fn frame_last_instruction(&self, frame: Frame) -> i32;

    /// Convenience line accessor. Hosts that track the current line on the
    /// frame return it here; `None` makes the caller consult the code's
    /// line table.
    fn frame_line_number(&self, _frame: Frame) -> Option<i32> {
        None
    }

    /// Source file name, or `None` when missing or not a string.
    fn code_filename(&self, code: Code) -> Option<HostText<'_>>;

    /// Function name, or `None` when missing or not a string.
    fn code_name(&self, code: Code) -> Option<HostText<'_>>;

    /// Map an instruction offset to a source line.
    fn code_addr_to_line(&self, code: Code, last_instruction: i32) -> i32;

    /// Thread state of the thread holding the interpreter lock.
    fn thread_state_current(&self) -> Option<ThreadState>;

    /// The host's standard-error file object.
    fn stderr(&self) -> Option<FileRef>;
}

/// Global host runtime instance.
static HOST: OnceCell<&'static dyn HostRuntime> = OnceCell::new();

/// Install the host runtime for this process.
///
/// The host can only be installed once; signal handlers may observe it at any
/// time afterwards.
pub fn install_host(host: &'static dyn HostRuntime) -> HostResult<()> {
    HOST.set(host).map_err(|_| HostError::AlreadyInstalled)?;
    log::debug!("host runtime installed");
    Ok(())
}

/// Get the installed host runtime.
pub fn host() -> HostResult<&'static dyn HostRuntime> {
    HOST.get().copied().ok_or(HostError::NotInstalled)
}

/// Get the installed host runtime from a signal handler.
///
/// This is a single acquire load.
#[inline]
pub fn host_signal_safe() -> Option<&'static dyn HostRuntime> {
    HOST.get().copied()
}
