//! Watchdog: dump the tracebacks after a timeout, over SIGALRM.

use crate::disposition;
use crate::error::{FaultError, FaultResult};
use crate::file::resolve_file;
use crate::lock;
use crate::traceback::{dump_traceback, dump_traceback_threads};
use faultdump_host::{FileRef, host_signal_safe};
use nix::unistd::alarm;
use std::os::raw::c_int;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

static FD: AtomicI32 = AtomicI32::new(-1);
static DELAY: AtomicU32 = AtomicU32::new(0);
static REPEAT: AtomicBool = AtomicBool::new(false);
static ALL_THREADS: AtomicBool = AtomicBool::new(false);
static FILE: Mutex<Option<FileRef>> = Mutex::new(None);

extern "C" fn alarm_handler(_signum: c_int) {
    handle_alarm();
}

pub(crate) fn handle_alarm() {
    let fd = FD.load(Ordering::Relaxed);
    let delay = DELAY.load(Ordering::Relaxed);
    let repeat = REPEAT.load(Ordering::Relaxed);
    let all_threads = ALL_THREADS.load(Ordering::Relaxed);

    let Some(host) = host_signal_safe() else {
        return;
    };
    let Some(tstate) = host.thread_state_this() else {
        return;
    };

    let ok = if all_threads {
        dump_traceback_threads(fd, host, tstate).is_ok()
    } else {
        dump_traceback(fd, host, tstate, true);
        true
    };

    // The file is never released here: dropping it is not signal safe.
    // SAFETY: alarm(2) is async-signal-safe.
    unsafe {
        if ok && repeat {
            libc::alarm(delay);
        } else {
            libc::alarm(0);
        }
    }
}

/// Dump the tracebacks after `delay` seconds, or every `delay` seconds with
/// `repeat`.
///
/// Replaces any pending schedule. `file` defaults to the host's standard
/// error. Delays beyond the range of `alarm(2)` are clamped.
pub fn dump_traceback_later(
    delay: i64,
    repeat: bool,
    file: Option<FileRef>,
    all_threads: bool,
) -> FaultResult<()> {
    if delay <= 0 {
        return Err(FaultError::InvalidDelay);
    }
    let delay = u32::try_from(delay).unwrap_or(u32::MAX);
    let (file, fd) = resolve_file(file)?;

    disposition::install(libc::SIGALRM, alarm_handler, false).map_err(FaultError::AlarmHandler)?;

    FD.store(fd, Ordering::Relaxed);
    DELAY.store(delay, Ordering::Relaxed);
    REPEAT.store(repeat, Ordering::Relaxed);
    ALL_THREADS.store(all_threads, Ordering::Relaxed);
    // The old file is dropped only once the handler sees the new descriptor.
    let old_file = lock(&FILE).replace(file);
    drop(old_file);

    alarm::set(delay);
    log::debug!("traceback dump scheduled in {delay}s (repeat: {repeat})");
    Ok(())
}

/// Cancel the pending dump and release its output file.
pub fn cancel_dump_traceback_later() {
    alarm::cancel();
    lock(&FILE).take();
}

/// Disarm without releasing the output file.
pub(crate) fn unload() {
    alarm::cancel();
    if let Some(file) = lock(&FILE).take() {
        std::mem::forget(file);
    }
}
