//! User signals: dump the tracebacks on demand, e.g. on SIGUSR1.
//!
//! The registry lives behind a mutex for the control surface. The handler
//! never touches it; it reads a per-signal mirror made of atomics.

use crate::disposition::{self, Disposition};
use crate::error::{FaultError, FaultResult};
use crate::fatal::is_fatal;
use crate::file::resolve_file;
use crate::traceback::{dump_traceback, dump_traceback_threads};
use crate::{altstack, lock};
use faultdump_host::{FileRef, host_signal_safe};
use std::os::raw::c_int;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Highest signal number accepted by [`register`].
#[cfg(any(target_os = "linux", target_os = "android"))]
pub const MAX_SIGNUM: c_int = 64;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub const MAX_SIGNUM: c_int = 31;

struct UserSignal {
    signum: c_int,
    file: FileRef,
    previous: Disposition,
}

/// What the handler needs to know about one signal number.
struct UserSlot {
    active: AtomicBool,
    fd: AtomicI32,
    all_threads: AtomicBool,
}

impl UserSlot {
    const fn new() -> Self {
        UserSlot {
            active: AtomicBool::new(false),
            fd: AtomicI32::new(-1),
            all_threads: AtomicBool::new(false),
        }
    }
}

static REGISTRY: Mutex<Vec<UserSignal>> = Mutex::new(Vec::new());
static SLOTS: [UserSlot; MAX_SIGNUM as usize + 1] = [const { UserSlot::new() }; MAX_SIGNUM as usize + 1];

fn slot(signum: c_int) -> Option<&'static UserSlot> {
    usize::try_from(signum).ok().and_then(|index| SLOTS.get(index))
}

extern "C" fn user_handler(signum: c_int) {
    let Some(slot) = slot(signum) else {
        return;
    };
    if !slot.active.load(Ordering::Acquire) {
        return;
    }
    let fd = slot.fd.load(Ordering::Relaxed);
    let all_threads = slot.all_threads.load(Ordering::Relaxed);

    let Some(host) = host_signal_safe() else {
        return;
    };
    let Some(tstate) = host.thread_state_this() else {
        return;
    };
    if all_threads {
        let _ = dump_traceback_threads(fd, host, tstate);
    } else {
        dump_traceback(fd, host, tstate, true);
    }
}

/// Dump the tracebacks each time `signum` is delivered.
///
/// Registering a signal again replaces its output file and thread scope;
/// the disposition captured by the first registration is kept. Fatal
/// signals are refused: they belong to [`enable`](crate::enable).
pub fn register(signum: i32, file: Option<FileRef>, all_threads: bool) -> FaultResult<()> {
    if is_fatal(signum) {
        return Err(FaultError::FatalSignal(signum));
    }
    let slot = match slot(signum) {
        Some(slot) if signum >= 1 => slot,
        _ => return Err(FaultError::InvalidSignal),
    };
    let (file, fd) = resolve_file(file)?;

    let mut registry = lock(&REGISTRY);
    if let Some(entry) = registry.iter_mut().find(|entry| entry.signum == signum) {
        slot.fd.store(fd, Ordering::Relaxed);
        slot.all_threads.store(all_threads, Ordering::Relaxed);
        entry.file = file;
        log::debug!("signal {signum} registration updated");
        return Ok(());
    }

    registry
        .try_reserve(1)
        .map_err(|_| FaultError::OutOfMemory)?;

    slot.fd.store(fd, Ordering::Relaxed);
    slot.all_threads.store(all_threads, Ordering::Relaxed);
    let on_alt_stack = altstack::ensure();
    let previous = disposition::install(signum, user_handler, on_alt_stack)
        .map_err(|source| FaultError::Install { signum, source })?;

    registry.push(UserSignal {
        signum,
        file,
        previous,
    });
    slot.active.store(true, Ordering::Release);
    log::debug!("signal {signum} registered");
    Ok(())
}

/// Restore the disposition `signum` had before [`register`].
///
/// Returns whether the signal was registered.
pub fn unregister(signum: i32) -> bool {
    let mut registry = lock(&REGISTRY);
    let Some(index) = registry.iter().position(|entry| entry.signum == signum) else {
        return false;
    };
    let entry = registry.remove(index);
    disposition::restore(signum, &entry.previous);
    if let Some(slot) = slot(signum) {
        slot.active.store(false, Ordering::Release);
    }
    log::debug!("signal {signum} unregistered");
    true
}

/// Signal numbers currently registered, in registration order.
pub fn registered_signals() -> Vec<i32> {
    lock(&REGISTRY).iter().map(|entry| entry.signum).collect()
}

/// Restore every registered disposition without releasing the files.
pub(crate) fn unload() {
    let mut registry = lock(&REGISTRY);
    for entry in registry.drain(..) {
        disposition::restore(entry.signum, &entry.previous);
        if let Some(slot) = slot(entry.signum) {
            slot.active.store(false, Ordering::Release);
        }
        std::mem::forget(entry.file);
    }
}
