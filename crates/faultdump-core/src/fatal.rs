//! Fatal-signal handling: SIGSEGV, SIGFPE, SIGBUS and SIGILL.
//!
//! On a fatal signal the handler restores the previous disposition, writes
//! the banner and the traceback, and returns. The faulting instruction then
//! runs again and the signal is delivered to the restored disposition,
//! which usually terminates the process with a core dump.

use crate::disposition::{self, DispositionSlot};
use crate::error::FaultResult;
use crate::file::resolve_file;
use crate::io::emit_str;
use crate::traceback::{dump_traceback, dump_traceback_threads};
use crate::{altstack, lock};
use faultdump_host::{FileRef, host_signal_safe};
use std::os::raw::c_int;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Banner written before the signal name.
///
/// Set `FAULTDUMP_FATAL_BANNER` at build time to change it.
pub const FATAL_BANNER: &str = match option_env!("FAULTDUMP_FATAL_BANNER") {
    Some(banner) => banner,
    None => "Fatal Python error: ",
};

struct FatalSignal {
    signum: c_int,
    name: &'static str,
    enabled: AtomicBool,
    // Set once `previous` holds a disposition; cleared while it is rewritten.
    published: AtomicBool,
    previous: DispositionSlot,
}

impl FatalSignal {
    const fn new(signum: c_int, name: &'static str) -> Self {
        FatalSignal {
            signum,
            name,
            enabled: AtomicBool::new(false),
            published: AtomicBool::new(false),
            previous: DispositionSlot::new(),
        }
    }

    /// Put the previous disposition back if ours is installed.
    fn restore(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            // SAFETY: `enabled` was set after `previous` was written.
            let previous = unsafe { self.previous.get() };
            disposition::restore(self.signum, &previous);
        }
    }

    /// Handler side of [`FatalSignal::restore`].
    ///
    /// A second delivery, from another thread faulting at the same time,
    /// finds `enabled` already clear and restores the same disposition
    /// again. Only a fire that beats the install falls back to `SIG_DFL`.
    fn restore_from_handler(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) || self.published.load(Ordering::Acquire) {
            // SAFETY: `published` is set after `previous` was written.
            let previous = unsafe { self.previous.get() };
            disposition::restore(self.signum, &previous);
        } else {
            // SAFETY: signal(2) is async-signal-safe.
            unsafe { libc::signal(self.signum, libc::SIG_DFL) };
        }
    }
}

// SIGSEGV is last: it is the most likely to fire while the handler runs.
static FATAL_SIGNALS: [FatalSignal; 4] = [
    FatalSignal::new(libc::SIGBUS, "Bus error"),
    FatalSignal::new(libc::SIGILL, "Illegal instruction"),
    FatalSignal::new(libc::SIGFPE, "Floating point exception"),
    FatalSignal::new(libc::SIGSEGV, "Segmentation fault"),
];

static ENABLED: AtomicBool = AtomicBool::new(false);
static FD: AtomicI32 = AtomicI32::new(-1);
static ALL_THREADS: AtomicBool = AtomicBool::new(false);
static FILE: Mutex<Option<FileRef>> = Mutex::new(None);

/// The fatal signals handled by [`enable`], with their names, in
/// installation order.
pub fn fatal_signals() -> impl Iterator<Item = (i32, &'static str)> {
    FATAL_SIGNALS.iter().map(|sig| (sig.signum, sig.name))
}

pub(crate) fn is_fatal(signum: c_int) -> bool {
    FATAL_SIGNALS.iter().any(|sig| sig.signum == signum)
}

extern "C" fn fatal_handler(signum: c_int) {
    let fd = FD.load(Ordering::Relaxed);
    let all_threads = ALL_THREADS.load(Ordering::Relaxed);

    let Some(sig) = FATAL_SIGNALS.iter().find(|sig| sig.signum == signum) else {
        return;
    };
    sig.restore_from_handler();

    emit_str(fd, FATAL_BANNER);
    emit_str(fd, sig.name);
    emit_str(fd, "\n\n");

    // Synchronous signals are delivered to the faulting thread, which may
    // not hold the interpreter lock: use the thread-local state.
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

/// Dump the traceback on SIGSEGV, SIGFPE, SIGBUS and SIGILL.
///
/// `file` defaults to the host's standard error. Calling `enable` again
/// while enabled only replaces the output file and the thread scope. A
/// signal whose handler cannot be installed is skipped with a warning.
pub fn enable(file: Option<FileRef>, all_threads: bool) -> FaultResult<()> {
    let (file, fd) = resolve_file(file)?;

    FD.store(fd, Ordering::Relaxed);
    ALL_THREADS.store(all_threads, Ordering::Relaxed);
    // The old file is dropped only once handlers see the new descriptor.
    let old_file = lock(&FILE).replace(file);
    drop(old_file);

    if ENABLED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let on_alt_stack = altstack::ensure();
    for sig in &FATAL_SIGNALS {
        match disposition::install(sig.signum, fatal_handler, on_alt_stack) {
            Ok(previous) => {
                sig.published.store(false, Ordering::Release);
                // SAFETY: `enabled` and `published` are clear, no handler
                // reads the slot.
                unsafe { sig.previous.set(previous) };
                sig.published.store(true, Ordering::Release);
                sig.enabled.store(true, Ordering::Release);
                log::debug!("fatal handler installed for {}", sig.name);
            }
            Err(err) => {
                log::warn!("unable to install the handler of {}: {err}", sig.name);
            }
        }
    }
    Ok(())
}

fn disable_signals() -> bool {
    if !ENABLED.swap(false, Ordering::AcqRel) {
        return false;
    }
    for sig in &FATAL_SIGNALS {
        sig.restore();
    }
    log::debug!("fatal handlers disabled");
    true
}

/// Restore the previous fatal-signal dispositions.
///
/// Returns whether the handlers were enabled. The output file is released.
pub fn disable() -> bool {
    let was_enabled = disable_signals();
    lock(&FILE).take();
    was_enabled
}

/// Whether the fatal handlers are enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

/// Disable without releasing the output file.
pub(crate) fn unload() {
    disable_signals();
    if let Some(file) = lock(&FILE).take() {
        std::mem::forget(file);
    }
}
