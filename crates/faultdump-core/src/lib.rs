//! Traceback dumps for a managed runtime, written from signal handlers.
//!
//! Once a host runtime is installed (see [`faultdump_host::install_host`]),
//! this crate can dump the call stacks of its threads:
//!
//! - on a fatal signal (SIGSEGV, SIGFPE, SIGBUS, SIGILL) with [`enable`],
//! - after a timeout with [`dump_traceback_later`],
//! - on a user signal with [`register`],
//! - or right away with [`dump_traceback`].
//!
//! Everything that runs inside a handler is async-signal-safe: output goes
//! straight to a file descriptor with `write(2)`, without allocating or
//! taking a lock.

mod altstack;
pub mod disposition;
mod dump;
mod error;
mod fatal;
pub mod fault;
mod file;
pub mod io;
#[cfg(feature = "later")]
mod later;
pub mod traceback;
mod user;

pub use dump::dump_traceback;
pub use error::*;
pub use fatal::{FATAL_BANNER, disable, enable, fatal_signals, is_enabled};
#[cfg(feature = "later")]
pub use later::{cancel_dump_traceback_later, dump_traceback_later};
pub use user::{MAX_SIGNUM, register, registered_signals, unregister};

use std::sync::{Mutex, MutexGuard};

/// Lock a control-surface mutex, ignoring poisoning.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Release every handler before the process exits.
///
/// Cancels the watchdog, restores every user and fatal disposition and frees
/// the alternate stack. Output files are not released: the host may already
/// be tearing down the objects behind them.
pub fn unload() {
    #[cfg(feature = "later")]
    later::unload();
    user::unload();
    fatal::unload();
    altstack::release();
}

#[cfg(test)]
pub(crate) mod testing {
    use faultdump_host::install_host;
    use faultdump_host::sim::SimHost;
    use once_cell::sync::OnceCell;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    static HOST: OnceCell<&'static SimHost> = OnceCell::new();

    /// The host installed for this test binary: a main thread with a short
    /// stack and an idle worker.
    pub(crate) fn sim_host() -> &'static SimHost {
        HOST.get_or_init(|| {
            let host = SimHost::builder()
                .thread(1, |t| t.call("main.py", "<module>", 3).call("main.py", "serve", 17))
                .thread(2, |t| t.call("worker.py", "run", 8))
                .stderr(std::sync::Arc::new(std::io::stderr()))
                .build()
                .leak();
            install_host(host).unwrap();
            host
        })
    }

    /// Everything written to `file` so far.
    pub(crate) fn read_back(mut file: File) -> String {
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }
}
