//! Fault injection, for testing the fatal handlers.
//!
//! Each helper makes the calling thread receive a fatal signal and never
//! returns: once the handlers are restored, the signal's default
//! disposition ends the process.

use nix::sys::signal::{Signal, raise};

/// Read from an inaccessible page.
pub fn sigsegv() -> ! {
    // SAFETY: a private anonymous mapping; the read through it is the point.
    unsafe {
        let page = libc::mmap(
            std::ptr::null_mut(),
            page_size(),
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if page != libc::MAP_FAILED {
            std::ptr::read_volatile(page.cast::<u8>());
        }
    }
    raise_forever(Signal::SIGSEGV)
}

pub fn sigfpe() -> ! {
    raise_forever(Signal::SIGFPE)
}

pub fn sigbus() -> ! {
    raise_forever(Signal::SIGBUS)
}

pub fn sigill() -> ! {
    raise_forever(Signal::SIGILL)
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

/// The first delivery may be caught by a handler that returns; the next one
/// reaches the restored disposition.
fn raise_forever(signal: Signal) -> ! {
    loop {
        let _ = raise(signal);
    }
}
