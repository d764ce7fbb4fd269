//! Installing and restoring signal dispositions.
//!
//! The disposition captured when a handler is installed is restored
//! verbatim later, from control-surface code or from the handler itself.
//! With the default build the structured `sigaction(2)` record is captured;
//! the `signal-fallback` feature uses the scalar `signal(2)` handler instead.

use std::cell::UnsafeCell;
use std::fmt;
use std::io;
use std::mem::MaybeUninit;
use std::os::raw::c_int;

/// Handler entry point.
pub type Handler = extern "C" fn(c_int);

/// A signal disposition, opaque apart from its handler address.
#[derive(Clone, Copy)]
pub struct Disposition {
    #[cfg(not(feature = "signal-fallback"))]
    action: libc::sigaction,
    #[cfg(feature = "signal-fallback")]
    handler: libc::sighandler_t,
}

impl Disposition {
    /// Address of the handler, or `SIG_DFL` / `SIG_IGN`.
    pub fn handler_address(&self) -> libc::sighandler_t {
        #[cfg(not(feature = "signal-fallback"))]
        {
            self.action.sa_sigaction
        }
        #[cfg(feature = "signal-fallback")]
        {
            self.handler
        }
    }

    pub fn is_default(&self) -> bool {
        self.handler_address() == libc::SIG_DFL
    }

    /// Whether this disposition runs `handler`.
    pub fn runs(&self, handler: Handler) -> bool {
        self.handler_address() == handler as libc::sighandler_t
    }

    /// Whether the handler asked for the alternate signal stack.
    pub fn on_alt_stack(&self) -> bool {
        #[cfg(not(feature = "signal-fallback"))]
        {
            self.action.sa_flags & libc::SA_ONSTACK != 0
        }
        #[cfg(feature = "signal-fallback")]
        {
            false
        }
    }
}

impl fmt::Debug for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposition")
            .field("handler", &format_args!("{:#x}", self.handler_address()))
            .field("on_alt_stack", &self.on_alt_stack())
            .finish()
    }
}

/// Install `handler` for `signum` and return the disposition it replaced.
#[cfg(not(feature = "signal-fallback"))]
pub fn install(signum: c_int, handler: Handler, on_alt_stack: bool) -> io::Result<Disposition> {
    // SAFETY: both records are plain C structs; zeroed is a valid empty set
    // of flags and mask, completed below.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = if on_alt_stack { libc::SA_ONSTACK } else { 0 };

        let mut previous: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signum, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Disposition { action: previous })
    }
}

#[cfg(feature = "signal-fallback")]
pub fn install(signum: c_int, handler: Handler, _on_alt_stack: bool) -> io::Result<Disposition> {
    // SAFETY: signal(2) with a valid handler address.
    let previous = unsafe { libc::signal(signum, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(Disposition { handler: previous })
}

/// Put `previous` back in place for `signum`. Signal safe; errors are ignored.
pub fn restore(signum: c_int, previous: &Disposition) {
    // SAFETY: `previous` was filled in by the OS for this signal.
    unsafe {
        #[cfg(not(feature = "signal-fallback"))]
        let _ = libc::sigaction(signum, &previous.action, std::ptr::null_mut());
        #[cfg(feature = "signal-fallback")]
        let _ = libc::signal(signum, previous.handler);
    }
}

/// Query the disposition currently installed for `signum`.
#[cfg(not(feature = "signal-fallback"))]
pub fn current(signum: c_int) -> io::Result<Disposition> {
    // SAFETY: a null new action only queries.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signum, std::ptr::null(), &mut action) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Disposition { action })
    }
}

#[cfg(feature = "signal-fallback")]
pub fn current(signum: c_int) -> io::Result<Disposition> {
    // signal(2) cannot query; swap in SIG_DFL and put the old handler back.
    let previous = unsafe { libc::signal(signum, libc::SIG_DFL) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    unsafe { libc::signal(signum, previous) };
    Ok(Disposition { handler: previous })
}

/// A disposition shared between control-surface code and a handler.
///
/// The writer publishes the value through a separate atomic flag (release)
/// and readers check that flag (acquire) before calling [`get`](Self::get).
pub(crate) struct DispositionSlot {
    value: UnsafeCell<MaybeUninit<Disposition>>,
}

// Safety: access is ordered by the owner's enabled flag, see above.
unsafe impl Sync for DispositionSlot {}

impl DispositionSlot {
    pub(crate) const fn new() -> Self {
        DispositionSlot {
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// # Safety
    /// No handler may read the slot while it is being written: the owner's
    /// enabled flag must be clear.
    pub(crate) unsafe fn set(&self, disposition: Disposition) {
        unsafe { (*self.value.get()).write(disposition) };
    }

    /// # Safety
    /// The slot must have been written and published.
    pub(crate) unsafe fn get(&self) -> Disposition {
        unsafe { (*self.value.get()).assume_init() }
    }
}
