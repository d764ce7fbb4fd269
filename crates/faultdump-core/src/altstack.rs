//! Alternate signal stack.
//!
//! Fatal handlers run on a dedicated stack so that a dump is still possible
//! after a stack overflow. The stack is allocated on first use and installed
//! for the calling thread; [`release`] uninstalls it if it is still ours.

use crate::lock;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

struct AltStack {
    memory: Box<[u8]>,
}

static STACK: Mutex<Option<AltStack>> = Mutex::new(None);

/// Set once the stack has been installed; read when choosing `SA_ONSTACK`.
static AVAILABLE: AtomicBool = AtomicBool::new(false);

fn stack_size() -> usize {
    libc::SIGSTKSZ
}

/// Allocate and install the alternate stack unless already done.
///
/// Returns whether handlers can ask to run on it. An allocation or
/// `sigaltstack` failure is not an error: handlers run on the faulting stack.
pub(crate) fn ensure() -> bool {
    let mut stack = lock(&STACK);
    if stack.is_some() {
        return AVAILABLE.load(Ordering::Acquire);
    }

    let mut memory = Vec::new();
    if memory.try_reserve_exact(stack_size()).is_err() {
        log::warn!("unable to allocate the alternate signal stack");
        return false;
    }
    memory.resize(stack_size(), 0u8);
    let mut memory = memory.into_boxed_slice();

    // SAFETY: `stack_t` is a plain C struct and the memory outlives the
    // installation: it stays in `STACK` until `release`.
    let installed = unsafe {
        let mut ss: libc::stack_t = std::mem::zeroed();
        ss.ss_sp = memory.as_mut_ptr().cast();
        ss.ss_size = memory.len();
        ss.ss_flags = 0;
        libc::sigaltstack(&ss, std::ptr::null_mut()) == 0
    };
    if !installed {
        log::warn!(
            "unable to install the alternate signal stack: {}",
            std::io::Error::last_os_error()
        );
        return false;
    }

    log::debug!("alternate signal stack installed ({} bytes)", memory.len());
    *stack = Some(AltStack { memory });
    AVAILABLE.store(true, Ordering::Release);
    true
}

/// Uninstall the alternate stack if the calling thread still uses ours, then
/// free it.
pub(crate) fn release() {
    let Some(stack) = lock(&STACK).take() else {
        return;
    };
    AVAILABLE.store(false, Ordering::Release);

    // SAFETY: querying with a null new stack; disabling only our own stack.
    unsafe {
        let mut current: libc::stack_t = std::mem::zeroed();
        if libc::sigaltstack(std::ptr::null(), &mut current) == 0
            && current.ss_sp == stack.memory.as_ptr() as *mut libc::c_void
        {
            let mut disable: libc::stack_t = std::mem::zeroed();
            disable.ss_flags = libc::SS_DISABLE;
            let _ = libc::sigaltstack(&disable, std::ptr::null_mut());
        }
    }
    log::debug!("alternate signal stack released");
}
