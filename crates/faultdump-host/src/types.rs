//! Opaque handles into host-runtime structures.
//!
//! Handles are identities, never dereferenced by faultdump itself: every read
//! goes through a [`HostRuntime`](crate::HostRuntime) accessor. Two handles
//! are equal when they designate the same host object.

use std::ffi::c_void;
use std::ptr::NonNull;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonNull<c_void>);

        impl $name {
            /// Wrap a raw host pointer. Returns `None` for null.
            pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map($name)
            }

            /// The raw host pointer.
            pub fn as_ptr(self) -> *mut c_void {
                self.0.as_ptr()
            }
        }

        // Safety: a handle is an address used for identity and passed back to
        // the host; it is never dereferenced on the Rust side.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

opaque_handle!(
    /// A host per-thread state: top frame pointer and thread identifier.
    ThreadState
);

opaque_handle!(
    /// A host interpreter: owner of the thread-state list.
    Interpreter
);

opaque_handle!(
    /// One call-stack activation, linked to its caller.
    Frame
);

opaque_handle!(
    /// Static per-function record: file name, function name, line table.
    Code
);
