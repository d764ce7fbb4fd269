//! Host accessors resolved from a shared library at runtime.
//!
//! A host that embeds faultdump from native code exports a small C ABI. All
//! handles cross it as `void *` with `NULL` meaning absent:
//!
//! ```c
//! typedef struct { int kind; const void *data; size_t len; } faultdump_text;
//!
//! void *faultdump_thread_state_this(void);
//! void *faultdump_thread_state_current(void);
//! void *faultdump_thread_interpreter(void *tstate);
//! void *faultdump_interpreter_thread_head(void *interp);
//! void *faultdump_thread_next(void *tstate);
//! unsigned long faultdump_thread_id(void *tstate);
//! void *faultdump_thread_top_frame(void *tstate);
//! void *faultdump_frame_back(void *frame);
//! void *faultdump_frame_code(void *frame);
//! int faultdump_frame_lasti(void *frame);
//! int faultdump_code_filename(void *code, faultdump_text *out);
//! int faultdump_code_name(void *code, faultdump_text *out);
//! int faultdump_code_addr2line(void *code, int lasti);
//!
//! /* optional */
//! int faultdump_frame_check(void *frame);
//! int faultdump_frame_lineno(void *frame);
//! int faultdump_stderr_fileno(void);
//! ```
//!
//! `kind` is the code-unit width in bytes (1, 2 or 4); `len` counts units.

use crate::error::{HostError, HostResult};
use crate::file::{FileRef, RawFileno};
use crate::runtime::HostRuntime;
use crate::text::HostText;
use crate::types::{Code, Frame, Interpreter, ThreadState};
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::os::raw::{c_int, c_ulong};
use std::path::Path;
use std::sync::Arc;

/// Text record filled in by the host's string accessors.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawText {
    pub kind: c_int,
    pub data: *const c_void,
    pub len: usize,
}

impl RawText {
    const fn empty() -> Self {
        RawText {
            kind: 0,
            data: std::ptr::null(),
            len: 0,
        }
    }
}

type HandleFn = unsafe extern "C" fn() -> *mut c_void;
type HandleMapFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type TextFn = unsafe extern "C" fn(*mut c_void, *mut RawText) -> c_int;

/// Container for the loaded host library and its accessor pointers.
pub struct HostLibrary {
    _library: Library,

    pub thread_state_this: HandleFn,
    pub thread_state_current: HandleFn,
    pub thread_interpreter: HandleMapFn,
    pub interpreter_thread_head: HandleMapFn,
    pub thread_next: HandleMapFn,
    pub thread_id: unsafe extern "C" fn(*mut c_void) -> c_ulong,
    pub thread_top_frame: HandleMapFn,

    pub frame_back: HandleMapFn,
    pub frame_code: HandleMapFn,
    pub frame_lasti: unsafe extern "C" fn(*mut c_void) -> c_int,
    pub frame_check: Option<unsafe extern "C" fn(*mut c_void) -> c_int>,
    pub frame_lineno: Option<unsafe extern "C" fn(*mut c_void) -> c_int>,

    pub code_filename: TextFn,
    pub code_name: TextFn,
    pub code_addr2line: unsafe extern "C" fn(*mut c_void, c_int) -> c_int,

    pub stderr_fileno: Option<unsafe extern "C" fn() -> c_int>,
}

impl HostLibrary {
    /// Load the host library from the given path and resolve its accessors.
    pub fn load(library_path: &Path) -> HostResult<Self> {
        unsafe {
            let library = Library::new(library_path)?;

            macro_rules! load_symbol {
                ($name:ident, $sym:expr) => {
                    let $name: Symbol<_> = library.get($sym).map_err(|_| {
                        HostError::SymbolNotFound(
                            String::from_utf8_lossy(&$sym[..$sym.len() - 1]).to_string(),
                        )
                    })?;
                    let $name = *$name;
                };
            }

            macro_rules! load_optional {
                ($name:ident, $sym:expr) => {
                    let $name = match library.get($sym) {
                        Ok(symbol) => {
                            let symbol: Symbol<_> = symbol;
                            Some(*symbol)
                        }
                        Err(_) => {
                            log::debug!(
                                "optional host symbol {} not exported",
                                String::from_utf8_lossy(&$sym[..$sym.len() - 1])
                            );
                            None
                        }
                    };
                };
            }

            load_symbol!(thread_state_this, b"faultdump_thread_state_this\0");
            load_symbol!(thread_state_current, b"faultdump_thread_state_current\0");
            load_symbol!(thread_interpreter, b"faultdump_thread_interpreter\0");
            load_symbol!(interpreter_thread_head, b"faultdump_interpreter_thread_head\0");
            load_symbol!(thread_next, b"faultdump_thread_next\0");
            load_symbol!(thread_id, b"faultdump_thread_id\0");
            load_symbol!(thread_top_frame, b"faultdump_thread_top_frame\0");

            load_symbol!(frame_back, b"faultdump_frame_back\0");
            load_symbol!(frame_code, b"faultdump_frame_code\0");
            load_symbol!(frame_lasti, b"faultdump_frame_lasti\0");
            load_optional!(frame_check, b"faultdump_frame_check\0");
            load_optional!(frame_lineno, b"faultdump_frame_lineno\0");

            load_symbol!(code_filename, b"faultdump_code_filename\0");
            load_symbol!(code_name, b"faultdump_code_name\0");
            load_symbol!(code_addr2line, b"faultdump_code_addr2line\0");

            load_optional!(stderr_fileno, b"faultdump_stderr_fileno\0");

            log::debug!("loaded host library from {:?}", library_path);

            Ok(HostLibrary {
                _library: library,
                thread_state_this,
                thread_state_current,
                thread_interpreter,
                interpreter_thread_head,
                thread_next,
                thread_id,
                thread_top_frame,
                frame_back,
                frame_code,
                frame_lasti,
                frame_check,
                frame_lineno,
                code_filename,
                code_name,
                code_addr2line,
                stderr_fileno,
            })
        }
    }

    /// Load the library and leak it, ready for [`install_host`](crate::install_host).
    pub fn load_static(library_path: &Path) -> HostResult<&'static HostLibrary> {
        Ok(Box::leak(Box::new(Self::load(library_path)?)))
    }

    fn text(&self, accessor: TextFn, code: Code) -> Option<HostText<'_>> {
        let mut raw = RawText::empty();
        // SAFETY: the accessor only writes the out-record; the host keeps the
        // string alive for as long as the code object.
        let ok = unsafe { accessor(code.as_ptr(), &mut raw) };
        if ok == 0 {
            return None;
        }
        unsafe { raw_text(&raw) }
    }
}

/// View a text record filled in by the host.
///
/// # Safety
/// `raw.data` must point to `raw.len` code units of width `raw.kind`, valid
/// for the returned lifetime.
unsafe fn raw_text<'a>(raw: &RawText) -> Option<HostText<'a>> {
    if raw.len == 0 {
        return Some(HostText::Latin1(&[]));
    }
    if raw.data.is_null() {
        return None;
    }
    unsafe {
        match raw.kind {
            1 => Some(HostText::Latin1(std::slice::from_raw_parts(
                raw.data as *const u8,
                raw.len,
            ))),
            2 => Some(HostText::Ucs2(std::slice::from_raw_parts(
                raw.data as *const u16,
                raw.len,
            ))),
            4 => Some(HostText::Ucs4(std::slice::from_raw_parts(
                raw.data as *const u32,
                raw.len,
            ))),
            _ => None,
        }
    }
}

impl HostRuntime for HostLibrary {
    fn thread_state_this(&self) -> Option<ThreadState> {
        ThreadState::from_ptr(unsafe { (self.thread_state_this)() })
    }

    fn thread_interpreter(&self, tstate: ThreadState) -> Option<Interpreter> {
        Interpreter::from_ptr(unsafe { (self.thread_interpreter)(tstate.as_ptr()) })
    }

    fn interpreter_thread_head(&self, interp: Interpreter) -> Option<ThreadState> {
        ThreadState::from_ptr(unsafe { (self.interpreter_thread_head)(interp.as_ptr()) })
    }

    fn thread_next(&self, tstate: ThreadState) -> Option<ThreadState> {
        ThreadState::from_ptr(unsafe { (self.thread_next)(tstate.as_ptr()) })
    }

    fn thread_id(&self, tstate: ThreadState) -> u64 {
        #[allow(clippy::unnecessary_cast)]
        let id = unsafe { (self.thread_id)(tstate.as_ptr()) } as u64;
        id
    }

    fn thread_top_frame(&self, tstate: ThreadState) -> Option<Frame> {
        Frame::from_ptr(unsafe { (self.thread_top_frame)(tstate.as_ptr()) })
    }

    fn frame_is_valid(&self, frame: Frame) -> bool {
        match self.frame_check {
            Some(check) => unsafe { check(frame.as_ptr()) != 0 },
            None => true,
        }
    }

    fn frame_back(&self, frame: Frame) -> Option<Frame> {
        Frame::from_ptr(unsafe { (self.frame_back)(frame.as_ptr()) })
    }

    fn frame_code(&self, frame: Frame) -> Option<Code> {
        Code::from_ptr(unsafe { (self.frame_code)(frame.as_ptr()) })
    }

    fn frame_last_instruction(&self, frame: Frame) -> i32 {
        unsafe { (self.frame_lasti)(frame.as_ptr()) }
    }

    fn frame_line_number(&self, frame: Frame) -> Option<i32> {
        self.frame_lineno
            .map(|lineno| unsafe { lineno(frame.as_ptr()) })
    }

    fn code_filename(&self, code: Code) -> Option<HostText<'_>> {
        self.text(self.code_filename, code)
    }

    fn code_name(&self, code: Code) -> Option<HostText<'_>> {
        self.text(self.code_name, code)
    }

    fn code_addr_to_line(&self, code: Code, last_instruction: i32) -> i32 {
        unsafe { (self.code_addr2line)(code.as_ptr(), last_instruction) }
    }

    fn thread_state_current(&self) -> Option<ThreadState> {
        ThreadState::from_ptr(unsafe { (self.thread_state_current)() })
    }

    fn stderr(&self) -> Option<FileRef> {
        let stderr_fileno = self.stderr_fileno?;
        let fd = unsafe { stderr_fileno() };
        if fd < 0 {
            return None;
        }
        Some(Arc::new(RawFileno(i64::from(fd))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library_fails() {
        let result = HostLibrary::load(Path::new("/nonexistent/libfaultdump-host.so"));
        assert!(matches!(result, Err(HostError::Load(_))));
    }

    #[test]
    fn test_raw_text_widths() {
        let latin1 = b"abc";
        let raw = RawText {
            kind: 1,
            data: latin1.as_ptr() as *const c_void,
            len: latin1.len(),
        };
        assert_eq!(unsafe { raw_text(&raw) }, Some(HostText::Latin1(b"abc")));

        let wide: [u32; 1] = [0x1f600];
        let raw = RawText {
            kind: 4,
            data: wide.as_ptr() as *const c_void,
            len: 1,
        };
        assert_eq!(unsafe { raw_text(&raw) }, Some(HostText::Ucs4(&[0x1f600])));

        let raw = RawText {
            kind: 3,
            data: wide.as_ptr() as *const c_void,
            len: 1,
        };
        assert_eq!(unsafe { raw_text(&raw) }, None);
    }

    #[test]
    fn test_raw_text_empty_is_a_string() {
        assert_eq!(
            unsafe { raw_text(&RawText::empty()) },
            Some(HostText::Latin1(&[]))
        );
    }
}
