//! In-memory interpreter model.
//!
//! `SimHost` implements [`HostRuntime`] over an immutable set of threads and
//! call stacks built up front. It backs the test suites and the demo binary:
//! nothing here allocates or locks once built, so the model can be walked
//! from a signal handler the same way a real runtime would be.

use crate::file::FileRef;
use crate::runtime::HostRuntime;
use crate::text::HostText;
use crate::types::{Code, Frame, Interpreter, ThreadState};
use std::cell::Cell;
use std::ffi::c_void;

/// Description of a code object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSpec {
    /// `None` models a file name that is missing or not a string.
    pub filename: Option<String>,
    /// `None` models a function name that is missing or not a string.
    pub name: Option<String>,
    /// `(instruction offset, line)` pairs sorted by offset.
    pub line_table: Vec<(i32, i32)>,
}

impl CodeSpec {
    pub fn new(filename: &str, name: &str, line: i32) -> Self {
        CodeSpec {
            filename: Some(filename.to_string()),
            name: Some(name.to_string()),
            line_table: vec![(0, line)],
        }
    }
}

/// Description of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    pub code: Option<CodeSpec>,
    pub last_instruction: i32,
    /// Line tracked on the frame itself, reported by the convenience accessor.
    pub line_hint: Option<i32>,
    /// Whether the frame passes the host sanity check.
    pub valid: bool,
}

impl FrameSpec {
    pub fn call(filename: &str, name: &str, line: i32) -> Self {
        FrameSpec {
            code: Some(CodeSpec::new(filename, name, line)),
            last_instruction: 0,
            line_hint: None,
            valid: true,
        }
    }
}

/// Builder for one thread's call stack, outermost call first.
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    frames: Vec<FrameSpec>,
}

impl ThreadBuilder {
    /// Push a call at `line` of `name` in `filename`.
    pub fn call(self, filename: &str, name: &str, line: i32) -> Self {
        self.frame(FrameSpec::call(filename, name, line))
    }

    /// Push a frame that has no code object.
    pub fn call_without_code(self) -> Self {
        self.frame(FrameSpec {
            code: None,
            last_instruction: 0,
            line_hint: None,
            valid: true,
        })
    }

    /// Push a frame failing the host sanity check.
    pub fn invalid_frame(self) -> Self {
        self.frame(FrameSpec {
            valid: false,
            ..FrameSpec::call("<invalid>", "<invalid>", 0)
        })
    }

    pub fn frame(mut self, frame: FrameSpec) -> Self {
        self.frames.push(frame);
        self
    }
}

/// Builder for [`SimHost`].
#[derive(Default)]
pub struct SimHostBuilder {
    threads: Vec<(u64, Vec<FrameSpec>)>,
    line_accessor: bool,
    stderr: Option<FileRef>,
}

impl SimHostBuilder {
    /// Add a thread with identifier `id`. Threads are listed in insertion order.
    pub fn thread(mut self, id: u64, stack: impl FnOnce(ThreadBuilder) -> ThreadBuilder) -> Self {
        let builder = stack(ThreadBuilder::default());
        self.threads.push((id, builder.frames));
        self
    }

    /// Add a thread from a ready-made list of frames, outermost first.
    pub fn thread_frames(mut self, id: u64, frames: Vec<FrameSpec>) -> Self {
        self.threads.push((id, frames));
        self
    }

    /// Expose the convenience line accessor.
    pub fn line_accessor(mut self, enabled: bool) -> Self {
        self.line_accessor = enabled;
        self
    }

    /// File object returned as the host's standard error.
    pub fn stderr(mut self, file: FileRef) -> Self {
        self.stderr = Some(file);
        self
    }

    pub fn build(self) -> SimHost {
        let mut interp = Box::new(SimInterpreter {
            threads: Vec::with_capacity(self.threads.len()),
        });
        let interp_ptr: *const SimInterpreter = &*interp;

        for (index, (id, specs)) in self.threads.into_iter().enumerate() {
            let mut frames: Vec<Box<SimFrame>> = Vec::with_capacity(specs.len());
            for spec in specs {
                let back = frames
                    .last()
                    .map_or(std::ptr::null(), |outer| &**outer as *const SimFrame);
                frames.push(Box::new(SimFrame {
                    code: spec.code.map(|code| Box::new(SimCode::from(code))),
                    last_instruction: spec.last_instruction,
                    line_hint: spec.line_hint,
                    valid: spec.valid,
                    back,
                }));
            }
            interp.threads.push(Box::new(SimThread {
                id,
                index,
                interp: interp_ptr,
                frames,
            }));
        }

        SimHost {
            interp,
            line_accessor: self.line_accessor,
            stderr: self.stderr,
        }
    }
}

/// Text stored at the narrowest code-unit width able to hold it.
#[derive(Debug)]
enum OwnedText {
    Latin1(Vec<u8>),
    Ucs2(Vec<u16>),
    Ucs4(Vec<u32>),
}

impl OwnedText {
    fn new(s: &str) -> Self {
        let max = s.chars().map(u32::from).max().unwrap_or(0);
        if max <= 0xff {
            OwnedText::Latin1(s.chars().map(|c| u32::from(c) as u8).collect())
        } else if max <= 0xffff {
            OwnedText::Ucs2(s.chars().map(|c| u32::from(c) as u16).collect())
        } else {
            OwnedText::Ucs4(s.chars().map(u32::from).collect())
        }
    }

    fn view(&self) -> HostText<'_> {
        match self {
            OwnedText::Latin1(units) => HostText::Latin1(units),
            OwnedText::Ucs2(units) => HostText::Ucs2(units),
            OwnedText::Ucs4(units) => HostText::Ucs4(units),
        }
    }
}

#[derive(Debug)]
struct SimCode {
    filename: Option<OwnedText>,
    name: Option<OwnedText>,
    line_table: Vec<(i32, i32)>,
}

impl From<CodeSpec> for SimCode {
    fn from(spec: CodeSpec) -> Self {
        SimCode {
            filename: spec.filename.as_deref().map(OwnedText::new),
            name: spec.name.as_deref().map(OwnedText::new),
            line_table: spec.line_table,
        }
    }
}

#[derive(Debug)]
struct SimFrame {
    code: Option<Box<SimCode>>,
    last_instruction: i32,
    line_hint: Option<i32>,
    valid: bool,
    back: *const SimFrame,
}

#[derive(Debug)]
struct SimThread {
    id: u64,
    index: usize,
    interp: *const SimInterpreter,
    frames: Vec<Box<SimFrame>>,
}

#[derive(Debug)]
struct SimInterpreter {
    threads: Vec<Box<SimThread>>,
}

thread_local! {
    /// Thread state bound to the calling OS thread.
    static BOUND_THREAD: Cell<*const SimThread> = const { Cell::new(std::ptr::null()) };
}

/// An immutable in-memory interpreter.
pub struct SimHost {
    interp: Box<SimInterpreter>,
    line_accessor: bool,
    stderr: Option<FileRef>,
}

// Safety: the model is never mutated after `build()`; the raw pointers only
// link boxes owned by the same `SimHost`.
unsafe impl Send for SimHost {}
unsafe impl Sync for SimHost {}

impl SimHost {
    pub fn builder() -> SimHostBuilder {
        SimHostBuilder::default()
    }

    /// Leak the host so it can be installed process-wide.
    pub fn leak(self) -> &'static SimHost {
        Box::leak(Box::new(self))
    }

    /// Number of threads in the model.
    pub fn thread_count(&self) -> usize {
        self.interp.threads.len()
    }

    /// Handle of the thread at `index`, in list order.
    pub fn thread(&self, index: usize) -> Option<ThreadState> {
        self.interp
            .threads
            .get(index)
            .map(|thread| handle(&**thread))
    }

    /// Make the thread at `index` the thread state of the calling OS thread.
    pub fn bind_current_thread(&self, index: usize) {
        let ptr = self
            .interp
            .threads
            .get(index)
            .map_or(std::ptr::null(), |thread| &**thread as *const SimThread);
        BOUND_THREAD.with(|bound| bound.set(ptr));
    }

    /// Detach the calling OS thread from any model thread.
    pub fn unbind_current_thread() {
        BOUND_THREAD.with(|bound| bound.set(std::ptr::null()));
    }

    fn owns(&self, thread: &SimThread) -> bool {
        std::ptr::eq(thread.interp, &*self.interp)
    }

    fn bound(&self) -> Option<ThreadState> {
        let ptr = BOUND_THREAD.with(|bound| bound.get());
        // SAFETY: bound pointers come from `bind_current_thread` on a live host.
        let thread = unsafe { ptr.as_ref() }?;
        self.owns(thread).then(|| handle(thread))
    }
}

fn handle<T, H>(target: &T) -> H
where
    H: FromRaw,
{
    H::from_raw(target as *const T as *mut c_void)
}

trait FromRaw {
    fn from_raw(ptr: *mut c_void) -> Self;
}

macro_rules! from_raw {
    ($($handle:ident),*) => {$(
        impl FromRaw for $handle {
            fn from_raw(ptr: *mut c_void) -> Self {
                match $handle::from_ptr(ptr) {
                    Some(handle) => handle,
                    None => unreachable!("references are never null"),
                }
            }
        }
    )*};
}

from_raw!(ThreadState, Interpreter, Frame, Code);

// SAFETY (all four): handles passed to a `SimHost` were produced by it and
// point into boxes it owns for its whole lifetime.
fn thread_ref<'a>(tstate: ThreadState) -> &'a SimThread {
    unsafe { &*(tstate.as_ptr() as *const SimThread) }
}

fn interp_ref<'a>(interp: Interpreter) -> &'a SimInterpreter {
    unsafe { &*(interp.as_ptr() as *const SimInterpreter) }
}

fn frame_ref<'a>(frame: Frame) -> &'a SimFrame {
    unsafe { &*(frame.as_ptr() as *const SimFrame) }
}

fn code_ref<'a>(code: Code) -> &'a SimCode {
    unsafe { &*(code.as_ptr() as *const SimCode) }
}

fn addr_to_line(code: &SimCode, last_instruction: i32) -> i32 {
    code.line_table
        .iter()
        .take_while(|(addr, _)| *addr <= last_instruction)
        .last()
        .map_or(0, |(_, line)| *line)
}

impl HostRuntime for SimHost {
    fn thread_state_this(&self) -> Option<ThreadState> {
        self.bound()
    }

    fn thread_interpreter(&self, tstate: ThreadState) -> Option<Interpreter> {
        let thread = thread_ref(tstate);
        // SAFETY: set at build time to the owning interpreter.
        unsafe { thread.interp.as_ref() }.map(|interp| handle(interp))
    }

    fn interpreter_thread_head(&self, interp: Interpreter) -> Option<ThreadState> {
        interp_ref(interp)
            .threads
            .first()
            .map(|thread| handle(&**thread))
    }

    fn thread_next(&self, tstate: ThreadState) -> Option<ThreadState> {
        let thread = thread_ref(tstate);
        // SAFETY: set at build time to the owning interpreter.
        let interp = unsafe { &*thread.interp };
        interp
            .threads
            .get(thread.index + 1)
            .map(|next| handle(&**next))
    }

    fn thread_id(&self, tstate: ThreadState) -> u64 {
        thread_ref(tstate).id
    }

    fn thread_top_frame(&self, tstate: ThreadState) -> Option<Frame> {
        thread_ref(tstate)
            .frames
            .last()
            .map(|frame| handle(&**frame))
    }

    fn frame_is_valid(&self, frame: Frame) -> bool {
        frame_ref(frame).valid
    }

    fn frame_back(&self, frame: Frame) -> Option<Frame> {
        // SAFETY: `back` links to an outer frame of the same thread.
        unsafe { frame_ref(frame).back.as_ref() }.map(|outer| handle(outer))
    }

    fn frame_code(&self, frame: Frame) -> Option<Code> {
        frame_ref(frame).code.as_deref().map(|code| handle(code))
    }

    fn frame_last_instruction(&self, frame: Frame) -> i32 {
        frame_ref(frame).last_instruction
    }

    fn frame_line_number(&self, frame: Frame) -> Option<i32> {
        if !self.line_accessor {
            return None;
        }
        let frame = frame_ref(frame);
        frame.line_hint.or_else(|| {
            frame
                .code
                .as_deref()
                .map(|code| addr_to_line(code, frame.last_instruction))
        })
    }

    fn code_filename(&self, code: Code) -> Option<HostText<'_>> {
        code_ref(code).filename.as_ref().map(OwnedText::view)
    }

    fn code_name(&self, code: Code) -> Option<HostText<'_>> {
        code_ref(code).name.as_ref().map(OwnedText::view)
    }

    fn code_addr_to_line(&self, code: Code, last_instruction: i32) -> i32 {
        addr_to_line(code_ref(code), last_instruction)
    }

    fn thread_state_current(&self) -> Option<ThreadState> {
        self.bound()
    }

    fn stderr(&self) -> Option<FileRef> {
        self.stderr.clone()
    }
}
