//! Signal-safe traceback serializers.
//!
//! Output format:
//!
//! ```text
//! Traceback (most recent call first):
//!   File "xxx", line xxx, in xxx
//!   File "xxx", line xxx, in xxx
//!   ...
//! ```
//!
//! Only the first [`MAX_FRAME_DEPTH`] frames of a thread and the first
//! [`MAX_NTHREADS`] threads are written. Every function here is signal safe:
//! it reads the host through its signal-safe accessors and writes through
//! [`crate::io`].

use crate::io::{emit_decimal, emit_hex, emit_str, emit_text};
use faultdump_host::{Code, Frame, HostRuntime, ThreadState};
use std::os::fd::RawFd;

/// Longest file or function name written, in code points.
pub const MAX_STRING_LENGTH: usize = 100;

/// Frames written per thread.
pub const MAX_FRAME_DEPTH: usize = 100;

/// Threads written by [`dump_traceback_threads`].
pub const MAX_NTHREADS: usize = 100;

/// Digits in a thread identifier, two per byte of `unsigned long`.
pub const THREAD_ID_WIDTH: usize = 2 * std::mem::size_of::<libc::c_ulong>();

/// Line number of `frame`, preferring the host's convenience accessor.
fn frame_line_number(host: &dyn HostRuntime, frame: Frame, code: Option<Code>) -> i32 {
    if let Some(line) = host.frame_line_number(frame) {
        return line;
    }
    match code {
        Some(code) => host.code_addr_to_line(code, host.frame_last_instruction(frame)),
        None => 0,
    }
}

/// Write one frame: `  File "xxx", line xxx, in xxx`.
pub fn dump_frame(fd: RawFd, host: &dyn HostRuntime, frame: Frame) {
    let code = host.frame_code(frame);

    emit_str(fd, "  File ");
    match code.and_then(|code| host.code_filename(code)) {
        Some(filename) => {
            emit_str(fd, "\"");
            emit_text(fd, filename, MAX_STRING_LENGTH);
            emit_str(fd, "\"");
        }
        None => emit_str(fd, "???"),
    }

    emit_str(fd, ", line ");
    emit_decimal(fd, frame_line_number(host, frame, code));
    emit_str(fd, ", in ");

    match code.and_then(|code| host.code_name(code)) {
        Some(name) => emit_text(fd, name, MAX_STRING_LENGTH),
        None => emit_str(fd, "???"),
    }
    emit_str(fd, "\n");
}

/// Write the stack of `tstate`, innermost frame first.
///
/// With `write_header`, the block starts with
/// `Traceback (most recent call first):`. A walk stops silently at the first
/// frame failing the host's sanity check. Past [`MAX_FRAME_DEPTH`] frames a
/// single `  ...` line ends the block.
pub fn dump_traceback(fd: RawFd, host: &dyn HostRuntime, tstate: ThreadState, write_header: bool) {
    if write_header {
        emit_str(fd, "Traceback (most recent call first):\n");
    }

    let mut frame = host.thread_top_frame(tstate);
    let mut depth = 0;
    while let Some(current) = frame {
        if depth >= MAX_FRAME_DEPTH {
            emit_str(fd, "  ...\n");
            break;
        }
        if !host.frame_is_valid(current) {
            break;
        }
        dump_frame(fd, host, current);
        frame = host.frame_back(current);
        depth += 1;
    }
}

/// Write `Current thread 0xHHHH:` or `Thread 0xHHHH:`.
fn write_thread_id(fd: RawFd, host: &dyn HostRuntime, tstate: ThreadState, is_current: bool) {
    if is_current {
        emit_str(fd, "Current thread 0x");
    } else {
        emit_str(fd, "Thread 0x");
    }
    emit_hex(fd, host.thread_id(tstate), THREAD_ID_WIDTH);
    emit_str(fd, ":\n");
}

/// Write the stack of every thread of the interpreter owning `current`.
///
/// Threads are separated by a blank line; `current` gets the
/// `Current thread` header. Past [`MAX_NTHREADS`] threads a `...` line ends
/// the dump. Returns an error message when the thread list is unreachable.
pub fn dump_traceback_threads(
    fd: RawFd,
    host: &dyn HostRuntime,
    current: ThreadState,
) -> Result<(), &'static str> {
    let interp = host
        .thread_interpreter(current)
        .ok_or("unable to get the interpreter")?;
    let mut tstate = host
        .interpreter_thread_head(interp)
        .ok_or("unable to get the thread head state")?;

    let mut nthreads = 0;
    loop {
        if nthreads != 0 {
            emit_str(fd, "\n");
        }
        if nthreads >= MAX_NTHREADS {
            emit_str(fd, "...\n");
            break;
        }
        write_thread_id(fd, host, tstate, tstate == current);
        dump_traceback(fd, host, tstate, false);
        nthreads += 1;

        match host.thread_next(tstate) {
            Some(next) => tstate = next,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tests::capture;
    use faultdump_host::sim::{CodeSpec, FrameSpec, SimHost, ThreadBuilder};

    fn deep(depth: usize) -> SimHost {
        SimHost::builder()
            .thread(1, |t| {
                (1..=depth as i32).fold(t, |t, line| t.call("deep.py", "recurse", line))
            })
            .build()
    }

    fn frame_lines(out: &str) -> usize {
        out.lines().filter(|line| line.starts_with("  File ")).count()
    }

    #[test]
    fn test_single_thread_block() {
        let host = SimHost::builder()
            .thread(1, |t| {
                t.call("test.py", "<module>", 12)
                    .call("test.py", "f", 7)
                    .call("test.py", "g", 42)
            })
            .build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), true));
        assert_eq!(
            out,
            "Traceback (most recent call first):\n\
             \x20 File \"test.py\", line 42, in g\n\
             \x20 File \"test.py\", line 7, in f\n\
             \x20 File \"test.py\", line 12, in <module>\n"
        );
    }

    #[test]
    fn test_depth_limits() {
        for (depth, written, elided) in [(99, 99, false), (100, 100, false), (101, 100, true)] {
            let host = deep(depth);
            let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
            assert_eq!(frame_lines(&out), written, "depth {depth}");
            assert_eq!(out.ends_with("  ...\n"), elided, "depth {depth}");
            assert_eq!(out.matches("  ...\n").count(), usize::from(elided));
        }
    }

    #[test]
    fn test_innermost_frame_comes_first() {
        let host = deep(101);
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        assert!(out.starts_with("  File \"deep.py\", line 101, in recurse\n"));
    }

    #[test]
    fn test_missing_code_object() {
        let host = SimHost::builder()
            .thread(1, ThreadBuilder::call_without_code)
            .build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        assert_eq!(out, "  File ???, line 0, in ???\n");
    }

    #[test]
    fn test_names_that_are_not_strings() {
        let frame = FrameSpec {
            code: Some(CodeSpec {
                filename: None,
                name: None,
                line_table: vec![(0, 3)],
            }),
            ..FrameSpec::call("", "", 0)
        };
        let host = SimHost::builder().thread_frames(1, vec![frame]).build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        assert_eq!(out, "  File ???, line 3, in ???\n");
    }

    #[test]
    fn test_long_and_non_ascii_names() {
        let long = "a".repeat(101);
        let host = SimHost::builder()
            .thread(1, |t| t.call(&long, "caf\u{e9}", 1).call("\u{1f600}.py", "\u{3b1}", 2))
            .build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        let expected = format!(
            "  File \"\\U0001f600.py\", line 2, in \\u03b1\n  File \"{}...\", line 1, in caf\\xe9\n",
            "a".repeat(100)
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_line_from_table_and_accessor() {
        let frame = FrameSpec {
            code: Some(CodeSpec {
                filename: Some("t.py".into()),
                name: Some("g".into()),
                line_table: vec![(0, 10), (8, 12)],
            }),
            last_instruction: 9,
            line_hint: Some(99),
            valid: true,
        };
        let host = SimHost::builder().thread_frames(1, vec![frame.clone()]).build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        assert_eq!(out, "  File \"t.py\", line 12, in g\n");

        let host = SimHost::builder()
            .thread_frames(1, vec![frame])
            .line_accessor(true)
            .build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), false));
        assert_eq!(out, "  File \"t.py\", line 99, in g\n");
    }

    #[test]
    fn test_walk_stops_at_invalid_frame() {
        let host = SimHost::builder()
            .thread(1, |t| t.call("a.py", "outer", 1).invalid_frame().call("a.py", "inner", 3))
            .build();
        let out = capture(|fd| dump_traceback(fd, &host, host.thread(0).unwrap(), true));
        assert_eq!(
            out,
            "Traceback (most recent call first):\n  File \"a.py\", line 3, in inner\n"
        );
    }

    #[test]
    fn test_thread_without_frames() {
        let host = SimHost::builder().thread(1, |t| t).build();
        let tstate = host.thread(0).unwrap();
        assert_eq!(capture(|fd| dump_traceback(fd, &host, tstate, false)), "");
        assert_eq!(
            capture(|fd| dump_traceback(fd, &host, tstate, true)),
            "Traceback (most recent call first):\n"
        );
    }

    #[test]
    fn test_all_threads() {
        let host = SimHost::builder()
            .thread(0x7f00_0000_0001, |t| t.call("main.py", "<module>", 5).call("main.py", "crash", 9))
            .thread(0xabc, |t| t.call("worker.py", "run", 20))
            .build();
        let current = host.thread(0).unwrap();
        let mut result = Ok(());
        let out = capture(|fd| result = dump_traceback_threads(fd, &host, current));
        assert_eq!(result, Ok(()));

        let expected = format!(
            "Current thread 0x{:0w$x}:\n\
             \x20 File \"main.py\", line 9, in crash\n\
             \x20 File \"main.py\", line 5, in <module>\n\
             \n\
             Thread 0x{:0w$x}:\n\
             \x20 File \"worker.py\", line 20, in run\n",
            0x7f00_0000_0001u64,
            0xabcu64,
            w = THREAD_ID_WIDTH
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_current_thread_need_not_be_first() {
        let host = SimHost::builder()
            .thread(1, |t| t.call("a.py", "a", 1))
            .thread(2, |t| t.call("b.py", "b", 2))
            .build();
        let out = capture(|fd| {
            let _ = dump_traceback_threads(fd, &host, host.thread(1).unwrap());
        });
        assert_eq!(out.matches("Current thread 0x").count(), 1);
        assert!(out.starts_with("Thread 0x"));
        assert!(out.contains(&format!("\n\nCurrent thread 0x{:0w$x}:\n", 2, w = THREAD_ID_WIDTH)));
    }

    #[test]
    fn test_thread_limit() {
        let host = (0..101)
            .fold(SimHost::builder(), |builder, id| {
                builder.thread(id, |t| t.call("t.py", "idle", 1))
            })
            .build();
        let out = capture(|fd| {
            let _ = dump_traceback_threads(fd, &host, host.thread(0).unwrap());
        });
        let headers = out
            .lines()
            .filter(|line| line.starts_with("Thread 0x") || line.starts_with("Current thread 0x"))
            .count();
        assert_eq!(headers, MAX_NTHREADS);
        assert!(out.ends_with("\n...\n"));
        assert_eq!(out.matches("...\n").count(), 1);
    }
}
