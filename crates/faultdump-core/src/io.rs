//! Async-signal-safe output primitives.
//!
//! Everything here may run inside a signal handler: output goes straight to
//! `write(2)`, formatting happens in fixed-size stack buffers, and nothing
//! allocates, locks or consults the locale. Writes are best effort. A short
//! or interrupted write is not retried, since the output is diagnostic.

use faultdump_host::HostText;
use std::os::fd::RawFd;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Widest hexadecimal rendering, in digits.
pub const MAX_HEX_WIDTH: usize = 2 * std::mem::size_of::<u64>();

/// Largest value [`emit_decimal`] renders.
pub const MAX_DECIMAL: i32 = 999_999;

/// Write `bytes` with a single `write(2)` call.
pub fn emit_bytes(fd: RawFd, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    // SAFETY: write(2) only reads `bytes.len()` bytes from `bytes`.
    let _ = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
}

/// Write a constant string.
pub fn emit_str(fd: RawFd, s: &str) {
    emit_bytes(fd, s.as_bytes());
}

/// Write `value` in base 10 without leading zeros.
///
/// Values outside `0..=999999` are dropped silently.
pub fn emit_decimal(fd: RawFd, value: i32) {
    let mut buf = [0u8; 6];
    if let Some(digits) = format_decimal(value, &mut buf) {
        emit_bytes(fd, digits);
    }
}

/// Write `value` as lowercase hexadecimal, zero-padded to at least `width`
/// digits (capped at [`MAX_HEX_WIDTH`]).
pub fn emit_hex(fd: RawFd, value: u64, width: usize) {
    let mut buf = [0u8; MAX_HEX_WIDTH];
    emit_bytes(fd, format_hex(value, width, &mut buf));
}

/// Write `text` as printable ASCII with backslash escapes.
///
/// Code points 0x20..=0x7e pass through, the rest of 0x00..=0xff becomes
/// `\xHH`, the rest of the BMP `\uHHHH` and anything above `\UHHHHHHHH`.
/// At most `max_chars` code points are written; longer text is cut and
/// followed by `...`.
pub fn emit_text(fd: RawFd, text: HostText<'_>, max_chars: usize) {
    let mut out = StackBuffer::new(fd);
    let mut truncated = false;
    for (index, ch) in text.code_points().enumerate() {
        if index >= max_chars {
            truncated = true;
            break;
        }
        out.push_code_point(ch);
    }
    if truncated {
        out.push(b"...");
    }
    out.flush();
}

fn format_decimal(value: i32, buf: &mut [u8; 6]) -> Option<&[u8]> {
    if !(0..=MAX_DECIMAL).contains(&value) {
        return None;
    }
    let mut value = value.unsigned_abs();
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    Some(&buf[start..])
}

fn format_hex(value: u64, width: usize, buf: &mut [u8; MAX_HEX_WIDTH]) -> &[u8] {
    let width = width.min(MAX_HEX_WIDTH);
    let mut value = value;
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = HEX_DIGITS[(value & 0xf) as usize];
        value >>= 4;
        if value == 0 && buf.len() - start >= width {
            break;
        }
    }
    &buf[start..]
}

/// Fixed-size output buffer on the stack, flushed with `write(2)`.
struct StackBuffer {
    fd: RawFd,
    buf: [u8; 128],
    len: usize,
}

impl StackBuffer {
    fn new(fd: RawFd) -> Self {
        StackBuffer {
            fd,
            buf: [0; 128],
            len: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.len == self.buf.len() {
                self.flush();
            }
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    fn push_code_point(&mut self, ch: u32) {
        let mut hex = [0u8; MAX_HEX_WIDTH];
        match ch {
            0x20..=0x7e => self.push(&[ch as u8]),
            0..=0xff => {
                self.push(b"\\x");
                self.push(format_hex(u64::from(ch), 2, &mut hex));
            }
            0x100..=0xffff => {
                self.push(b"\\u");
                self.push(format_hex(u64::from(ch), 4, &mut hex));
            }
            _ => {
                self.push(b"\\U");
                self.push(format_hex(u64::from(ch), 8, &mut hex));
            }
        }
    }

    fn flush(&mut self) {
        emit_bytes(self.fd, &self.buf[..self.len]);
        self.len = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use std::os::fd::AsRawFd;

    /// Run `f` against a scratch descriptor and return what it wrote.
    pub(crate) fn capture(f: impl FnOnce(RawFd)) -> String {
        let mut file = tempfile::tempfile().unwrap();
        f(file.as_raw_fd());
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decimal() {
        assert_eq!(capture(|fd| emit_decimal(fd, 0)), "0");
        assert_eq!(capture(|fd| emit_decimal(fd, 42)), "42");
        assert_eq!(capture(|fd| emit_decimal(fd, 999_999)), "999999");
    }

    #[test]
    fn test_decimal_out_of_range_is_dropped() {
        assert_eq!(capture(|fd| emit_decimal(fd, 1_000_000)), "");
        assert_eq!(capture(|fd| emit_decimal(fd, -1)), "");
        assert_eq!(capture(|fd| emit_decimal(fd, i32::MIN)), "");
    }

    #[test]
    fn test_hex_padding() {
        assert_eq!(capture(|fd| emit_hex(fd, 0, 2)), "00");
        assert_eq!(capture(|fd| emit_hex(fd, 0xe9, 4)), "00e9");
        assert_eq!(capture(|fd| emit_hex(fd, 0x1f600, 8)), "0001f600");
        assert_eq!(capture(|fd| emit_hex(fd, 0x7f, 16)), "000000000000007f");
    }

    #[test]
    fn test_hex_grows_past_width() {
        assert_eq!(capture(|fd| emit_hex(fd, 0xabcdef, 2)), "abcdef");
        assert_eq!(capture(|fd| emit_hex(fd, u64::MAX, 0)), "ffffffffffffffff");
        assert_eq!(capture(|fd| emit_hex(fd, 1, 40)), "0000000000000001");
    }

    #[test]
    fn test_text_escapes() {
        let text = HostText::Utf8("a\tb\u{7f}\u{e9}\u{3b1}\u{1f600}~ ");
        assert_eq!(
            capture(|fd| emit_text(fd, text, 100)),
            "a\\x09b\\x7f\\xe9\\u03b1\\U0001f600~ "
        );
    }

    #[test]
    fn test_text_truncation() {
        let long = "x".repeat(101);
        let out = capture(|fd| emit_text(fd, HostText::Utf8(&long), 100));
        assert_eq!(out, format!("{}...", "x".repeat(100)));

        let exact = "y".repeat(100);
        let out = capture(|fd| emit_text(fd, HostText::Utf8(&exact), 100));
        assert_eq!(out, exact);
    }

    #[test]
    fn test_text_longer_than_stack_buffer() {
        // 60 escaped code points expand to 360 bytes.
        let units = [0x3b1u16; 60];
        let out = capture(|fd| emit_text(fd, HostText::Ucs2(&units), 100));
        assert_eq!(out, "\\u03b1".repeat(60));
    }
}
