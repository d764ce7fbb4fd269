//! Borrowed views over host strings.

/// A host string as stored by the runtime, viewed without copying.
///
/// Runtimes commonly store text with a fixed code-unit width chosen per
/// string. The view yields code points in order and never allocates, so it
/// can be read from a signal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostText<'a> {
    /// One byte per code point (U+0000..U+00FF).
    Latin1(&'a [u8]),
    /// Two bytes per code point (Basic Multilingual Plane).
    Ucs2(&'a [u16]),
    /// Four bytes per code point.
    Ucs4(&'a [u32]),
    /// Variable-width UTF-8.
    Utf8(&'a str),
}

impl<'a> HostText<'a> {
    /// Number of code points.
    pub fn len(&self) -> usize {
        match self {
            HostText::Latin1(units) => units.len(),
            HostText::Ucs2(units) => units.len(),
            HostText::Ucs4(units) => units.len(),
            HostText::Utf8(s) => s.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            HostText::Latin1(units) => units.is_empty(),
            HostText::Ucs2(units) => units.is_empty(),
            HostText::Ucs4(units) => units.is_empty(),
            HostText::Utf8(s) => s.is_empty(),
        }
    }

    /// Iterate over the code points.
    pub fn code_points(&self) -> CodePoints<'a> {
        CodePoints {
            text: *self,
            pos: 0,
        }
    }
}

/// Iterator over the code points of a [`HostText`].
#[derive(Debug, Clone)]
pub struct CodePoints<'a> {
    text: HostText<'a>,
    /// Unit index, or byte offset for UTF-8.
    pos: usize,
}

impl Iterator for CodePoints<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let ch = match self.text {
            HostText::Latin1(units) => u32::from(*units.get(self.pos)?),
            HostText::Ucs2(units) => u32::from(*units.get(self.pos)?),
            HostText::Ucs4(units) => *units.get(self.pos)?,
            HostText::Utf8(s) => {
                let c = s.get(self.pos..)?.chars().next()?;
                self.pos += c.len_utf8();
                return Some(u32::from(c));
            }
        };
        self.pos += 1;
        Some(ch)
    }
}
