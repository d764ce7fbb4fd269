//! File-like objects that supply output descriptors.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;

/// A file object as seen by faultdump.
///
/// faultdump resolves the descriptor once per control-surface call and then
/// keeps a strong reference to the object so the descriptor stays open for
/// as long as a handler may write to it.
pub trait FileLike: Send + Sync {
    /// The underlying descriptor number, as reported by the object.
    ///
    /// The value is validated by the caller; implementations report whatever
    /// they hold.
    fn fileno(&self) -> io::Result<i64>;

    /// Flush buffered data so that raw descriptor writes land after it.
    fn flush(&self) -> io::Result<()>;
}

/// Shared reference to a file object; retaining it anchors the descriptor.
pub type FileRef = Arc<dyn FileLike>;

impl FileLike for File {
    fn fileno(&self) -> io::Result<i64> {
        Ok(i64::from(self.as_raw_fd()))
    }

    fn flush(&self) -> io::Result<()> {
        Write::flush(&mut &*self)
    }
}

impl FileLike for io::Stderr {
    fn fileno(&self) -> io::Result<i64> {
        Ok(i64::from(self.as_raw_fd()))
    }

    fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl FileLike for io::Stdout {
    fn fileno(&self) -> io::Result<i64> {
        Ok(i64::from(self.as_raw_fd()))
    }

    fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// A bare descriptor number owned elsewhere.
///
/// Used for descriptors the host manages itself. Flushing is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFileno(pub i64);

impl FileLike for RawFileno {
    fn fileno(&self) -> io::Result<i64> {
        Ok(self.0)
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
