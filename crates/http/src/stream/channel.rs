//! The minimal byte medium contract every body source or sink implements.
//!
//! A [`ByteChannel`] is synchronous: each call either completes
//! against bytes that are already at hand or reports how much it managed to
//! move. Anything that genuinely blocks (a socket, a pipe fed by another
//! thread) must hide that inside its own implementation. The asynchronous
//! surface lives one level up in [`StreamAdapter`](super::StreamAdapter).
//!
//! Reads come in three flavours that differ only in how they move the read
//! cursor:
//!
//! | operation  | reads from       | cursor afterwards            |
//! |------------|------------------|------------------------------|
//! | `peek_n`   | current position | unchanged                    |
//! | `bump_n`   | current position | advanced past the bytes read |
//! | `next_n`   | position + n     | advanced by n                |

use std::io;
use std::io::SeekFrom;

/// Signed 64-bit unit used for availability counts and positions.
pub type StreamSize = i64;

/// The direction(s) an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode {
    read: bool,
    write: bool,
}

impl OpenMode {
    pub const IN: Self = Self { read: true, write: false };
    pub const OUT: Self = Self { read: false, write: true };
    pub const BOTH: Self = Self { read: true, write: true };

    #[inline]
    pub fn is_read(self) -> bool {
        self.read
    }

    #[inline]
    pub fn is_write(self) -> bool {
        self.write
    }
}

/// A type-erased byte medium: an in-memory buffer, a file, a socket, or the
/// native channel of a pluggable transport.
///
/// Handles are shared between the message that owns a body and whichever task
/// is currently producing or consuming it, so every method takes `&self` and
/// implementations carry their own interior locking.
pub trait ByteChannel: Send + Sync {
    /// Whether [`seek_off`](Self::seek_off) and [`seek_pos`](Self::seek_pos) are usable.
    fn can_seek(&self) -> bool;

    /// Best-effort count of bytes readable without blocking.
    ///
    /// Media without a definite length may report a declared content length or
    /// their own reported length instead; treat the value as a hint.
    fn in_avail(&self) -> StreamSize;

    /// Flushes pending output.
    fn sync(&self) -> io::Result<()>;

    /// Writes up to `buf.len()` bytes and returns how many were accepted.
    /// Partial writes are allowed, so callers must loop.
    fn write_n(&self, buf: &[u8]) -> io::Result<usize>;

    /// Copies up to `buf.len()` bytes without moving the read cursor.
    fn peek_n(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Copies up to `buf.len()` bytes and advances the read cursor past them.
    fn bump_n(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Advances the read cursor by `buf.len()` bytes, then peeks the next block.
    fn next_n(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves the cursor(s) selected by `mode` and returns the new absolute position.
    fn seek_off(&self, pos: SeekFrom, mode: OpenMode) -> io::Result<u64> {
        let _ = (pos, mode);
        Err(not_implemented("seek_off"))
    }

    /// Moves the cursor(s) selected by `mode` to an absolute position.
    fn seek_pos(&self, pos: u64, mode: OpenMode) -> io::Result<u64> {
        let _ = (pos, mode);
        Err(not_implemented("seek_pos"))
    }
}

pub(crate) fn not_implemented(operation: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{operation} is not implemented"))
}

#[inline]
pub(crate) fn to_stream_size(n: usize) -> StreamSize {
    StreamSize::try_from(n).unwrap_or(StreamSize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink;

    impl ByteChannel for Sink {
        fn can_seek(&self) -> bool {
            false
        }

        fn in_avail(&self) -> StreamSize {
            0
        }

        fn sync(&self) -> io::Result<()> {
            Ok(())
        }

        fn write_n(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len().min(3))
        }

        fn peek_n(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn bump_n(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn next_n(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn seeking_is_unsupported_by_default() {
        let sink = Sink;
        let err = sink.seek_off(SeekFrom::Start(0), OpenMode::IN).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert_eq!(err.to_string(), "seek_off is not implemented");

        let err = sink.seek_pos(4, OpenMode::OUT).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn partial_writes_are_reported() {
        assert_eq!(Sink.write_n(b"abcdef").unwrap(), 3);
    }

    #[test]
    fn open_mode_flags() {
        assert!(OpenMode::BOTH.is_read() && OpenMode::BOTH.is_write());
        assert!(OpenMode::IN.is_read() && !OpenMode::IN.is_write());
        assert!(!OpenMode::OUT.is_read() && OpenMode::OUT.is_write());
    }
}
