use std::fs::File;
use std::io;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::channel::{ByteChannel, StreamSize, to_stream_size};
use super::lock;

/// Wraps a blocking `std::io` handle (a file, a socket, a managed stream) as a
/// [`ByteChannel`].
///
/// Peeking is served from a lookahead buffer that is filled by reading the
/// handle until the request is satisfied or the handle reports end of data.
/// When a content length is declared, it is what [`in_avail`](ByteChannel::in_avail)
/// reports and it shrinks as the read cursor advances; otherwise only the
/// lookahead is counted. Not seekable.
#[derive(Debug)]
pub struct IoChannel<S> {
    inner: Mutex<IoState<S>>,
}

#[derive(Debug)]
struct IoState<S> {
    io: S,
    lookahead: BytesMut,
    content_length: Option<u64>,
    eof: bool,
}

impl<S: Read + Write + Send> IoChannel<S> {
    pub fn new(io: S) -> Self {
        Self::with_state(io, None)
    }

    /// Declares how many bytes the handle will yield.
    pub fn with_content_length(io: S, content_length: u64) -> Self {
        Self::with_state(io, Some(content_length))
    }

    fn with_state(io: S, content_length: Option<u64>) -> Self {
        Self { inner: Mutex::new(IoState { io, lookahead: BytesMut::new(), content_length, eof: false }) }
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner).io
    }
}

impl IoChannel<File> {
    /// Opens `path` for reading, declaring the file size as the content length.
    pub fn open_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self::with_content_length(file, length))
    }

    /// Creates (or truncates) `path` for writing.
    pub fn create_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<S: Read> IoState<S> {
    /// Reads from the handle until the lookahead holds `wanted` bytes or the
    /// handle is exhausted.
    fn fill(&mut self, wanted: usize) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        while self.lookahead.len() < wanted && !self.eof {
            let missing = (wanted - self.lookahead.len()).min(chunk.len());
            match self.io.read(&mut chunk[..missing]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.lookahead.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf.len())?;
        let n = self.lookahead.len().min(buf.len());
        buf[..n].copy_from_slice(&self.lookahead[..n]);
        Ok(n)
    }

    fn advance(&mut self, n: usize) {
        self.lookahead.advance(n);
        if let Some(length) = self.content_length.as_mut() {
            *length = length.saturating_sub(n as u64);
        }
    }
}

impl<S: Read + Write + Send> ByteChannel for IoChannel<S> {
    fn can_seek(&self) -> bool {
        false
    }

    fn in_avail(&self) -> StreamSize {
        let state = lock(&self.inner);
        match state.content_length {
            Some(length) => StreamSize::try_from(length).unwrap_or(StreamSize::MAX),
            None => to_stream_size(state.lookahead.len()),
        }
    }

    fn sync(&self) -> io::Result<()> {
        lock(&self.inner).io.flush()
    }

    fn write_n(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.inner);
        loop {
            match state.io.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                result => return result,
            }
        }
    }

    fn peek_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        lock(&self.inner).peek(buf)
    }

    fn bump_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.inner);
        let n = state.peek(buf)?;
        state.advance(n);
        trace!(read = n, "bumped bytes from io channel");
        Ok(n)
    }

    fn next_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.inner);
        let skipped = state.peek(buf)?;
        state.advance(skipped);
        state.peek(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most three bytes per read, like a slow socket.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let max = buf.len().min(3);
            self.0.read(&mut buf[..max])
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn peek_fills_across_short_reads() {
        let channel = IoChannel::new(Trickle(Cursor::new(b"abcdefghij".to_vec())));
        let mut buf = [0u8; 8];
        assert_eq!(channel.peek_n(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
        // nothing consumed yet
        assert_eq!(channel.bump_n(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
        assert_eq!(channel.bump_n(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ij");
        assert_eq!(channel.bump_n(&mut buf).unwrap(), 0);
    }

    #[test]
    fn declared_length_shrinks_as_cursor_advances() {
        let channel = IoChannel::with_content_length(Cursor::new(b"0123456789".to_vec()), 10);
        assert_eq!(channel.in_avail(), 10);

        let mut buf = [0u8; 4];
        channel.bump_n(&mut buf).unwrap();
        assert_eq!(channel.in_avail(), 6);

        // skips "4567", then peeks "89"
        assert_eq!(channel.next_n(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(channel.in_avail(), 2);
    }

    #[test]
    fn files_declare_their_length() {
        let path = std::env::temp_dir().join(format!("micro-rest-io-channel-{}", std::process::id()));
        std::fs::write(&path, b"file body").unwrap();

        let channel = IoChannel::open_file(&path).unwrap();
        assert_eq!(channel.in_avail(), 9);
        let mut buf = [0u8; 16];
        assert_eq!(channel.bump_n(&mut buf).unwrap(), 9);
        assert_eq!(&buf[..9], b"file body");

        std::fs::remove_file(&path).unwrap();
    }
}
