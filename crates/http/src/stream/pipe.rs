use std::io;
use std::sync::Mutex;

use bytes::{Buf, BytesMut};

use super::channel::{ByteChannel, StreamSize, to_stream_size};
use super::lock;

/// Initial capacity reserved for a producer/consumer buffer.
const INIT_PIPE_SIZE: usize = 4 * 1024;

/// A non-seekable producer/consumer buffer.
///
/// Whatever the producer writes becomes readable by the consumer, in order,
/// exactly once. Reads never wait: an empty pipe reads zero bytes. Messages
/// that receive a body from the network hand the write side to the transport
/// and keep the read side as their body.
#[derive(Debug)]
pub struct PipeChannel {
    inner: Mutex<BytesMut>,
}

impl Default for PipeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeChannel {
    pub fn new() -> Self {
        Self { inner: Mutex::new(BytesMut::with_capacity(INIT_PIPE_SIZE)) }
    }
}

fn copy_front(buffered: &BytesMut, buf: &mut [u8]) -> usize {
    let n = buffered.len().min(buf.len());
    buf[..n].copy_from_slice(&buffered[..n]);
    n
}

impl ByteChannel for PipeChannel {
    fn can_seek(&self) -> bool {
        false
    }

    fn in_avail(&self) -> StreamSize {
        to_stream_size(lock(&self.inner).len())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn write_n(&self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn peek_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_front(&lock(&self.inner), buf))
    }

    fn bump_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buffered = lock(&self.inner);
        let n = copy_front(&buffered, buf);
        buffered.advance(n);
        Ok(n)
    }

    fn next_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buffered = lock(&self.inner);
        let skip = buffered.len().min(buf.len());
        buffered.advance(skip);
        Ok(copy_front(&buffered, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::OpenMode;
    use std::io::SeekFrom;

    #[test]
    fn consumer_sees_producer_bytes_once() {
        let pipe = PipeChannel::new();
        assert_eq!(pipe.in_avail(), 0);

        pipe.write_n(b"hello ").unwrap();
        pipe.write_n(b"world").unwrap();
        assert_eq!(pipe.in_avail(), 11);

        let mut buf = [0u8; 6];
        assert_eq!(pipe.peek_n(&mut buf).unwrap(), 6);
        assert_eq!(pipe.bump_n(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"hello ");

        let mut rest = [0u8; 16];
        assert_eq!(pipe.bump_n(&mut rest).unwrap(), 5);
        assert_eq!(&rest[..5], b"world");
        assert_eq!(pipe.bump_n(&mut rest).unwrap(), 0);
    }

    #[test]
    fn pipes_do_not_seek() {
        let pipe = PipeChannel::new();
        assert!(!pipe.can_seek());
        assert_eq!(pipe.seek_off(SeekFrom::Start(0), OpenMode::IN).unwrap_err().kind(), io::ErrorKind::Unsupported);
    }
}
