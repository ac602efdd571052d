use std::io;
use std::io::SeekFrom;
use std::sync::Mutex;

use bytes::Bytes;

use super::channel::{ByteChannel, OpenMode, StreamSize, to_stream_size};
use super::lock;

/// A seekable in-memory byte medium with independent read and write heads.
///
/// Writes land at the write head, overwriting or extending the buffer; reads
/// start at the read head. This is what in-memory bodies (`set_body_text`,
/// `set_body_json`, ...) are backed by.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inner: Mutex<Buffer>,
}

#[derive(Debug, Default)]
struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel positioned to read `data` from the start and append after it.
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let write_pos = data.len();
        Self { inner: Mutex::new(Buffer { data, read_pos: 0, write_pos }) }
    }

    /// Total number of bytes held, regardless of cursor positions.
    pub fn len(&self) -> usize {
        lock(&self.inner).data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the whole buffer out.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&lock(&self.inner).data)
    }
}

impl From<Vec<u8>> for MemoryChannel {
    fn from(data: Vec<u8>) -> Self {
        Self::with_data(data)
    }
}

impl From<&str> for MemoryChannel {
    fn from(text: &str) -> Self {
        Self::with_data(text.as_bytes())
    }
}

impl Buffer {
    fn peek(&self, buf: &mut [u8]) -> usize {
        let remaining = self.data.get(self.read_pos..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        n
    }

    fn resolve(&self, pos: SeekFrom, current: usize) -> io::Result<usize> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(offset) => i128::from(to_stream_size(self.data.len())) + i128::from(offset),
            SeekFrom::Current(offset) => i128::from(to_stream_size(current)) + i128::from(offset),
        };

        if target < 0 || target > self.data.len() as i128 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek position out of range"));
        }
        usize::try_from(target).map_err(|_e| io::Error::from(io::ErrorKind::InvalidInput))
    }
}

impl ByteChannel for MemoryChannel {
    fn can_seek(&self) -> bool {
        true
    }

    fn in_avail(&self) -> StreamSize {
        let buffer = lock(&self.inner);
        to_stream_size(buffer.data.len().saturating_sub(buffer.read_pos))
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn write_n(&self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = lock(&self.inner);
        let start = buffer.write_pos;
        let overlap = buffer.data.len().saturating_sub(start).min(buf.len());
        buffer.data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        buffer.data.extend_from_slice(&buf[overlap..]);
        buffer.write_pos += buf.len();
        Ok(buf.len())
    }

    fn peek_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(lock(&self.inner).peek(buf))
    }

    fn bump_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buffer = lock(&self.inner);
        let n = buffer.peek(buf);
        buffer.read_pos += n;
        Ok(n)
    }

    fn next_n(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buffer = lock(&self.inner);
        buffer.read_pos = (buffer.read_pos + buf.len()).min(buffer.data.len());
        Ok(buffer.peek(buf))
    }

    fn seek_off(&self, pos: SeekFrom, mode: OpenMode) -> io::Result<u64> {
        let mut buffer = lock(&self.inner);
        let current = if mode.is_read() { buffer.read_pos } else { buffer.write_pos };
        let target = buffer.resolve(pos, current)?;
        if mode.is_read() {
            buffer.read_pos = target;
        }
        if mode.is_write() {
            buffer.write_pos = target;
        }
        Ok(target as u64)
    }

    fn seek_pos(&self, pos: u64, mode: OpenMode) -> io::Result<u64> {
        self.seek_off(SeekFrom::Start(pos), mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_flavours_move_the_cursor_differently() {
        let channel = MemoryChannel::from("abcdefgh");
        let mut buf = [0u8; 3];

        assert_eq!(channel.peek_n(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(channel.in_avail(), 8);

        assert_eq!(channel.bump_n(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(channel.in_avail(), 5);

        // skips "def", then peeks "gh"
        assert_eq!(channel.next_n(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
        assert_eq!(channel.in_avail(), 2);
    }

    #[test]
    fn writes_append_after_initial_data() {
        let channel = MemoryChannel::from("abc");
        assert_eq!(channel.write_n(b"de").unwrap(), 2);
        assert_eq!(&channel.to_bytes()[..], b"abcde");
        assert_eq!(channel.in_avail(), 5);
    }

    #[test]
    fn seek_heads_independently() {
        let channel = MemoryChannel::new();
        channel.write_n(b"hello world").unwrap();

        assert_eq!(channel.seek_off(SeekFrom::Start(6), OpenMode::IN).unwrap(), 6);
        let mut buf = [0u8; 5];
        channel.bump_n(&mut buf).unwrap();
        assert_eq!(&buf, b"world");

        assert_eq!(channel.seek_pos(0, OpenMode::OUT).unwrap(), 0);
        channel.write_n(b"HELLO").unwrap();
        assert_eq!(&channel.to_bytes()[..], b"HELLO world");

        assert_eq!(channel.seek_off(SeekFrom::End(-5), OpenMode::IN).unwrap(), 6);
        assert!(channel.seek_off(SeekFrom::Current(100), OpenMode::IN).is_err());
    }
}
