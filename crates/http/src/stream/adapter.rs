//! The asynchronous stream surface over a [`ByteChannel`].
//!
//! [`StreamAdapter`] is what messages hold as their input and output bodies.
//! It adds open/close bookkeeping, exception propagation and element scaling
//! on top of a channel, and exposes both "async" primitives (returning
//! already-completed futures) and synchronous peeks.
//!
//! Every async primitive runs the channel operation immediately and wraps the
//! outcome in [`futures::future::Ready`]. Channels are non-blocking by
//! contract, so there is nothing to wait for at this level.
//!
//! Element scaling: an adapter over `u16` reads and writes whole 2-byte
//! elements (little-endian), so counts handed to the channel are
//! `elements * T::SIZE` and counts returned are divided back.

use std::fmt;
use std::io::SeekFrom;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use futures::future::{Ready, ready};

use super::channel::{ByteChannel, OpenMode, StreamSize};
use super::lock;
use crate::ensure;
use crate::protocol::HttpError;

/// A unit a stream is read and written in.
pub trait StreamElement: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// Width in bytes.
    const SIZE: usize;

    /// Appends the wire form of `elements` to `out`.
    fn encode(elements: &[Self], out: &mut Vec<u8>);

    /// Fills `out` from whole elements found in `bytes`.
    fn decode(bytes: &[u8], out: &mut [Self]);

    /// Direct byte view, when the element type is already a byte.
    fn as_bytes(elements: &[Self]) -> Option<&[u8]>;

    fn as_bytes_mut(elements: &mut [Self]) -> Option<&mut [u8]>;
}

impl StreamElement for u8 {
    const SIZE: usize = 1;

    fn encode(elements: &[Self], out: &mut Vec<u8>) {
        out.extend_from_slice(elements);
    }

    fn decode(bytes: &[u8], out: &mut [Self]) {
        out[..bytes.len()].copy_from_slice(bytes);
    }

    fn as_bytes(elements: &[Self]) -> Option<&[u8]> {
        Some(elements)
    }

    fn as_bytes_mut(elements: &mut [Self]) -> Option<&mut [u8]> {
        Some(elements)
    }
}

impl StreamElement for u16 {
    const SIZE: usize = 2;

    fn encode(elements: &[Self], out: &mut Vec<u8>) {
        out.reserve(elements.len() * Self::SIZE);
        for unit in elements {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }

    fn decode(bytes: &[u8], out: &mut [Self]) {
        for (unit, pair) in out.iter_mut().zip(bytes.chunks_exact(Self::SIZE)) {
            *unit = u16::from_le_bytes([pair[0], pair[1]]);
        }
    }

    fn as_bytes(_elements: &[Self]) -> Option<&[u8]> {
        None
    }

    fn as_bytes_mut(_elements: &mut [Self]) -> Option<&mut [u8]> {
        None
    }
}

/// A byte input stream, as held by a message body.
pub type InStream = StreamAdapter<u8>;

/// A byte output stream.
pub type OutStream = StreamAdapter<u8>;

/// Asynchronous stream handle over a shared [`ByteChannel`].
///
/// Clones share the channel and the open/closed/exception state.
pub struct StreamAdapter<T = u8> {
    shared: Arc<Shared>,
    _element: PhantomData<fn() -> T>,
}

struct Shared {
    channel: Arc<dyn ByteChannel>,
    state: Mutex<AdapterState>,
}

#[derive(Debug)]
struct AdapterState {
    readable: bool,
    writable: bool,
    exception: Option<HttpError>,
}

impl<T> Clone for StreamAdapter<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), _element: PhantomData }
    }
}

impl<T> fmt::Debug for StreamAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("StreamAdapter")
            .field("readable", &state.readable)
            .field("writable", &state.writable)
            .field("exception", &state.exception)
            .finish_non_exhaustive()
    }
}

impl InStream {
    /// An input stream over an in-memory copy of `data`.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::reader(Arc::new(super::MemoryChannel::with_data(data)))
    }
}

impl<T: StreamElement> StreamAdapter<T> {
    pub fn new(channel: Arc<dyn ByteChannel>, mode: OpenMode) -> Self {
        let state = AdapterState { readable: mode.is_read(), writable: mode.is_write(), exception: None };
        Self { shared: Arc::new(Shared { channel, state: Mutex::new(state) }), _element: PhantomData }
    }

    /// An adapter open for reading only.
    pub fn reader(channel: Arc<dyn ByteChannel>) -> Self {
        Self::new(channel, OpenMode::IN)
    }

    /// An adapter open for writing only.
    pub fn writer(channel: Arc<dyn ByteChannel>) -> Self {
        Self::new(channel, OpenMode::OUT)
    }

    pub fn channel(&self) -> &Arc<dyn ByteChannel> {
        &self.shared.channel
    }

    /// Whether both handles point at the same adapter state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_open(&self) -> bool {
        let state = lock(&self.shared.state);
        state.readable || state.writable
    }

    pub fn can_read(&self) -> bool {
        lock(&self.shared.state).readable
    }

    pub fn can_write(&self) -> bool {
        lock(&self.shared.state).writable
    }

    pub fn can_seek(&self) -> bool {
        self.shared.channel.can_seek()
    }

    /// Size is only knowable on media that can seek.
    pub fn has_size(&self) -> bool {
        self.can_seek()
    }

    /// The adapter keeps no buffer of its own.
    pub fn buffer_size(&self, _mode: OpenMode) -> usize {
        0
    }

    /// Accepted and ignored; see [`buffer_size`](Self::buffer_size).
    pub fn set_buffer_size(&self, _size: usize, _mode: OpenMode) {}

    /// Elements readable without blocking, as reported by the channel.
    pub fn in_avail(&self) -> StreamSize {
        if !self.can_read() {
            return 0;
        }
        self.shared.channel.in_avail().max(0) / elem_size::<T>()
    }

    /// The error the stream was closed with, if any.
    pub fn exception(&self) -> Option<HttpError> {
        lock(&self.shared.state).exception.clone()
    }

    /// Closes the directions selected by `mode`, flushing first if the write
    /// side was open.
    pub fn close(&self, mode: OpenMode) -> Ready<Result<(), HttpError>> {
        ready(self.close_now(mode))
    }

    /// Records `error` (the first recorded error wins) and closes `mode`.
    pub fn close_with_error(&self, mode: OpenMode, error: HttpError) -> Ready<Result<(), HttpError>> {
        lock(&self.shared.state).exception.get_or_insert(error);
        ready(self.close_now(mode))
    }

    fn close_now(&self, mode: OpenMode) -> Result<(), HttpError> {
        let flush = {
            let mut state = lock(&self.shared.state);
            let flush = mode.is_write() && state.writable;
            if mode.is_write() {
                state.writable = false;
            }
            if mode.is_read() {
                state.readable = false;
            }
            flush
        };

        if flush {
            self.shared.channel.sync()?;
        }
        Ok(())
    }

    fn ensure_readable(&self) -> Result<(), HttpError> {
        let state = lock(&self.shared.state);
        if state.readable {
            return Ok(());
        }
        Err(state.exception.clone().unwrap_or(HttpError::StreamClosed { direction: "read" }))
    }

    fn ensure_writable(&self) -> Result<(), HttpError> {
        let state = lock(&self.shared.state);
        if state.writable {
            return Ok(());
        }
        Err(state.exception.clone().unwrap_or(HttpError::StreamClosed { direction: "write" }))
    }

    /// Writes as many whole elements as the channel accepts.
    pub fn putn(&self, elements: &[T]) -> Ready<Result<usize, HttpError>> {
        ready(self.write_elements(elements))
    }

    /// Writes one element, yielding it back when it was accepted.
    pub fn putc(&self, element: T) -> Ready<Result<Option<T>, HttpError>> {
        ready(self.write_elements(&[element]).map(|n| (n == 1).then_some(element)))
    }

    /// Reads up to `buf.len()` elements and advances past them.
    pub fn getn(&self, buf: &mut [T]) -> Ready<Result<usize, HttpError>> {
        ready(self.read_elements(buf, true))
    }

    /// Reads one element and advances past it.
    pub fn bumpc(&self) -> Ready<Result<Option<T>, HttpError>> {
        ready(self.sbumpc())
    }

    /// Reads one element without advancing.
    pub fn getc(&self) -> Ready<Result<Option<T>, HttpError>> {
        ready(self.sgetc())
    }

    /// Advances one element, then reads the element now under the cursor.
    pub fn nextc(&self) -> Ready<Result<Option<T>, HttpError>> {
        ready(self.next_element())
    }

    /// Putting an element back requires a local buffer the adapter does not have.
    pub fn ungetc(&self) -> Ready<Result<Option<T>, HttpError>> {
        ready(Err(HttpError::not_implemented("ungetc")))
    }

    pub fn sync(&self) -> Ready<Result<(), HttpError>> {
        ready(self.ensure_writable().and_then(|()| self.shared.channel.sync().map_err(HttpError::from)))
    }

    /// Synchronous read-and-advance of one element.
    pub fn sbumpc(&self) -> Result<Option<T>, HttpError> {
        let mut element = [T::default()];
        let n = self.read_elements(&mut element, true)?;
        Ok((n == 1).then_some(element[0]))
    }

    /// Synchronous peek of one element.
    pub fn sgetc(&self) -> Result<Option<T>, HttpError> {
        let mut element = [T::default()];
        let n = self.read_elements(&mut element, false)?;
        Ok((n == 1).then_some(element[0]))
    }

    /// Synchronous peek of up to `buf.len()` elements. Never advances.
    pub fn peekn(&self, buf: &mut [T]) -> Result<usize, HttpError> {
        self.read_elements(buf, false)
    }

    /// Current position of the head selected by `mode`, in elements.
    pub fn getpos(&self, mode: OpenMode) -> Result<u64, HttpError> {
        self.seekoff(SeekFrom::Current(0), mode)
    }

    /// Moves to an absolute element position.
    pub fn seekpos(&self, pos: u64, mode: OpenMode) -> Result<u64, HttpError> {
        let width = elem_size::<T>().unsigned_abs();
        let scaled = pos.checked_mul(width).ok_or_else(seek_overflow)?;
        let bytes = self.shared.channel.seek_pos(scaled, mode)?;
        Ok(bytes / width)
    }

    /// Moves by an element offset; the offset is scaled to bytes for the channel.
    pub fn seekoff(&self, offset: SeekFrom, mode: OpenMode) -> Result<u64, HttpError> {
        let width = elem_size::<T>();
        let scaled = match offset {
            SeekFrom::Start(n) => n.checked_mul(width.unsigned_abs()).map(SeekFrom::Start),
            SeekFrom::End(n) => n.checked_mul(width).map(SeekFrom::End),
            SeekFrom::Current(n) => n.checked_mul(width).map(SeekFrom::Current),
        };
        let bytes = self.shared.channel.seek_off(scaled.ok_or_else(seek_overflow)?, mode)?;
        Ok(bytes / width.unsigned_abs())
    }

    /// Total length in elements, measured by seeking the read head to the end
    /// and back.
    pub fn size(&self) -> Result<u64, HttpError> {
        ensure!(self.has_size(), HttpError::not_implemented("size"));
        let channel = &self.shared.channel;
        let current = channel.seek_off(SeekFrom::Current(0), OpenMode::IN)?;
        let end = channel.seek_off(SeekFrom::End(0), OpenMode::IN)?;
        channel.seek_pos(current, OpenMode::IN)?;
        Ok(end / elem_size::<T>().unsigned_abs())
    }

    /// No contiguous read window is ever exposed.
    pub fn acquire(&self, _count: usize) -> Option<&[T]> {
        None
    }

    pub fn release(&self, _count: usize) -> Result<(), HttpError> {
        Err(HttpError::not_implemented("release"))
    }

    /// No contiguous write window is ever exposed.
    pub fn alloc(&mut self, _count: usize) -> Option<&mut [T]> {
        None
    }

    pub fn commit(&self, _count: usize) -> Result<(), HttpError> {
        Err(HttpError::not_implemented("commit"))
    }

    fn write_elements(&self, elements: &[T]) -> Result<usize, HttpError> {
        self.ensure_writable()?;
        if elements.is_empty() {
            return Ok(0);
        }

        let written = match T::as_bytes(elements) {
            Some(bytes) => self.shared.channel.write_n(bytes)?,
            None => {
                let mut bytes = Vec::with_capacity(elements.len() * T::SIZE);
                T::encode(elements, &mut bytes);
                self.shared.channel.write_n(&bytes)?
            }
        };
        Ok(written / T::SIZE)
    }

    fn read_elements(&self, buf: &mut [T], advance: bool) -> Result<usize, HttpError> {
        self.ensure_readable()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let channel = &self.shared.channel;
        if let Some(bytes) = T::as_bytes_mut(buf) {
            let n = if advance { channel.bump_n(bytes)? } else { channel.peek_n(bytes)? };
            return Ok(n);
        }

        // only whole elements are consumed; a trailing partial element stays in the channel
        let mut bytes = vec![0u8; buf.len() * T::SIZE];
        let peeked = channel.peek_n(&mut bytes)?;
        let whole = peeked - peeked % T::SIZE;
        let read = if advance { channel.bump_n(&mut bytes[..whole])? } else { whole };
        T::decode(&bytes[..read], buf);
        Ok(read / T::SIZE)
    }

    fn next_element(&self) -> Result<Option<T>, HttpError> {
        self.ensure_readable()?;
        let mut bytes = vec![0u8; T::SIZE];
        let n = self.shared.channel.next_n(&mut bytes)?;
        if n < T::SIZE {
            return Ok(None);
        }
        let mut element = [T::default()];
        T::decode(&bytes, &mut element);
        Ok(Some(element[0]))
    }
}

#[inline]
fn seek_overflow() -> HttpError {
    HttpError::io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek position overflows the byte offset"))
}

fn elem_size<T: StreamElement>() -> i64 {
    // element widths are 1 or 2
    T::SIZE as i64
}
