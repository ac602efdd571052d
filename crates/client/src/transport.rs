//! The contract between an exchange and whatever moves bytes over the network.
//!
//! An exchange hands the transport a [`TransportRequest`]: everything needed
//! to send the request, a [`RequestBody`] to pull the request body from, and
//! a [`ResponseSink`] to push the response body into. The transport returns
//! the response head as a [`TransportResponse`] as soon as it has one, and
//! keeps feeding the sink (typically from a spawned task) until the body is
//! complete.
//!
//! Publishing the response's "content ready" marker is the sink's job:
//! [`ResponseSink::finish`], [`ResponseSink::deliver`] and
//! [`ResponseSink::fail`] all publish, and so does dropping a sink that was
//! never finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use micro_rest_http::protocol::{ContentReady, HttpError, HttpHeaders};
use micro_rest_http::stream::{InStream, OpenMode, OutStream, pump};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::ClientConfig;

/// Performs one HTTP exchange.
///
/// Implementations must observe [`TransportRequest::cancel`] at least between
/// network operations, and fail with [`HttpError::TaskCanceled`] when it fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, HttpError>;
}

/// Everything a transport needs to send one request.
#[derive(Debug)]
pub struct TransportRequest {
    /// Absolute URI.
    pub uri: Uri,
    pub method: Method,
    /// Request headers, with the body's transfer strategy already applied.
    pub headers: HttpHeaders,
    pub config: ClientConfig,
    /// Fires when the caller cancels the exchange.
    pub cancel: CancellationToken,
    pub body: Option<RequestBody>,
    pub response_body: ResponseSink,
}

/// The response head, as returned by the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// The reason phrase the server sent, if any.
    pub reason: Option<String>,
    pub headers: HttpHeaders,
}

impl TransportResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status, reason: None, headers: HttpHeaders::new() }
    }
}

/// Producer side of a request body.
#[derive(Debug)]
pub struct RequestBody {
    stream: InStream,
    remaining: Option<u64>,
    declared_length: Option<u64>,
}

impl RequestBody {
    pub fn new(stream: InStream, declared_length: Option<u64>) -> Self {
        Self { stream, remaining: declared_length, declared_length }
    }

    /// The Content-Length of the body, when it was declared.
    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    /// Reads up to `max` bytes. An empty chunk means the body is exhausted.
    ///
    /// Bodies are read without waiting, so a body stream fed by a producer
    /// must be complete before the request is sent.
    pub fn next_chunk(&mut self, max: usize) -> Result<Bytes, HttpError> {
        let want = match self.remaining {
            Some(remaining) => usize::try_from(remaining).map_or(max, |r| r.min(max)),
            None => max,
        };
        if want == 0 {
            return Ok(Bytes::new());
        }

        let mut chunk = vec![0u8; want];
        let n = self.stream.getn(&mut chunk).into_inner()?;
        chunk.truncate(n);
        if let Some(remaining) = &mut self.remaining {
            *remaining -= n as u64;
        }
        Ok(Bytes::from(chunk))
    }

    /// Reads the whole body into memory.
    pub fn read_to_end(&mut self, chunk_size: usize) -> Result<Vec<u8>, HttpError> {
        let mut body = Vec::new();
        loop {
            let chunk = self.next_chunk(chunk_size)?;
            if chunk.is_empty() {
                return Ok(body);
            }
            body.extend_from_slice(&chunk);
        }
    }
}

/// Consumer side of a response body.
///
/// Clones share the same destination. The response becomes readable once
/// one of them finishes, fails, or the last one is dropped.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    inner: Arc<SinkInner>,
}

#[derive(Debug)]
struct SinkInner {
    out: OutStream,
    /// The readable side linked to `out`, if the response body is readable at all.
    reader: Option<InStream>,
    ready: ContentReady,
    written: AtomicU64,
    finished: AtomicBool,
}

impl Drop for SinkInner {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) {
            self.ready.publish(self.written.load(Ordering::Acquire));
        }
    }
}

impl ResponseSink {
    pub fn new(out: OutStream, reader: Option<InStream>, ready: ContentReady) -> Self {
        let inner = SinkInner { out, reader, ready, written: AtomicU64::new(0), finished: AtomicBool::new(false) };
        Self { inner: Arc::new(inner) }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.inner.written.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Appends `bytes` to the response body.
    pub async fn write(&self, mut bytes: &[u8]) -> Result<(), HttpError> {
        while !bytes.is_empty() {
            let n = self.inner.out.putn(bytes).await?;
            if n == 0 {
                return Err(HttpError::io(std::io::ErrorKind::WriteZero));
            }
            self.inner.written.fetch_add(n as u64, Ordering::AcqRel);
            bytes = &bytes[n..];
        }
        Ok(())
    }

    /// Copies a complete body from `stream` (at most `length` bytes, when
    /// given) and finishes the sink.
    pub async fn deliver(
        &self,
        stream: &InStream,
        length: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<u64, HttpError> {
        match pump(stream, &self.inner.out, length, cancel).await {
            Ok(copied) => {
                self.inner.written.fetch_add(copied, Ordering::AcqRel);
                if let Err(e) = self.finish() {
                    self.fail(e.clone());
                    return Err(e);
                }
                Ok(copied)
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Marks the body complete: flushes, then publishes the byte count.
    ///
    /// A failed flush leaves the sink open, so the caller can still
    /// [`fail`](Self::fail) it.
    pub fn finish(&self) -> Result<(), HttpError> {
        if self.is_finished() {
            return Ok(());
        }
        self.inner.out.sync().into_inner()?;
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let written = self.written();
        trace!(written, "response body complete");
        self.inner.ready.publish(written);
        Ok(())
    }

    /// Records `error` on the body streams so extraction surfaces it, then
    /// publishes what was written.
    pub fn fail(&self, error: HttpError) {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(cause = %error, "response body failed");
        // closing only records the error and flushes, a flush failure adds nothing here
        let _ = self.inner.out.close_with_error(OpenMode::OUT, error.clone()).into_inner();
        if let Some(reader) = &self.inner.reader {
            let _ = reader.close_with_error(OpenMode::IN, error).into_inner();
        }
        self.inner.ready.publish(self.written());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_rest_http::stream::producer_consumer;

    fn sink() -> (ResponseSink, InStream, ContentReady) {
        let (reader, out) = producer_consumer();
        let ready = ContentReady::pending();
        (ResponseSink::new(out, Some(reader.clone()), ready.clone()), reader, ready)
    }

    #[tokio::test]
    async fn finish_publishes_written_bytes() {
        let (sink, reader, ready) = sink();
        sink.write(b"hello ").await.unwrap();
        sink.write(b"world").await.unwrap();
        assert_eq!(ready.load(), None);

        sink.finish().unwrap();
        assert_eq!(ready.load(), Some(11));
        assert_eq!(reader.in_avail(), 11);
    }

    #[tokio::test]
    async fn dropping_unfinished_sink_publishes() {
        let (sink, _reader, ready) = sink();
        let clone = sink.clone();
        clone.write(b"abc").await.unwrap();
        drop(sink);
        assert_eq!(ready.load(), None);
        drop(clone);
        assert_eq!(ready.load(), Some(3));
    }

    #[tokio::test]
    async fn failure_reaches_the_reader() {
        let (sink, reader, ready) = sink();
        sink.write(b"partial").await.unwrap();
        sink.fail(HttpError::invalid_body("connection reset"));

        assert_eq!(ready.load(), Some(7));
        assert!(matches!(reader.exception(), Some(HttpError::InvalidBody { .. })));
        assert!(sink.write(b"more").await.is_err());
    }

    #[tokio::test]
    async fn deliver_copies_a_fixed_length_stream() {
        let (sink, reader, ready) = sink();
        let source = InStream::from_bytes("fixed length body and then some");
        let copied = sink.deliver(&source, Some(17), &CancellationToken::new()).await.unwrap();

        assert_eq!(copied, 17);
        assert_eq!(ready.load(), Some(17));
        assert_eq!(reader.in_avail(), 17);
        assert!(sink.is_finished());
    }

    #[test]
    fn request_body_respects_declared_length() {
        let mut body = RequestBody::new(InStream::from_bytes("0123456789"), Some(6));
        assert_eq!(body.next_chunk(4).unwrap(), Bytes::from_static(b"0123"));
        assert_eq!(body.next_chunk(4).unwrap(), Bytes::from_static(b"45"));
        assert!(body.next_chunk(4).unwrap().is_empty());
        assert_eq!(body.declared_length(), Some(6));

        let mut body = RequestBody::new(InStream::from_bytes("streamed"), None);
        assert_eq!(body.read_to_end(3).unwrap(), b"streamed");
    }
}
