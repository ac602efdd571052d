use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{InStream, OutStream};
use crate::protocol::HttpError;

/// Block size used when copying between streams.
pub const TRANSFER_CHUNK_SIZE: usize = 16 * 1024;

/// Copies bytes from `source` to `dest` in [`TRANSFER_CHUNK_SIZE`] blocks until
/// the source reads empty or `limit` bytes have moved, then flushes `dest`.
///
/// Cancellation is checked between blocks; a block already being copied is
/// always finished. Returns the number of bytes copied.
pub async fn pump(
    source: &InStream,
    dest: &OutStream,
    limit: Option<u64>,
    cancel: &CancellationToken,
) -> Result<u64, HttpError> {
    let mut block = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(HttpError::TaskCanceled);
        }

        let wanted = match limit {
            Some(limit) => {
                let left = limit - total;
                if left == 0 {
                    break;
                }
                usize::try_from(left).unwrap_or(usize::MAX).min(TRANSFER_CHUNK_SIZE)
            }
            None => TRANSFER_CHUNK_SIZE,
        };

        let read = source.getn(&mut block[..wanted]).await?;
        if read == 0 {
            break;
        }

        let mut written = 0;
        while written < read {
            let n = dest.putn(&block[written..read]).await?;
            if n == 0 {
                return Err(HttpError::io(std::io::ErrorKind::WriteZero));
            }
            written += n;
        }

        total += read as u64;
        trace!(block = read, total, "pumped block");
        tokio::task::yield_now().await;
    }

    dest.sync().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ByteChannel, MemoryChannel, PipeChannel};
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts at most seven bytes per write.
    #[derive(Default)]
    struct Narrow {
        inner: PipeChannel,
        writes: AtomicUsize,
    }

    impl ByteChannel for Narrow {
        fn can_seek(&self) -> bool {
            false
        }

        fn in_avail(&self) -> i64 {
            self.inner.in_avail()
        }

        fn sync(&self) -> io::Result<()> {
            Ok(())
        }

        fn write_n(&self, buf: &[u8]) -> io::Result<usize> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.inner.write_n(&buf[..buf.len().min(7)])
        }

        fn peek_n(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.peek_n(buf)
        }

        fn bump_n(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.bump_n(buf)
        }

        fn next_n(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.next_n(buf)
        }
    }

    #[tokio::test]
    async fn copies_everything_across_blocks() {
        let body: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let source = InStream::from_bytes(body.clone());
        let sink = Arc::new(MemoryChannel::new());
        let dest = OutStream::writer(sink.clone());

        let copied = pump(&source, &dest, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(copied, 40_000);
        assert_eq!(&sink.to_bytes()[..], &body[..]);
    }

    #[tokio::test]
    async fn loops_on_partial_writes() {
        let narrow = Arc::new(Narrow::default());
        let dest = OutStream::writer(narrow.clone());
        let source = InStream::from_bytes("exactly twenty bytes");

        let copied = pump(&source, &dest, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(copied, 20);
        assert_eq!(narrow.writes.load(Ordering::Relaxed), 3);
        assert_eq!(narrow.in_avail(), 20);
    }

    #[tokio::test]
    async fn stops_at_limit() {
        let source = InStream::from_bytes("0123456789");
        let sink = Arc::new(MemoryChannel::new());
        let dest = OutStream::writer(sink.clone());

        let copied = pump(&source, &dest, Some(4), &CancellationToken::new()).await.unwrap();
        assert_eq!(copied, 4);
        assert_eq!(&sink.to_bytes()[..], b"0123");
        assert_eq!(source.in_avail(), 6);
    }

    #[tokio::test]
    async fn canceled_before_first_block() {
        let source = InStream::from_bytes("data");
        let dest = OutStream::writer(Arc::new(MemoryChannel::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pump(&source, &dest, None, &cancel).await.unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(source.in_avail(), 4);
    }
}
