//! Transparent decompression of `Content-Encoding` response bodies.

use std::io::{self, Write};

use bytes::{Bytes, BytesMut};
use flate2::write::{GzDecoder, ZlibDecoder};
use tracing::trace;
use zstd::stream::write::Decoder as ZstdDecoder;

/// Value sent in `Accept-Encoding` when compressed responses are requested.
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";

struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streaming decoder for one response body.
pub(crate) enum Decompressor {
    Gzip(GzDecoder<Writer>),
    Deflate(ZlibDecoder<Writer>),
    Zstd(ZstdDecoder<'static, Writer>),
    Br(Box<brotli::DecompressorWriter<Writer>>),
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gzip(_) => "gzip",
            Self::Deflate(_) => "deflate",
            Self::Zstd(_) => "zstd",
            Self::Br(_) => "br",
        };
        f.debug_tuple("Decompressor").field(&name).finish()
    }
}

impl Decompressor {
    /// The decoder for a `Content-Encoding` value, or `None` for `identity`
    /// and codings this client does not handle.
    pub(crate) fn for_content_encoding(encoding: &str) -> io::Result<Option<Self>> {
        let decompressor = match encoding.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Self::Gzip(GzDecoder::new(Writer::new())),
            "deflate" => Self::Deflate(ZlibDecoder::new(Writer::new())),
            "zstd" => Self::Zstd(ZstdDecoder::new(Writer::new())?),
            "br" => Self::Br(Box::new(brotli::DecompressorWriter::new(Writer::new(), 32 * 1024))),
            _ => return Ok(None),
        };
        Ok(Some(decompressor))
    }

    /// Feeds compressed bytes and returns whatever has been decoded so far.
    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<Bytes> {
        let result = match self {
            Self::Gzip(decoder) => decoder.write_all(data).and_then(|()| decoder.flush()),
            Self::Deflate(decoder) => decoder.write_all(data).and_then(|()| decoder.flush()),
            Self::Zstd(decoder) => decoder.write_all(data).and_then(|()| decoder.flush()),
            Self::Br(decoder) => decoder.write_all(data).and_then(|()| decoder.flush()),
        };
        if let Err(e) = result {
            trace!(cause = %e, "failed to decode response body");
            return Err(e);
        }
        Ok(self.take())
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(decoder) => decoder.get_mut().take(),
            Self::Deflate(decoder) => decoder.get_mut().take(),
            Self::Zstd(decoder) => decoder.get_mut().take(),
            Self::Br(decoder) => decoder.get_mut().take(),
        }
    }

    /// Ends the stream, returning the last decoded bytes. Fails on a
    /// truncated stream.
    pub(crate) fn finish(self) -> io::Result<Bytes> {
        let mut writer = match self {
            Self::Gzip(decoder) => decoder.finish()?,
            Self::Deflate(decoder) => decoder.finish()?,
            Self::Zstd(mut decoder) => {
                decoder.flush()?;
                decoder.into_inner()
            }
            Self::Br(decoder) => decoder
                .into_inner()
                .map_err(|_partial| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated brotli stream"))?,
        };
        Ok(writer.take())
    }
}
