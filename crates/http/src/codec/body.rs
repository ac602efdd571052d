//! Body framing: Content-Length, chunked (RFC 9112 section 7.1) and
//! read-until-close.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::{PayloadItem, PayloadSize};
use crate::ensure;
use crate::protocol::{ParseError, SendError};

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_BYTES: usize = 4 * 1024;

/// Writes body pieces with the framing chosen for the request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyEncoder {
    Length { remaining: u64 },
    Chunked { finished: bool },
    Empty,
}

impl BodyEncoder {
    pub(crate) fn new(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(n) => Self::Length { remaining: n },
            PayloadSize::Chunked => Self::Chunked { finished: false },
            PayloadSize::UntilClose | PayloadSize::Empty => Self::Empty,
        }
    }

    /// Whether the body end has been written (or there is no body).
    pub(crate) fn is_finish(&self) -> bool {
        match self {
            Self::Length { remaining } => *remaining == 0,
            Self::Chunked { finished } => *finished,
            Self::Empty => true,
        }
    }
}

impl Encoder<PayloadItem> for BodyEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match (self, item) {
            (Self::Length { remaining }, PayloadItem::Chunk(bytes)) => {
                let len = bytes.len() as u64;
                ensure!(len <= *remaining, SendError::invalid_body("body is longer than its Content-Length"));
                *remaining -= len;
                dst.extend_from_slice(&bytes);
                Ok(())
            }
            (Self::Length { remaining }, PayloadItem::Eof) => {
                ensure!(
                    *remaining == 0,
                    SendError::invalid_body(format!("body ended {remaining} bytes short of its Content-Length"))
                );
                Ok(())
            }

            (Self::Chunked { finished: true }, _) => Err(SendError::invalid_body("chunked body already finished")),
            (Self::Chunked { .. }, PayloadItem::Chunk(bytes)) => {
                // a zero-size chunk would end the body
                if bytes.is_empty() {
                    return Ok(());
                }
                dst.reserve(bytes.len() + 12);
                dst.extend_from_slice(format!("{:X}\r\n", bytes.len()).as_bytes());
                dst.extend_from_slice(&bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            (Self::Chunked { finished }, PayloadItem::Eof) => {
                *finished = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }

            (Self::Empty, PayloadItem::Chunk(bytes)) => {
                ensure!(bytes.is_empty(), SendError::invalid_body("request declared no body"));
                Ok(())
            }
            (Self::Empty, PayloadItem::Eof) => Ok(()),
        }
    }
}

/// Reads a response body according to its [`PayloadSize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyDecoder {
    Length { remaining: u64 },
    Chunked(ChunkedDecoder),
    UntilClose,
    Empty,
}

impl From<PayloadSize> for BodyDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(n) => Self::Length { remaining: n },
            PayloadSize::Chunked => Self::Chunked(ChunkedDecoder::default()),
            PayloadSize::UntilClose => Self::UntilClose,
            PayloadSize::Empty => Self::Empty,
        }
    }
}

impl Decoder for BodyDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::Length { remaining: 0 } | Self::Empty => Ok(Some(PayloadItem::Eof)),
            Self::Length { remaining } => {
                if src.is_empty() {
                    return Ok(None);
                }
                let take = usize::try_from(*remaining).map_or(src.len(), |r| r.min(src.len()));
                *remaining -= take as u64;
                Ok(Some(PayloadItem::Chunk(src.split_to(take).freeze())))
            }
            Self::Chunked(decoder) => decoder.decode(src),
            Self::UntilClose => {
                if src.is_empty() {
                    return Ok(None);
                }
                Ok(Some(PayloadItem::Chunk(src.split().freeze())))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        match self {
            Self::UntilClose => Ok(Some(PayloadItem::Eof)),
            Self::Length { remaining } => {
                Err(ParseError::invalid_body(format!("connection closed {remaining} bytes before the end of the body")))
            }
            _ => Err(ParseError::invalid_body("connection closed in the middle of a chunked body")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ChunkedState {
    #[default]
    SizeLine,
    Data {
        remaining: u64,
    },
    DataEnd,
    Trailers,
    Done,
}

/// Line-oriented chunked body decoder. Chunk extensions and trailers are
/// accepted and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::SizeLine => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "chunk size");
                    self.state = if size == 0 { ChunkedState::Trailers } else { ChunkedState::Data { remaining: size } };
                }
                ChunkedState::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = usize::try_from(remaining).map_or(src.len(), |r| r.min(src.len()));
                    let left = remaining - take as u64;
                    self.state = if left == 0 { ChunkedState::DataEnd } else { ChunkedState::Data { remaining: left } };
                    return Ok(Some(PayloadItem::Chunk(src.split_to(take).freeze())));
                }
                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(src.starts_with(b"\r\n"), ParseError::invalid_body("chunk data is not followed by CRLF"));
                    src.advance(2);
                    self.state = ChunkedState::SizeLine;
                }
                ChunkedState::Trailers => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        trace!("finished reading chunked data");
                        self.state = ChunkedState::Done;
                    }
                }
                ChunkedState::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits off one CRLF-terminated line, without the CRLF.
fn take_line(src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
    match src.windows(2).position(|pair| pair == b"\r\n") {
        Some(end) => {
            let line = src.split_to(end).freeze();
            src.advance(2);
            Ok(Some(line))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let invalid = || ParseError::invalid_body(format!("invalid chunk size line {:?}", String::from_utf8_lossy(line)));

    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    ensure!(!size.is_empty(), invalid());
    let size = std::str::from_utf8(size).map_err(|_e| invalid())?;
    u64::from_str_radix(size, 16).map_err(|_e| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode_all(decoder: &mut impl Decoder<Item = PayloadItem, Error = ParseError>, src: &mut BytesMut) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(item) = decoder.decode(src).unwrap() {
            match item {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => break,
            }
        }
        body
    }

    #[test]
    fn chunked_body_with_extensions_and_trailers() {
        let raw = indoc! {"
            5;name=value\r
            hello\r
            7\r
            , world\r
            0\r
            Expires: never\r
            \r
            next"};
        let mut src = BytesMut::from(raw);
        let mut decoder = ChunkedDecoder::default();

        assert_eq!(decode_all(&mut decoder, &mut src), b"hello, world");
        assert_eq!(&src[..], b"next");
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn chunked_body_arriving_byte_by_byte() {
        let raw = b"A\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::default();
        let mut src = BytesMut::new();
        let mut body = Vec::new();
        let mut finished = false;

        for byte in raw {
            src.extend_from_slice(&[*byte]);
            while let Some(item) = decoder.decode(&mut src).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                    PayloadItem::Eof => {
                        finished = true;
                        break;
                    }
                }
            }
        }

        assert!(finished);
        assert_eq!(body, b"0123456789");
    }

    #[test]
    fn bad_chunk_size_is_rejected() {
        let mut src = BytesMut::from("zz\r\n");
        let err = ChunkedDecoder::default().decode(&mut src).unwrap_err();
        assert!(matches!(err, ParseError::InvalidBody { .. }));

        let mut src = BytesMut::from("3\r\nabcX\r\n");
        let mut decoder = ChunkedDecoder::default();
        assert!(decoder.decode(&mut src).unwrap().is_some());
        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn length_body_stops_at_declared_size() {
        let mut src = BytesMut::from("abcdefgh");
        let mut decoder = BodyDecoder::from(PayloadSize::Length(5));
        assert_eq!(decode_all(&mut decoder, &mut src), b"abcde");
        assert_eq!(&src[..], b"fgh");
    }

    #[test]
    fn truncated_length_body_fails_at_eof() {
        let mut src = BytesMut::from("abc");
        let mut decoder = BodyDecoder::from(PayloadSize::Length(5));
        assert!(decoder.decode_eof(&mut src).unwrap().is_some());
        assert!(matches!(decoder.decode_eof(&mut src).unwrap_err(), ParseError::InvalidBody { .. }));
    }

    #[test]
    fn close_delimited_body_ends_at_eof() {
        let mut src = BytesMut::from("tail");
        let mut decoder = BodyDecoder::from(PayloadSize::UntilClose);
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"tail"))));
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(decoder.decode_eof(&mut src).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn chunked_encoding() {
        let mut encoder = BodyEncoder::new(PayloadSize::Chunked);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello world, hi")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert!(!encoder.is_finish());
        encoder.encode(PayloadItem::Eof, &mut dst).unwrap();
        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"F\r\nhello world, hi\r\n0\r\n\r\n");
    }

    #[test]
    fn length_encoding_enforces_declared_size() {
        let mut encoder = BodyEncoder::new(PayloadSize::Length(4));
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::Eof, &mut dst).is_err());
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"de")), &mut dst).is_err());
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"d")), &mut dst).unwrap();
        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"abcd");
    }
}
