//! Request line and status line handling.
//!
//! Requests heads are written out by [`encode_request_head`]. Response heads
//! are parsed with `httparse` by [`HeadDecoder`], which also decides how the
//! body that follows is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use std::io::{self, Write};

use bytes::{Buf, BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use httparse::Status;
use tracing::{trace, warn};

use super::PayloadSize;
use crate::ensure;
use crate::protocol::{HttpHeaders, ParseError, SendError};

const MAX_HEADER_NUM: usize = 64;

const MAX_HEADER_BYTES: usize = 8 * 1024;

const INIT_HEADER_SIZE: usize = 4 * 1024;

/// What goes on the request line, plus the headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Origin-form target, e.g. `/search?q=rust`.
    pub target: String,
    pub headers: HttpHeaders,
}

/// A parsed status line and header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    /// The reason phrase the server sent, when it sent a non-empty one.
    pub reason: Option<String>,
    pub headers: HttpHeaders,
    pub payload: PayloadSize,
}

/// Writes `head` as an HTTP/1.1 request head, declaring `payload_size` through
/// Content-Length or Transfer-Encoding.
pub(crate) fn encode_request_head(
    mut head: RequestHead,
    payload_size: PayloadSize,
    dst: &mut BytesMut,
) -> Result<(), SendError> {
    dst.reserve(INIT_HEADER_SIZE);
    write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", head.method, head.target)?;

    let headers = &mut head.headers;
    match payload_size {
        PayloadSize::Length(n) => {
            headers.remove(TRANSFER_ENCODING);
            headers.set_content_length(n);
        }
        PayloadSize::Chunked => {
            headers.remove(CONTENT_LENGTH);
            if !is_chunked(headers.get(TRANSFER_ENCODING)) {
                headers.add(TRANSFER_ENCODING, "chunked").map_err(|e| SendError::invalid_body(e.to_string()))?;
            }
        }
        PayloadSize::UntilClose => return Err(SendError::invalid_body("a request body must declare its length")),
        PayloadSize::Empty => {}
    }

    for (name, value) in headers.iter() {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Parses response heads for a request sent with `method`.
///
/// Interim `1xx` responses (other than `101`) are skipped.
#[derive(Debug, Clone)]
pub(crate) struct HeadDecoder {
    method: Method,
}

impl HeadDecoder {
    pub(crate) fn new(method: Method) -> Self {
        Self { method }
    }

    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ResponseHead>, ParseError> {
        loop {
            let Some(head) = self.decode_one(src)? else {
                return Ok(None);
            };
            if head.status.is_informational() && head.status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = head.status.as_u16(), "skipping interim response");
                continue;
            }
            return Ok(Some(head));
        }
    }

    fn decode_one(&self, src: &mut BytesMut) -> Result<Option<ResponseHead>, ParseError> {
        // shortest valid head is "HTTP/1.1 200 \r\n\r\n"
        if src.len() < 17 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut res = httparse::Response::new(&mut headers);
        let parsed = res.parse(&src[..]).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match parsed {
            Status::Complete(offset) => offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };
        trace!(head_size = body_offset, "parsed response head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match res.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(ParseError::InvalidVersion(other)),
        };
        let status = res.code.and_then(|code| StatusCode::from_u16(code).ok()).ok_or(ParseError::InvalidStatus(res.code))?;
        let reason = res.reason.filter(|reason| !reason.is_empty()).map(str::to_owned);

        let mut map = HeaderMap::with_capacity(res.headers.len());
        for header in res.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            map.append(name, value);
        }
        let headers = HttpHeaders::from(map);
        let payload = self.parse_payload(status, &headers)?;

        src.advance(body_offset);
        Ok(Some(ResponseHead { version, status, reason, headers, payload }))
    }

    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length
    fn parse_payload(&self, status: StatusCode, headers: &HttpHeaders) -> Result<PayloadSize, ParseError> {
        if self.method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Ok(PayloadSize::Empty);
        }

        match (headers.get(TRANSFER_ENCODING), headers.get(CONTENT_LENGTH)) {
            (None, None) => Ok(PayloadSize::UntilClose),
            (Some(te), None) if is_chunked(Some(te)) => Ok(PayloadSize::Chunked),
            (Some(te), None) => {
                warn!(transfer_encoding = te, "unframed transfer coding, reading until close");
                Ok(PayloadSize::UntilClose)
            }
            (None, Some(cl)) => cl
                .trim()
                .parse::<u64>()
                .map(PayloadSize::Length)
                .map_err(|_e| ParseError::invalid_content_length(format!("value {cl} is not u64"))),
            (Some(_), Some(_)) => {
                Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
            }
        }
    }
}

/// Whether `chunked` is the final transfer coding.
fn is_chunked(value: Option<&str>) -> bool {
    value
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}
