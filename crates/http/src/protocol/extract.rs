//! Charset-aware body extraction.
//!
//! Extraction drains exactly the bytes the body stream reports as available,
//! without waiting for more. Callers that receive a body over the network
//! must wait for the message's [`ContentReady`](super::ContentReady) marker
//! first; the client's request and response types do that for you.
//!
//! Extraction consumes the stream: a second extraction on the same message
//! sees an empty body.
//!
//! Every textual extraction follows the same steps:
//!
//! 1. fail with [`HttpError::StreamWasSetExplicitly`] when there is no body stream
//! 2. fail with the stream's recorded exception, if any
//! 3. pick the charset from the Content-Type (or UTF-8 when the Content-Type
//!    is ignored), returning an empty result for an empty body or a missing
//!    Content-Type
//! 4. check the MIME type, failing with [`HttpError::IncorrectContentType`]
//! 5. drain and transcode

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use super::charset::{
    Charset, decode_to_string, decode_to_utf8, decode_to_utf16, is_content_type_json, is_content_type_textual,
    parse_content_type_and_charset,
};
use super::{HttpError, MessageBase};
use crate::ensure;
use crate::stream::InStream;

impl MessageBase {
    /// Extracts a textual body as a `String`.
    pub fn extract_string(&self, ignore_content_type: bool) -> Result<String, HttpError> {
        let Some((instream, charset)) = self.check_body(ignore_content_type, is_content_type_textual)? else {
            return Ok(String::new());
        };
        decode_to_string(drain(instream)?, charset)
    }

    /// Extracts a textual body transcoded to UTF-8 bytes.
    pub fn extract_utf8string(&self, ignore_content_type: bool) -> Result<Bytes, HttpError> {
        let Some((instream, charset)) = self.check_body(ignore_content_type, is_content_type_textual)? else {
            return Ok(Bytes::new());
        };
        decode_to_utf8(drain(instream)?, charset).map(Bytes::from)
    }

    /// Extracts a textual body as UTF-16 code units, without a byte order mark.
    pub fn extract_utf16string(&self, ignore_content_type: bool) -> Result<Vec<u16>, HttpError> {
        let Some((instream, charset)) = self.check_body(ignore_content_type, is_content_type_textual)? else {
            return Ok(Vec::new());
        };
        decode_to_utf16(drain(instream)?, charset)
    }

    /// Extracts a JSON body. An empty body is `null`.
    pub fn extract_json(&self, ignore_content_type: bool) -> Result<Value, HttpError> {
        let Some(body) = self.json_body(ignore_content_type)? else {
            return Ok(Value::Null);
        };
        Ok(serde_json::from_slice(&body)?)
    }

    /// Extracts a JSON body straight into `T`. An empty body deserializes from `null`.
    pub fn extract_json_as<T: DeserializeOwned>(&self, ignore_content_type: bool) -> Result<T, HttpError> {
        match self.json_body(ignore_content_type)? {
            Some(body) => Ok(serde_json::from_slice(&body)?),
            None => Ok(serde_json::from_value(Value::Null)?),
        }
    }

    /// Extracts the raw body bytes. The Content-Type is not consulted.
    pub fn extract_vector(&self) -> Result<Vec<u8>, HttpError> {
        let instream = self.readable_instream()?;
        drain(instream)
    }

    fn json_body(&self, ignore_content_type: bool) -> Result<Option<Vec<u8>>, HttpError> {
        let Some((instream, charset)) = self.check_body(ignore_content_type, is_content_type_json)? else {
            return Ok(None);
        };
        let body = decode_to_utf8(drain(instream)?, charset)?;
        Ok((!body.is_empty()).then_some(body))
    }

    fn readable_instream(&self) -> Result<&InStream, HttpError> {
        let instream = self.instream().ok_or(HttpError::StreamWasSetExplicitly)?;
        if let Some(error) = instream.exception() {
            return Err(error);
        }
        Ok(instream)
    }

    /// Runs steps 1 to 4. `None` means the result is empty.
    fn check_body(
        &self,
        ignore_content_type: bool,
        check_content_type: fn(&str) -> bool,
    ) -> Result<Option<(&InStream, Charset)>, HttpError> {
        let instream = self.readable_instream()?;
        if ignore_content_type {
            return Ok(Some((instream, Charset::Utf8)));
        }

        let (content, charset) = parse_content_type_and_charset(self.headers().content_type());
        if content.is_empty() || instream.in_avail() == 0 {
            return Ok(None);
        }
        ensure!(check_content_type(content), HttpError::IncorrectContentType);

        let charset = charset.parse::<Charset>()?;
        Ok(Some((instream, charset)))
    }
}

/// Reads everything the stream currently holds.
fn drain(instream: &InStream) -> Result<Vec<u8>, HttpError> {
    let avail = usize::try_from(instream.in_avail()).unwrap_or_default();
    let mut body = vec![0u8; avail];
    let mut filled = 0;
    while filled < avail {
        let n = instream.getn(&mut body[filled..]).into_inner()?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    body.truncate(filled);
    trace!(len = filled, "drained body");
    Ok(body)
}
