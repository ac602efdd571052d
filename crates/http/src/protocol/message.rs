//! State shared by requests and responses: headers, body streams and the
//! "content ready" marker.
//!
//! A message's body is read through its input stream ([`InStream`]) and
//! written through its output stream ([`OutStream`]). Bodies set by a caller
//! are input streams; bodies arriving from the network are written by the
//! transport into an output stream that is linked to the input stream the
//! caller later extracts from.
//!
//! The [`ContentReady`] marker tells readers when the whole body is resident.
//! Extraction only happens after it is published, which is what makes the
//! non-blocking drain in [`extract`](super::extract) safe.

use http::header::TRANSFER_ENCODING;
use serde::Serialize;
use tokio::sync::watch;
use tracing::trace;

use super::charset::{Charset, decode_to_string, is_content_type_textual, parse_content_type_and_charset};
use super::{HttpError, HttpHeaders};
use crate::ensure;
use crate::stream::{InStream, OutStream, producer_consumer};

use std::sync::Arc;

/// Length reported when the body will be sent chunked and its size is not known.
pub const UNKNOWN_LENGTH: u64 = u64::MAX;

/// Single-writer, many-reader publication of "this many body bytes are resident".
///
/// Clones share the same cell. Publishing overwrites any previous value and
/// wakes every waiter.
#[derive(Debug, Clone)]
pub struct ContentReady {
    sender: Arc<watch::Sender<Option<u64>>>,
}

impl Default for ContentReady {
    fn default() -> Self {
        Self::pending()
    }
}

impl ContentReady {
    /// A marker nobody has published yet.
    pub fn pending() -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self { sender: Arc::new(sender) }
    }

    /// A marker already published with `length`.
    pub fn ready(length: u64) -> Self {
        let marker = Self::pending();
        marker.publish(length);
        marker
    }

    pub fn publish(&self, length: u64) {
        trace!(length, "content ready");
        self.sender.send_replace(Some(length));
    }

    /// The published length, if any.
    pub fn load(&self) -> Option<u64> {
        *self.sender.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.load().is_some()
    }

    /// Waits until a length is published and returns it.
    pub async fn wait(&self) -> u64 {
        let mut receiver = self.sender.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(length) => (*length).unwrap_or_default(),
            // unreachable while `self` holds the sender
            Err(_closed) => self.load().unwrap_or_default(),
        }
    }
}

/// Headers and body streams common to requests and responses.
///
/// At most one output stream is active: either one the caller supplied, or the
/// internally created half of a producer/consumer pair (see
/// [`prepare_to_receive_data`](Self::prepare_to_receive_data)).
#[derive(Debug, Default)]
pub struct MessageBase {
    headers: HttpHeaders,
    instream: Option<InStream>,
    outstream: Option<OutStream>,
    default_outstream: bool,
    data_available: ContentReady,
}

impl MessageBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn instream(&self) -> Option<&InStream> {
        self.instream.as_ref()
    }

    pub fn outstream(&self) -> Option<&OutStream> {
        self.outstream.as_ref()
    }

    /// Whether the output stream was created by [`prepare_to_receive_data`](Self::prepare_to_receive_data)
    /// rather than supplied by the caller.
    pub fn is_default_outstream(&self) -> bool {
        self.default_outstream
    }

    pub fn content_ready(&self) -> &ContentReady {
        &self.data_available
    }

    /// Replaces the marker, e.g. to share it with whoever delivers the body.
    pub fn set_content_ready(&mut self, marker: ContentReady) {
        self.data_available = marker;
    }

    pub fn set_instream(&mut self, stream: InStream) {
        self.instream = Some(stream);
    }

    pub fn set_outstream(&mut self, stream: OutStream, is_default: bool) {
        self.outstream = Some(stream);
        self.default_outstream = is_default;
    }

    /// Sets the body to read from `stream`.
    ///
    /// The Content-Type is only set when the message has none, and defaults to
    /// `application/octet-stream`. A known `length` becomes the Content-Length
    /// and is published as ready straight away, since the caller vouches for it.
    /// An unknown `length` drops any Content-Length left from a previous body.
    /// On error the message is left as it was.
    pub fn set_body_stream(
        &mut self,
        stream: InStream,
        length: Option<u64>,
        content_type: Option<&str>,
    ) -> Result<(), HttpError> {
        self.set_content_type_if_absent(content_type.unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref()))?;
        match length {
            Some(length) => self.headers.set_content_length(length),
            None => {
                self.headers.remove(http::header::CONTENT_LENGTH);
            }
        }
        self.instream = Some(stream);
        if let Some(length) = length {
            self.data_available.publish(length);
        }
        Ok(())
    }

    /// Sets a UTF-8 text body; Content-Type defaults to `text/plain; charset=utf-8`.
    pub fn set_body_text(&mut self, text: impl Into<String>, content_type: Option<&str>) -> Result<(), HttpError> {
        let content_type = content_type.unwrap_or(mime::TEXT_PLAIN_UTF_8.as_ref());
        self.set_body_bytes(text.into().into_bytes(), Some(content_type))
    }

    /// Sets a body given as UTF-16 code units.
    ///
    /// The text is sent as UTF-8 and `; charset=utf-8` is appended to the
    /// Content-Type (default `text/plain`), so a Content-Type that already
    /// names a charset is rejected.
    pub fn set_body_utf16(&mut self, units: &[u16], content_type: Option<&str>) -> Result<(), HttpError> {
        let content_type = content_type.unwrap_or(mime::TEXT_PLAIN.as_ref());
        ensure!(
            !content_type.to_ascii_lowercase().contains("charset="),
            HttpError::invalid_argument("a utf-16 body is sent as utf-8, the content type must not specify a charset")
        );

        let text = String::from_utf16(units).map_err(|e| HttpError::invalid_argument(e.to_string()))?;
        self.set_body_text(text, Some(&format!("{content_type}; charset=utf-8")))
    }

    /// Serializes `value` as the JSON body; Content-Type defaults to `application/json`.
    pub fn set_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        let body = serde_json::to_vec(value)?;
        self.set_body_bytes(body, Some(mime::APPLICATION_JSON.as_ref()))
    }

    /// Serializes `form` as an `application/x-www-form-urlencoded` body.
    pub fn set_body_form<T: Serialize + ?Sized>(&mut self, form: &T) -> Result<(), HttpError> {
        let body = serde_urlencoded::to_string(form).map_err(|e| HttpError::invalid_argument(e.to_string()))?;
        self.set_body_bytes(body.into_bytes(), Some(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()))
    }

    /// Sets an in-memory body; Content-Type defaults to `application/octet-stream`.
    pub fn set_body_bytes(&mut self, body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Result<(), HttpError> {
        let body = body.into();
        let length = body.len() as u64;
        self.set_body_stream(InStream::from_bytes(body), Some(length), content_type)
    }

    fn set_content_type_if_absent(&mut self, content_type: &str) -> Result<(), HttpError> {
        if !self.headers.contains(http::header::CONTENT_TYPE) {
            self.headers.set_content_type(content_type)?;
        }
        Ok(())
    }

    /// Links a producer/consumer pair as the body, unless an output stream
    /// is already in place. The transport writes into the output half; the
    /// input half becomes the readable body. Returns the output stream in use.
    pub fn prepare_to_receive_data(&mut self) -> OutStream {
        if let Some(outstream) = &self.outstream {
            return outstream.clone();
        }
        let (instream, outstream) = producer_consumer();
        self.set_outstream(outstream.clone(), true);
        self.set_instream(instream);
        outstream
    }

    /// The length the body will be sent with.
    ///
    /// Note: when a body is present and neither Content-Length nor
    /// Transfer-Encoding is set, this adds `Transfer-Encoding: chunked` to
    /// the headers. See [`resolve_content_length`].
    pub fn content_length(&mut self) -> u64 {
        resolve_content_length(&mut self.headers, self.instream.is_some())
    }

    /// Renders the body for diagnostics without consuming it. Only textual
    /// bodies in a known charset are shown.
    pub fn body_preview(&self) -> String {
        let Some(instream) = &self.instream else {
            return String::new();
        };

        let (content, charset) = parse_content_type_and_charset(self.headers.content_type());
        let avail = usize::try_from(instream.in_avail()).unwrap_or_default();
        if !is_content_type_textual(content) || avail == 0 {
            return String::new();
        }
        let Some(charset) = Charset::from_label(charset) else {
            return String::new();
        };

        let mut body = vec![0u8; avail];
        let Ok(n) = instream.peekn(&mut body) else {
            return String::new();
        };
        body.truncate(n);

        match charset {
            Charset::Ascii | Charset::Utf8 => String::from_utf8_lossy(&body).into_owned(),
            _ => decode_to_string(body, charset).unwrap_or_default(),
        }
    }

    /// The header block followed by the body preview, when there is a Content-Type.
    pub fn to_wire_string(&self) -> String {
        let mut rendered = self.headers.to_string();
        if self.headers.contains(http::header::CONTENT_TYPE) {
            rendered.push_str(&self.body_preview());
        }
        rendered
    }
}

/// Decides the transfer strategy of a body and returns its length.
///
/// - no body: `0`
/// - Transfer-Encoding present: [`UNKNOWN_LENGTH`], whatever Content-Length says
/// - Content-Length present: that value
/// - neither: adds `Transfer-Encoding: chunked` and returns [`UNKNOWN_LENGTH`]
///
/// The last case leaves `headers` declaring a chunked transfer.
pub fn resolve_content_length(headers: &mut HttpHeaders, has_body: bool) -> u64 {
    if !has_body {
        return 0;
    }

    if headers.contains(TRANSFER_ENCODING) {
        return UNKNOWN_LENGTH;
    }

    if let Some(length) = headers.content_length() {
        return length;
    }

    // `chunked` is always a valid header value
    let _ = headers.add(TRANSFER_ENCODING, "chunked");
    UNKNOWN_LENGTH
}
