use std::fmt;

use bytes::Bytes;
use http::StatusCode;
use micro_rest_http::protocol::constants::default_reason_phrase;
use micro_rest_http::protocol::{ContentReady, HttpError, HttpHeaders, MessageBase};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// An HTTP response: status line, headers and body.
///
/// Responses produced by an exchange become readable once the transport
/// has delivered the whole body; every `extract_*` method waits for that
/// before reading. A response built with [`HttpResponse::new`] is readable
/// immediately.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    reason: Option<String>,
    message: MessageBase,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        let mut message = MessageBase::new();
        message.set_content_ready(ContentReady::ready(0));
        Self { status, reason: None, message }
    }

    /// A response whose body is still arriving through `message`.
    pub(crate) fn from_parts(status: StatusCode, reason: Option<String>, message: MessageBase) -> Self {
        Self { status, reason, message }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The reason phrase the server sent, or the canonical one for the status.
    pub fn reason_phrase(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => default_reason_phrase(self.status),
        }
    }

    pub fn set_reason_phrase(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn headers(&self) -> &HttpHeaders {
        self.message.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        self.message.headers_mut()
    }

    pub fn message(&self) -> &MessageBase {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut MessageBase {
        &mut self.message
    }

    /// Waits until the body is resident and returns its length in bytes.
    pub async fn content_ready(&self) -> u64 {
        self.message.content_ready().wait().await
    }

    pub async fn extract_string(&self, ignore_content_type: bool) -> Result<String, HttpError> {
        self.content_ready().await;
        self.message.extract_string(ignore_content_type)
    }

    pub async fn extract_utf8string(&self, ignore_content_type: bool) -> Result<Bytes, HttpError> {
        self.content_ready().await;
        self.message.extract_utf8string(ignore_content_type)
    }

    pub async fn extract_utf16string(&self, ignore_content_type: bool) -> Result<Vec<u16>, HttpError> {
        self.content_ready().await;
        self.message.extract_utf16string(ignore_content_type)
    }

    pub async fn extract_json(&self, ignore_content_type: bool) -> Result<Value, HttpError> {
        self.content_ready().await;
        self.message.extract_json(ignore_content_type)
    }

    /// Like [`extract_json`](Self::extract_json), deserializing straight into `T`.
    pub async fn extract_json_as<T: DeserializeOwned>(&self, ignore_content_type: bool) -> Result<T, HttpError> {
        self.content_ready().await;
        self.message.extract_json_as(ignore_content_type)
    }

    pub async fn extract_vector(&self) -> Result<Vec<u8>, HttpError> {
        self.content_ready().await;
        self.message.extract_vector()
    }
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.reason_phrase())?;
        f.write_str(&self.message.to_wire_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_rest_http::stream::producer_consumer;
    use std::time::Duration;

    #[tokio::test]
    async fn caller_built_response_is_ready() {
        let mut response = HttpResponse::new(StatusCode::OK);
        assert_eq!(response.content_ready().await, 0);

        response.message_mut().set_body_text("done", None).unwrap();
        assert_eq!(response.content_ready().await, 4);
        assert_eq!(response.extract_string(false).await.unwrap(), "done");
    }

    #[tokio::test]
    async fn extraction_waits_for_delivery() {
        let mut message = MessageBase::new();
        message.headers_mut().set_content_type("application/json").unwrap();
        let (reader, writer) = producer_consumer();
        message.set_instream(reader);
        let ready = message.content_ready().clone();
        let response = HttpResponse::from_parts(StatusCode::OK, None, message);

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.putn(br#"{"id":"#).await.unwrap();
            writer.putn(b"7}").await.unwrap();
            ready.publish(8);
        });

        let json = response.extract_json(false).await.unwrap();
        assert_eq!(json, serde_json::json!({"id": 7}));
        producer.await.unwrap();
    }

    #[test]
    fn renders_status_line_headers_and_body() {
        let mut response = HttpResponse::new(StatusCode::NOT_FOUND);
        response.message_mut().set_body_text("missing", None).unwrap();
        assert_eq!(
            response.to_string(),
            "HTTP/1.1 404 Not Found\r\ncontent-length: 7\r\ncontent-type: text/plain; charset=utf-8\r\n\r\nmissing"
        );

        response.set_reason_phrase("Gone Fishing");
        assert!(response.to_string().starts_with("HTTP/1.1 404 Gone Fishing\r\n"));
    }
}
