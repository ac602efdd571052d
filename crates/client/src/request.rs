use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Uri};
use micro_rest_http::protocol::{HttpError, HttpHeaders, MessageBase, UNKNOWN_LENGTH};
use micro_rest_http::stream::OutStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::exchange::{Dispatch, Exchange, ExchangeState, ResponseFuture};
use crate::transport::{RequestBody, Transport};
use crate::uri::{request_target, resolve, verify_uri};
use crate::ClientConfig;

/// An outgoing HTTP request.
///
/// Headers and body are freely editable until [`get_response`](Self::get_response)
/// is first called. From then on they are treated as sent: later edits are
/// not seen by the transport.
pub struct HttpRequest {
    method: Option<Method>,
    uri: String,
    base: Option<Uri>,
    message: MessageBase,
    config: ClientConfig,
    cancel: CancellationToken,
    response_stream: Option<OutStream>,
    transport: Option<Arc<dyn Transport>>,
    exchange: Arc<Exchange>,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("base", &self.base)
            .field("message", &self.message)
            .field("state", &self.exchange.state())
            .finish_non_exhaustive()
    }
}

impl Default for HttpRequest {
    /// A request with no method, which cannot be sent until one is set.
    fn default() -> Self {
        Self {
            method: None,
            uri: String::new(),
            base: None,
            message: MessageBase::new(),
            config: ClientConfig::default(),
            cancel: CancellationToken::new(),
            response_stream: None,
            transport: None,
            exchange: Arc::new(Exchange::new()),
        }
    }
}

impl HttpRequest {
    pub fn new(method: Method) -> Self {
        Self { method: Some(method), ..Self::default() }
    }

    /// A request for `uri`, which is resolved against the client's base URI
    /// when sent through a client, and must be absolute otherwise.
    pub fn with_uri(method: Method, uri: impl Into<String>) -> Self {
        Self { method: Some(method), uri: uri.into(), ..Self::default() }
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = Some(method);
    }

    pub fn request_uri(&self) -> &str {
        &self.uri
    }

    pub fn set_request_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    /// The URI the request is sent to.
    pub fn absolute_uri(&self) -> Result<Uri, HttpError> {
        let uri = match &self.base {
            Some(base) => resolve(base, &self.uri)?,
            None => self.uri.parse().map_err(HttpError::invalid_argument)?,
        };
        verify_uri(&uri)?;
        Ok(uri)
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

    pub fn set_body_text(&mut self, text: impl Into<String>, content_type: Option<&str>) -> Result<(), HttpError> {
        self.message.set_body_text(text, content_type)
    }

    pub fn set_body_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        self.message.set_body_json(value)
    }

    pub fn set_body_bytes(&mut self, body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Result<(), HttpError> {
        self.message.set_body_bytes(body, content_type)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ClientConfig) {
        self.config = config;
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels the exchange when `token` is canceled.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Sends the response body to `stream` instead of keeping it for extraction.
    pub fn set_response_stream(&mut self, stream: OutStream) {
        self.response_stream = Some(stream);
    }

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Attaches what a client supplies: base URI, config and transport.
    pub(crate) fn bind(&mut self, base: Uri, config: ClientConfig, transport: Arc<dyn Transport>) {
        self.base = Some(base);
        self.config = config;
        self.transport = Some(transport);
    }

    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
    }

    /// The exchange this request is part of.
    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    /// Sends the request, or returns the future of the send already under way.
    ///
    /// The transport is invoked at most once per request. Fails without
    /// invoking it when the method is unset, the cancellation token has
    /// already fired, no transport is bound, the URI is invalid, or there is
    /// no tokio runtime.
    ///
    /// Determining the body's length may add `Transfer-Encoding: chunked` to
    /// the headers, see [`MessageBase::content_length`].
    pub fn get_response(&mut self) -> Result<ResponseFuture, HttpError> {
        let Some(method) = self.method.clone() else {
            return Err(HttpError::invalid_argument("request method must not be empty"));
        };
        if let Some(future) = self.exchange.response_future() {
            return Ok(future);
        }
        if self.cancel.is_cancelled() {
            debug!(%method, uri = %self.uri, "request canceled before it was sent");
            return Err(HttpError::TaskCanceled);
        }

        let exchange = Arc::clone(&self.exchange);
        exchange.start(|| {
            let transport = self.transport.clone().ok_or_else(|| HttpError::invalid_argument("no transport is bound to the request"))?;
            let uri = self.absolute_uri()?;

            let length = self.message.content_length();
            let body = self
                .message
                .instream()
                .map(|stream| RequestBody::new(stream.clone(), (length != UNKNOWN_LENGTH).then_some(length)));

            Ok(Dispatch {
                uri,
                method,
                headers: self.message.headers().clone(),
                config: self.config.clone(),
                cancel: self.cancel.child_token(),
                body,
                response_stream: self.response_stream.clone(),
                transport,
            })
        })
    }

    /// Waits for the response, then reports the length of this request's body.
    pub async fn content_ready(&mut self) -> Result<u64, HttpError> {
        self.get_response()?.await?;
        Ok(self.message.content_ready().load().unwrap_or_default())
    }

    pub fn extract_string(&self, ignore_content_type: bool) -> Result<String, HttpError> {
        self.message.extract_string(ignore_content_type)
    }

    pub fn extract_utf8string(&self, ignore_content_type: bool) -> Result<Bytes, HttpError> {
        self.message.extract_utf8string(ignore_content_type)
    }

    pub fn extract_utf16string(&self, ignore_content_type: bool) -> Result<Vec<u16>, HttpError> {
        self.message.extract_utf16string(ignore_content_type)
    }

    pub fn extract_json(&self, ignore_content_type: bool) -> Result<Value, HttpError> {
        self.message.extract_json(ignore_content_type)
    }

    pub fn extract_json_as<T: DeserializeOwned>(&self, ignore_content_type: bool) -> Result<T, HttpError> {
        self.message.extract_json_as(ignore_content_type)
    }

    pub fn extract_vector(&self) -> Result<Vec<u8>, HttpError> {
        self.message.extract_vector()
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method.as_ref().map_or("", Method::as_str);
        let target = match self.absolute_uri() {
            Ok(uri) => request_target(&uri).to_owned(),
            Err(_) => self.uri.clone(),
        };
        write!(f, "{method} {target} HTTP/1.1\r\n")?;
        f.write_str(&self.message.to_wire_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportResponse};
    use http::StatusCode;
    use http::header::TRANSFER_ENCODING;
    use micro_rest_http::stream::InStream;

    fn answering(status: StatusCode) -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(move |request| {
            request.response_body.finish()?;
            Ok(TransportResponse::new(status))
        });
        transport
    }

    #[tokio::test]
    async fn second_call_reuses_the_exchange() {
        let mut request = HttpRequest::with_uri(Method::GET, "http://example.com/ping");
        request.set_transport(Arc::new(answering(StatusCode::OK)));

        let first = request.get_response().unwrap();
        let second = request.get_response().unwrap();

        let (a, b) = futures::join!(first, second);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(request.state(), ExchangeState::Completed);
        // a third call after completion still hands back the same response
        assert_eq!(request.get_response().unwrap().await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn canceled_token_fails_without_a_transport_call() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(0);

        let mut request = HttpRequest::with_uri(Method::GET, "http://example.com/");
        request.set_transport(Arc::new(transport));
        let token = CancellationToken::new();
        token.cancel();
        request.set_cancellation_token(token);

        assert!(request.get_response().unwrap_err().is_canceled());
        assert_eq!(request.state(), ExchangeState::Unsent);
        assert!(request.exchange().response_future().is_none());
    }

    #[tokio::test]
    async fn missing_method_fails_before_anything_else() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(0);

        let mut request = HttpRequest::default();
        request.set_request_uri("http://example.com/");
        request.set_transport(Arc::new(transport));

        let err = request.get_response().unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument { .. }));
        assert_eq!(request.state(), ExchangeState::Unsent);
    }

    #[tokio::test]
    async fn invalid_uri_or_missing_transport_is_rejected() {
        let mut request = HttpRequest::with_uri(Method::GET, "http://example.com/");
        assert!(matches!(request.get_response().unwrap_err(), HttpError::InvalidArgument { .. }));

        let mut transport = MockTransport::new();
        transport.expect_execute().times(0);
        let mut request = HttpRequest::with_uri(Method::GET, "ftp://example.com/");
        request.set_transport(Arc::new(transport));
        assert!(matches!(request.get_response().unwrap_err(), HttpError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn transport_sees_the_effective_transfer_strategy() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(|mut request| {
            assert_eq!(request.headers.get(TRANSFER_ENCODING), Some("chunked"));
            let body = request.body.as_mut().unwrap();
            assert_eq!(body.declared_length(), None);
            assert_eq!(body.read_to_end(4).unwrap(), b"streamed body");
            request.response_body.finish()?;
            Ok(TransportResponse::new(StatusCode::NO_CONTENT))
        });

        let mut request = HttpRequest::with_uri(Method::POST, "http://example.com/upload");
        request.message_mut().set_body_stream(InStream::from_bytes("streamed body"), None, None).unwrap();
        request.set_transport(Arc::new(transport));

        let response = request.get_response().unwrap().await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(request.headers().get(TRANSFER_ENCODING), Some("chunked"));
    }

    #[tokio::test]
    async fn content_ready_reports_the_request_body() {
        let mut request = HttpRequest::with_uri(Method::PUT, "http://example.com/doc");
        request.set_body_text("twelve bytes", None).unwrap();
        request.set_transport(Arc::new(answering(StatusCode::OK)));

        assert_eq!(request.content_ready().await.unwrap(), 12);
    }

    #[test]
    fn renders_request_line_and_body() {
        let mut request = HttpRequest::with_uri(Method::POST, "http://example.com/notes?draft=1");
        request.set_body_json(&serde_json::json!({"title": "x"})).unwrap();
        assert_eq!(
            request.to_string(),
            "POST /notes?draft=1 HTTP/1.1\r\ncontent-length: 13\r\ncontent-type: application/json\r\n\r\n{\"title\":\"x\"}"
        );
        assert_eq!(request.extract_json(false).unwrap(), serde_json::json!({"title": "x"}));
    }
}
