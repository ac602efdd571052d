use std::fmt;
use std::sync::Arc;

use http::header::{ACCEPT_ENCODING, USER_AGENT};
use http::{Method, Uri};
use micro_rest_http::protocol::HttpError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::exchange::ResponseFuture;
use crate::transport::Transport;
use crate::uri::{verify_uri, with_default_scheme};
use crate::{ClientConfig, HttpRequest, decompress};

const DEFAULT_USER_AGENT: &str = concat!("micro-rest/", env!("CARGO_PKG_VERSION"));

/// Sends requests relative to a base URI through one transport.
#[derive(Clone)]
pub struct HttpClient {
    base: Uri,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient").field("base", &self.base).field("config", &self.config).finish_non_exhaustive()
    }
}

impl HttpClient {
    /// A client for `base_uri` (`http` is assumed when no scheme is given).
    pub fn new(base_uri: &str, transport: Arc<dyn Transport>) -> Result<Self, HttpError> {
        Self::with_config(base_uri, ClientConfig::default(), transport)
    }

    pub fn with_config(base_uri: &str, config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, HttpError> {
        let base = with_default_scheme(base_uri)?;
        verify_uri(&base)?;
        Ok(Self { base, config, transport })
    }

    pub fn base_uri(&self) -> &Uri {
        &self.base
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `request`, resolving its URI against the base URI.
    ///
    /// Calling this again for the same request returns the same future.
    pub fn request(&self, request: &mut HttpRequest) -> Result<ResponseFuture, HttpError> {
        if !request.headers().contains(USER_AGENT) {
            request.headers_mut().set(USER_AGENT, DEFAULT_USER_AGENT)?;
        }
        if self.config.request_compressed_response() && !request.headers().contains(ACCEPT_ENCODING) {
            request.headers_mut().set(ACCEPT_ENCODING, decompress::ACCEPT_ENCODING)?;
        }
        request.bind(self.base.clone(), self.config.clone(), Arc::clone(&self.transport));
        trace!(uri = request.request_uri(), "sending request");
        request.get_response()
    }

    /// Like [`request`](Self::request), canceling the exchange when `token` fires.
    pub fn request_with_cancel(
        &self,
        request: &mut HttpRequest,
        token: CancellationToken,
    ) -> Result<ResponseFuture, HttpError> {
        request.set_cancellation_token(token);
        self.request(request)
    }

    pub fn get(&self, target: &str) -> Result<ResponseFuture, HttpError> {
        self.request(&mut HttpRequest::with_uri(Method::GET, target))
    }

    /// POSTs `body` as JSON.
    pub fn post_json<T: Serialize + ?Sized>(&self, target: &str, body: &T) -> Result<ResponseFuture, HttpError> {
        let mut request = HttpRequest::with_uri(Method::POST, target);
        request.set_body_json(body)?;
        self.request(&mut request)
    }
}
