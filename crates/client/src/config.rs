//! Client configuration.
//!
//! [`ClientConfig`] is a plain value object: the client copies it into every
//! request it sends, and transports only read it.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose;
use http::Uri;

/// Chunk size used when the configured one is `0`.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A username and password. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The `Authorization` value for the Basic scheme (RFC 7617).
    pub fn basic_authorization(&self) -> String {
        let encoded = general_purpose::STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// Which proxy, if any, requests go through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WebProxy {
    /// Whatever the platform is configured with.
    #[default]
    UseDefault,
    AutoDiscovery,
    Disabled,
    Uri { address: Uri, credentials: Option<Credentials> },
}

impl WebProxy {
    pub fn from_uri(address: Uri) -> Self {
        Self::Uri { address, credentials: None }
    }

    /// Attaches credentials; only an explicit proxy address can carry them.
    #[must_use]
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        match self {
            Self::Uri { address, .. } => Self::Uri { address, credentials: Some(credentials) },
            other => other,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Uri { credentials, .. } => credentials.as_ref(),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// A client certificate, identified by its thumbprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub thumbprint: String,
    /// Looked up in the user's certificate store rather than the machine's.
    pub user_store: bool,
}

/// Settings copied into each outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    timeout: Duration,
    proxy: WebProxy,
    credentials: Option<Credentials>,
    request_compressed_response: bool,
    buffer_request: bool,
    chunk_size: usize,
    validate_certificates: bool,
    client_certificates: Vec<ClientCertificate>,
    guarantee_order: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            proxy: WebProxy::default(),
            credentials: None,
            request_compressed_response: false,
            buffer_request: false,
            chunk_size: 0,
            validate_certificates: true,
            client_certificates: Vec::new(),
            guarantee_order: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on the whole exchange, up to the response head.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn proxy(&self) -> &WebProxy {
        &self.proxy
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Whether to ask for a compressed response and decompress it transparently.
    pub fn request_compressed_response(&self) -> bool {
        self.request_compressed_response
    }

    /// Whether the request body is buffered and sent with a Content-Length
    /// instead of streamed.
    pub fn buffer_request(&self) -> bool {
        self.buffer_request
    }

    /// Block size for body transfers, with `0` meaning [`DEFAULT_CHUNK_SIZE`].
    pub fn chunk_size(&self) -> usize {
        match self.chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        }
    }

    pub fn validate_certificates(&self) -> bool {
        self.validate_certificates
    }

    pub fn client_certificates(&self) -> &[ClientCertificate] {
        &self.client_certificates
    }

    pub fn guarantee_order(&self) -> bool {
        self.guarantee_order
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: WebProxy) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_request_compressed_response(mut self, enable: bool) -> Self {
        self.request_compressed_response = enable;
        self
    }

    #[must_use]
    pub fn with_buffer_request(mut self, enable: bool) -> Self {
        self.buffer_request = enable;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_validate_certificates(mut self, enable: bool) -> Self {
        self.validate_certificates = enable;
        self
    }

    #[must_use]
    pub fn with_client_certificate(mut self, certificate: ClientCertificate) -> Self {
        self.client_certificates.push(certificate);
        self
    }

    #[must_use]
    pub fn with_guarantee_order(mut self, enable: bool) -> Self {
        self.guarantee_order = enable;
        self
    }
}
