use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The single error type surfaced by message bodies, extraction and the exchange.
///
/// It is `Clone` because one failure may be observed by every holder of a
/// memoized response future, so the wrapped sources are reference counted.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Incorrect Content-Type: must be textual to extract_string, JSON to extract_json.")]
    IncorrectContentType,

    #[error("Charset must be iso-8859-1, utf-8, utf-16, utf-16le, or utf-16be to be extracted, found `{charset}`")]
    UnsupportedCharset { charset: String },

    #[error("A stream was set on the message and extraction is not possible")]
    StreamWasSetExplicitly,

    #[error("task canceled")]
    TaskCanceled,

    #[error("transport error: {source}")]
    Transport { source: Arc<dyn StdError + Send + Sync> },

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },

    #[error("json error: {source}")]
    Json { source: Arc<serde_json::Error> },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("{operation} is not implemented")]
    NotImplemented { operation: &'static str },

    #[error("stream is not open for {direction}")]
    StreamClosed { direction: &'static str },

    #[error("response error: {source}")]
    Decode { source: Arc<ParseError> },

    #[error("request error: {source}")]
    Encode { source: Arc<SendError> },
}

impl HttpError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn unsupported_charset<S: ToString>(str: S) -> Self {
        Self::UnsupportedCharset { charset: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn not_implemented(operation: &'static str) -> Self {
        Self::NotImplemented { operation }
    }

    pub fn transport<E: StdError + Send + Sync + 'static>(e: E) -> Self {
        Self::Transport { source: Arc::new(e) }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: Arc::new(e.into()) }
    }

    /// Returns true when the failure was caused by a cancellation request rather
    /// than by the transport or the message itself.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::TaskCanceled)
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { source: Arc::new(e) }
    }
}

impl From<ParseError> for HttpError {
    fn from(e: ParseError) -> Self {
        Self::Decode { source: Arc::new(e) }
    }
}

impl From<SendError> for HttpError {
    fn from(e: SendError) -> Self {
        Self::Encode { source: Arc::new(e) }
    }
}

/// Errors raised while decoding a response off the wire.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http status: {0:?}")]
    InvalidStatus(Option<u16>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors raised while encoding a request onto the wire.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_is_distinguished_from_transport_failures() {
        assert!(HttpError::TaskCanceled.is_canceled());
        assert!(!HttpError::transport(io::Error::other("reset")).is_canceled());
        assert!(!HttpError::io(io::ErrorKind::Interrupted).is_canceled());
    }

    #[test]
    fn clones_share_the_source() {
        let error = HttpError::io(io::Error::other("broken pipe"));
        let cloned = error.clone();
        assert_eq!(error.to_string(), cloned.to_string());
        assert_eq!(cloned.to_string(), "io error: broken pipe");
    }

    #[test]
    fn codec_errors_convert() {
        let error: HttpError = ParseError::too_many_headers(64).into();
        assert!(matches!(error, HttpError::Decode { .. }));
        assert_eq!(error.to_string(), "response error: header number exceed the limit 64");
    }
}
