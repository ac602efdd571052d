//! Message-level building blocks shared by requests and responses.
//!
//! - **Headers** ([`HttpHeaders`]): case-insensitive collection that folds
//!   repeated names into one comma-joined value
//! - **Message base** ([`MessageBase`]): headers, body streams and the
//!   [`ContentReady`] marker, plus the `set_body_*` family
//! - **Extraction** ([`extract`]): charset-aware `extract_*` operations on
//!   [`MessageBase`]
//! - **Charsets** ([`charset`]): Content-Type parsing and transcoding
//! - **Errors** ([`error`]): [`HttpError`] for everything above, with
//!   [`ParseError`] and [`SendError`] for the wire codec

pub mod charset;
pub mod constants;
pub mod extract;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod headers;
pub use headers::HttpHeaders;

mod message;
pub use message::ContentReady;
pub use message::MessageBase;
pub use message::UNKNOWN_LENGTH;
pub use message::resolve_content_length;
