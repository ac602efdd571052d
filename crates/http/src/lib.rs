//! Message bodies, byte streams and charset-aware extraction for an
//! asynchronous HTTP client.
//!
//! This crate holds everything a request or response carries except the act of
//! sending it: headers, body streams, the "content ready" marker, the
//! extraction engine and the HTTP/1.1 wire codec. The exchange itself lives
//! in `micro-rest-client`.
//!
//! # Example
//!
//! ```
//! use micro_rest_http::protocol::MessageBase;
//!
//! let mut message = MessageBase::new();
//! message.set_body_json(&serde_json::json!({ "name": "ferris" })).unwrap();
//! assert_eq!(message.headers().content_type(), "application/json");
//!
//! let value = message.extract_json(false).unwrap();
//! assert_eq!(value["name"], "ferris");
//! ```
//!
//! # Architecture
//!
//! - [`stream`]: the [`ByteChannel`](stream::ByteChannel) trait, its memory,
//!   pipe and blocking-io implementations, and the stream adapter messages
//!   read and write bodies through
//! - [`protocol`]: headers, [`MessageBase`](protocol::MessageBase), charset
//!   handling, extraction and errors
//! - [`codec`]: request encoder and response decoder for HTTP/1.1
//!
//! # Extraction
//!
//! Extraction reads whatever the body stream holds right now and never waits.
//! A body that arrives over the network is only complete once the message's
//! [`ContentReady`](protocol::ContentReady) marker is published, so callers
//! wait on the marker first. Extraction consumes the body.
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod protocol;
pub mod stream;

mod utils;
pub(crate) use utils::ensure;
