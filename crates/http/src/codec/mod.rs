//! HTTP/1.1 wire codec for the client side of an exchange.
//!
//! Both halves plug into `tokio_util::codec` framing:
//!
//! - [`RequestEncoder`]: writes a [`RequestHead`] and its body, framed by
//!   Content-Length or chunked transfer encoding
//! - [`ResponseDecoder`]: parses the status line and headers with `httparse`
//!   and yields the body as [`PayloadItem`]s
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use http::Method;
//! use micro_rest_http::codec::{Message, PayloadItem, ResponseDecoder};
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new(Method::GET);
//! let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
//!
//! let Some(Message::Header(head)) = decoder.decode(&mut buf).unwrap() else { unreachable!() };
//! assert_eq!(head.status, http::StatusCode::OK);
//!
//! let Some(Message::Payload(PayloadItem::Chunk(body))) = decoder.decode(&mut buf).unwrap() else { unreachable!() };
//! assert_eq!(&body[..], b"hi");
//! ```

mod body;
mod head;
mod payload;
mod request_encoder;
mod response_decoder;

pub use head::{RequestHead, ResponseHead};
pub use payload::{Message, PayloadItem, PayloadSize};
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
