//! An asynchronous HTTP client built on `micro-rest-http` message bodies.
//!
//! Every request goes through an [`Exchange`]: the first call to
//! [`HttpRequest::get_response`] hands the request to a [`Transport`] on the
//! tokio pool, and every later call returns the same shared
//! [`ResponseFuture`]. The transport is never invoked twice for one request,
//! and a request whose cancellation token already fired is never sent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use micro_rest_client::{Http1Transport, HttpClient};
//!
//! # async fn run() -> Result<(), micro_rest_http::protocol::HttpError> {
//! let client = HttpClient::new("http://127.0.0.1:8080/api/", Arc::new(Http1Transport::new()))?;
//!
//! let response = client.get("users/7")?.await?;
//! println!("{} {}", response.status(), response.extract_json(false).await?);
//! # Ok(())
//! # }
//! ```
//!
//! # Pieces
//!
//! - [`ClientConfig`]: timeouts, proxy, credentials, buffering and chunk size,
//!   copied into each request
//! - [`Transport`]: the seam to the network, with [`Http1Transport`] as the
//!   plain-TCP implementation
//! - [`HttpRequest`] / [`HttpResponse`]: messages with body setters and the
//!   `extract_*` family
//! - [`HttpClient`]: base URI, default headers and conveniences

mod client;
mod config;
mod decompress;
mod exchange;
mod http1;
mod request;
mod response;
mod transport;
pub mod uri;

pub use client::HttpClient;
pub use config::{ClientCertificate, ClientConfig, Credentials, DEFAULT_CHUNK_SIZE, WebProxy};
pub use decompress::ACCEPT_ENCODING;
pub use exchange::{Exchange, ExchangeState, ResponseFuture};
pub use http1::Http1Transport;
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use transport::{RequestBody, ResponseSink, Transport, TransportRequest, TransportResponse};
