//! A [`Transport`] speaking HTTP/1.1 over plain TCP, one connection per exchange.
//!
//! The request is framed with [`RequestEncoder`] and the response parsed with
//! [`ResponseDecoder`]. [`execute`](Transport::execute) returns as soon as the
//! response head is decoded; the body is read by a spawned task that writes
//! into the [`ResponseSink`] until the response ends, fails or is canceled.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST};
use http::uri::Scheme;
use http::{Method, Uri};
use micro_rest_http::codec::{Message, PayloadItem, PayloadSize, RequestEncoder, RequestHead, ResponseDecoder};
use micro_rest_http::protocol::{HttpError, ParseError, UNKNOWN_LENGTH};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, trace};

use crate::WebProxy;
use crate::decompress::Decompressor;
use crate::transport::{RequestBody, ResponseSink, Transport, TransportRequest, TransportResponse};
use crate::uri::request_target;

const READ_BUFFER_SIZE: usize = 8 * 1024;

type RequestMessage = Message<(RequestHead, PayloadSize)>;

/// Plain-TCP HTTP/1.1 transport.
///
/// Honors the config's timeout (up to the response head), chunk size,
/// request buffering, explicit proxy address and compressed-response flag.
/// There is no TLS, connection reuse, retry or redirect handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Http1Transport;

impl Http1Transport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for Http1Transport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let timeout = request.config.timeout();
        match tokio::time::timeout(timeout, send(request)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(?timeout, "no response head in time");
                Err(HttpError::io(io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for the response head")))
            }
        }
    }
}

async fn send(request: TransportRequest) -> Result<TransportResponse, HttpError> {
    let TransportRequest { uri, method, mut headers, config, cancel, body, response_body } = request;

    if uri.scheme() == Some(&Scheme::HTTPS) {
        return Err(HttpError::invalid_argument("TLS is not supported by this transport"));
    }
    let authority = uri.authority().ok_or_else(|| HttpError::invalid_argument("URI must contain a hostname."))?;

    let (address, target) = match config.proxy() {
        WebProxy::Uri { credentials: Some(_), .. } => {
            return Err(HttpError::invalid_argument("proxy credentials are not supported by this transport"));
        }
        WebProxy::Uri { address, credentials: None } => (socket_address(address)?, uri.to_string()),
        _ => (socket_address(&uri)?, request_target(&uri).to_owned()),
    };

    if !headers.contains(HOST) {
        headers.set(HOST, authority.as_str())?;
    }
    if let Some(credentials) = config.credentials()
        && !headers.contains(AUTHORIZATION)
    {
        headers.set(AUTHORIZATION, credentials.basic_authorization())?;
    }
    headers.set(CONNECTION, "close")?;

    if cancel.is_cancelled() {
        return Err(HttpError::TaskCanceled);
    }
    debug!(%address, "connecting");
    let (reader, writer) = TcpStream::connect(&address).await?.into_split();
    let mut framed_write = FramedWrite::new(writer, RequestEncoder::new());
    let mut framed_read =
        FramedRead::with_capacity(reader, ResponseDecoder::new(method.clone()), READ_BUFFER_SIZE);

    let head = RequestHead { method, target, headers };
    send_request(&mut framed_write, head, body, config.buffer_request(), config.chunk_size(), &cancel).await?;

    let head = match framed_read.next().await {
        Some(Ok(Message::Header(head))) => head,
        Some(Ok(Message::Payload(_))) => return Err(ParseError::invalid_body("payload received before the response head").into()),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(ParseError::invalid_header("connection closed before the response head").into()),
    };
    debug!(status = %head.status, payload = ?head.payload, "response head decoded");

    let mut headers = head.headers;
    let decompressor = match headers.get(CONTENT_ENCODING) {
        Some(encoding) if config.request_compressed_response() => Decompressor::for_content_encoding(encoding)?,
        _ => None,
    };
    if decompressor.is_some() {
        // the body handed to the caller is the decoded one
        headers.remove(CONTENT_ENCODING);
        headers.remove(CONTENT_LENGTH);
    }

    tokio::spawn(
        async move {
            // the write half stays open until the body is read, closing it early may end the exchange
            let _framed_write = framed_write;
            let outcome = receive_body(&mut framed_read, decompressor, &response_body, &cancel).await;
            if let Err(e) = outcome.and_then(|()| response_body.finish()) {
                debug!(cause = %e, "response body failed");
                response_body.fail(e);
            }
        }
        .instrument(Span::current()),
    );

    Ok(TransportResponse { status: head.status, reason: head.reason, headers })
}

fn socket_address(uri: &Uri) -> Result<String, HttpError> {
    let host = uri.host().filter(|host| !host.is_empty()).ok_or_else(|| HttpError::invalid_argument("URI must contain a hostname."))?;
    let port = uri.port_u16().unwrap_or(80);
    Ok(format!("{host}:{port}"))
}

async fn send_request(
    framed_write: &mut FramedWrite<OwnedWriteHalf, RequestEncoder>,
    head: RequestHead,
    body: Option<RequestBody>,
    buffer_request: bool,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<(), HttpError> {
    let Some(mut body) = body else {
        framed_write.feed(RequestMessage::Header((head, PayloadSize::Empty))).await?;
        framed_write.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
        return Ok(());
    };

    if buffer_request {
        let buffered = body.read_to_end(chunk_size)?;
        let payload_size = PayloadSize::Length(buffered.len() as u64);
        framed_write.feed(RequestMessage::Header((head, payload_size))).await?;
        framed_write.feed(RequestMessage::from(Bytes::from(buffered))).await?;
        framed_write.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
        return Ok(());
    }

    let payload_size = PayloadSize::for_length(body.declared_length().unwrap_or(UNKNOWN_LENGTH), true);
    framed_write.feed(RequestMessage::Header((head, payload_size))).await?;

    let mut sent: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(HttpError::TaskCanceled);
        }
        let chunk = body.next_chunk(chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        sent += chunk.len() as u64;
        framed_write.send(RequestMessage::from(chunk)).await?;
        trace!(sent, "request body chunk sent");
    }

    framed_write.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
    Ok(())
}

async fn receive_body<R>(
    framed_read: &mut FramedRead<R, ResponseDecoder>,
    mut decompressor: Option<Decompressor>,
    sink: &ResponseSink,
    cancel: &CancellationToken,
) -> Result<(), HttpError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::TaskCanceled),
            item = framed_read.next() => item,
        };

        match item {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                let bytes = match &mut decompressor {
                    Some(decompressor) => decompressor.write(&bytes)?,
                    None => bytes,
                };
                sink.write(&bytes).await?;
            }
            Some(Ok(Message::Payload(PayloadItem::Eof))) | None => break,
            Some(Ok(Message::Header(_))) => {
                return Err(ParseError::invalid_body("response head received while reading the body").into());
            }
            Some(Err(e)) => return Err(e.into()),
        }
    }

    if let Some(decompressor) = decompressor {
        sink.write(&decompressor.finish()?).await?;
    }
    trace!(written = sink.written(), "response body received");
    Ok(())
}
