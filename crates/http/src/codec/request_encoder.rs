use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::error;

use super::body::BodyEncoder;
use super::head::{RequestHead, encode_request_head};
use super::{Message, PayloadSize};
use crate::protocol::SendError;

/// Encodes an outgoing request: one [`Message::Header`] followed by payload
/// items up to and including [`PayloadItem::Eof`](super::PayloadItem::Eof).
#[derive(Debug, Default)]
pub struct RequestEncoder {
    body_encoder: Option<BodyEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<Message<(RequestHead, PayloadSize)>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.body_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(SendError::invalid_body("request head sent before the previous body finished"));
                }
                encode_request_head(head, payload_size, dst)?;
                self.body_encoder = Some(BodyEncoder::new(payload_size));
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(body_encoder) = &mut self.body_encoder else {
                    error!("expect request head but receive payload item");
                    return Err(SendError::invalid_body("payload sent before the request head"));
                };

                let is_eof = payload_item.is_eof();
                let result = body_encoder.encode(payload_item, dst);
                if is_eof && result.is_ok() {
                    self.body_encoder.take();
                }
                result
            }
        }
    }
}
