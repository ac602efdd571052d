use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

use super::body::BodyDecoder;
use super::head::{HeadDecoder, ResponseHead};
use super::{Message, PayloadItem};
use crate::protocol::ParseError;

/// Decodes the response to a request sent with a given method: one
/// [`Message::Header`], then payload items ending with [`PayloadItem::Eof`].
///
/// The method matters because responses to `HEAD` never carry a body.
#[derive(Debug)]
pub struct ResponseDecoder {
    head_decoder: HeadDecoder,
    body_decoder: Option<BodyDecoder>,
}

impl ResponseDecoder {
    pub fn new(method: Method) -> Self {
        Self { head_decoder: HeadDecoder::new(method), body_decoder: None }
    }

    fn on_body_item(&mut self, item: Option<PayloadItem>) -> Option<Message<ResponseHead>> {
        let item = item?;
        if item.is_eof() {
            self.body_decoder.take();
        }
        Some(Message::Payload(item))
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<ResponseHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(body_decoder) = &mut self.body_decoder {
            let item = body_decoder.decode(src)?;
            return Ok(self.on_body_item(item));
        }

        let Some(head) = self.head_decoder.decode(src)? else {
            return Ok(None);
        };
        self.body_decoder = Some(BodyDecoder::from(head.payload));
        Ok(Some(Message::Header(head)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(body_decoder) = &mut self.body_decoder {
            let item = body_decoder.decode_eof(src)?;
            return Ok(self.on_body_item(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::invalid_header("connection closed in the middle of the response head")),
        }
    }
}
