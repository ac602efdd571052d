use bytes::Bytes;

/// One frame of an HTTP/1.1 message: its head, or a piece of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Header(T),
    Payload(PayloadItem),
}

/// A piece of body, or the end of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

/// How a body is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length: n`
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// Delimited by the peer closing the connection. Only valid for responses.
    UntilClose,
    /// No body at all.
    Empty,
}

impl PayloadSize {
    /// Framing for a body whose length is `length`, where
    /// [`UNKNOWN_LENGTH`](crate::protocol::UNKNOWN_LENGTH) means chunked.
    pub fn for_length(length: u64, has_body: bool) -> Self {
        match length {
            _ if !has_body => Self::Empty,
            crate::protocol::UNKNOWN_LENGTH => Self::Chunked,
            n => Self::Length(n),
        }
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UNKNOWN_LENGTH;

    #[test]
    fn framing_from_resolved_length() {
        assert_eq!(PayloadSize::for_length(10, true), PayloadSize::Length(10));
        assert_eq!(PayloadSize::for_length(UNKNOWN_LENGTH, true), PayloadSize::Chunked);
        assert_eq!(PayloadSize::for_length(0, false), PayloadSize::Empty);
        assert!(PayloadSize::for_length(0, true).is_empty());
    }
}
