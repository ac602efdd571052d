//! Static lookup tables for MIME types, charset labels and reason phrases.
//!
//! Default Content-Type values come from the [`mime`] constants instead.

use http::StatusCode;

/// Charset labels recognised by the extraction engine.
pub mod charset_labels {
    pub const US_ASCII: &str = "us-ascii";
    pub const ASCII: &str = "ascii";
    pub const LATIN1: &str = "iso-8859-1";
    pub const LATIN1_ALIAS: &str = "latin1";
    pub const UTF8: &str = "utf-8";
    pub const UTF16: &str = "utf-16";
    pub const UTF16LE: &str = "utf-16le";
    pub const UTF16BE: &str = "utf-16be";
}

/// MIME types, besides everything under `text`, whose bodies are extractable as text.
pub static TEXTUAL_MIME_TYPES: [&str; 6] = [
    "message/http",
    "application/json",
    "application/xml",
    "application/atom+xml",
    "application/http",
    "application/x-www-form-urlencoded",
];

/// MIME types whose bodies are extractable as JSON.
pub static JSON_MIME_TYPES: [&str; 8] = [
    "application/json",
    "application/x-json",
    "text/json",
    "text/x-json",
    "text/javascript",
    "text/x-javascript",
    "application/javascript",
    "application/x-javascript",
];

/// The reason phrase used when a response carries none of its own.
pub fn default_reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrases() {
        assert_eq!(default_reason_phrase(StatusCode::OK), "OK");
        assert_eq!(default_reason_phrase(StatusCode::NOT_FOUND), "Not Found");
        assert_eq!(default_reason_phrase(StatusCode::from_u16(599).unwrap()), "");
    }
}
