//! Content-Type parsing and charset transcoding.
//!
//! Bodies are drained as raw bytes and transcoded according to the charset the
//! Content-Type declares, or the default for the MIME type when it declares
//! none: UTF-8 for JSON types, ISO-8859-1 for everything else.
//!
//! UTF-16 handling follows the charset label:
//!
//! - `utf-16`: the byte order comes from a leading BOM (`FF FE` little-endian,
//!   `FE FF` big-endian), which is then dropped; without a BOM the body is big-endian
//! - `utf-16le` / `utf-16be`: the byte order is fixed and a BOM, if present, is
//!   kept as `U+FEFF`
//!
//! UTF-16 is only ever processed in whole 2-byte units. An odd byte count
//! means the body was truncated and is reported as an error.

use std::fmt;
use std::str::FromStr;

use super::HttpError;
use super::constants::{JSON_MIME_TYPES, TEXTUAL_MIME_TYPES, charset_labels};
use crate::ensure;

/// A character encoding a body can be extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// `us-ascii` or `ascii`
    Ascii,
    /// `iso-8859-1` or `latin1`
    Latin1,
    Utf8,
    /// UTF-16 with the byte order taken from a BOM
    Utf16,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    /// Looks up a charset label, ignoring ASCII case.
    pub fn from_label(label: &str) -> Option<Self> {
        const LABELS: [(&str, Charset); 8] = [
            (charset_labels::US_ASCII, Charset::Ascii),
            (charset_labels::ASCII, Charset::Ascii),
            (charset_labels::LATIN1, Charset::Latin1),
            (charset_labels::LATIN1_ALIAS, Charset::Latin1),
            (charset_labels::UTF8, Charset::Utf8),
            (charset_labels::UTF16, Charset::Utf16),
            (charset_labels::UTF16LE, Charset::Utf16Le),
            (charset_labels::UTF16BE, Charset::Utf16Be),
        ];

        LABELS.iter().find(|(name, _)| name.eq_ignore_ascii_case(label)).map(|(_, charset)| *charset)
    }

    /// The canonical label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ascii => charset_labels::US_ASCII,
            Self::Latin1 => charset_labels::LATIN1,
            Self::Utf8 => charset_labels::UTF8,
            Self::Utf16 => charset_labels::UTF16,
            Self::Utf16Le => charset_labels::UTF16LE,
            Self::Utf16Be => charset_labels::UTF16BE,
        }
    }
}

impl FromStr for Charset {
    type Err = HttpError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Self::from_label(label).ok_or_else(|| HttpError::unsupported_charset(label))
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Splits a Content-Type value into its MIME type and charset label.
///
/// The MIME type is everything before the first `;`, trimmed. The charset is
/// taken from a following `charset=` parameter (key matched case-insensitively,
/// trailing `;` removed, surrounding quotes stripped). When that parameter is
/// missing or is not the first parameter, the default charset for the MIME
/// type is returned instead.
pub fn parse_content_type_and_charset(content_type: &str) -> (&str, &str) {
    let Some((content, parameters)) = content_type.split_once(';') else {
        let content = content_type.trim();
        return (content, default_charset(content));
    };

    let content = content.trim();
    let Some((key, value)) = parameters.trim().split_once('=') else {
        return (content, default_charset(content));
    };

    if !key.trim().eq_ignore_ascii_case("charset") {
        return (content, default_charset(content));
    }

    let mut charset = value.trim_end_matches(';').trim();
    if charset.len() >= 2 && charset.starts_with('"') && charset.ends_with('"') {
        charset = charset[1..charset.len() - 1].trim();
    }
    (content, charset)
}

/// The charset assumed when a Content-Type names none.
pub fn default_charset(content_type: &str) -> &'static str {
    if is_content_type_json(content_type) { charset_labels::UTF8 } else { charset_labels::LATIN1 }
}

/// Whether a MIME type can be extracted as text: anything starting with
/// `text`, plus a few structured types.
pub fn is_content_type_textual(content_type: &str) -> bool {
    let bytes = content_type.as_bytes();
    if bytes.len() >= 4 && bytes[..4].eq_ignore_ascii_case(b"text") {
        return true;
    }
    is_one_of(&TEXTUAL_MIME_TYPES, content_type)
}

/// Whether a MIME type can be extracted as JSON.
pub fn is_content_type_json(content_type: &str) -> bool {
    is_one_of(&JSON_MIME_TYPES, content_type)
}

fn is_one_of(table: &[&str], content_type: &str) -> bool {
    table.iter().any(|candidate| candidate.eq_ignore_ascii_case(content_type))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Strips a BOM and reports the byte order it announced; big-endian without one.
fn detect_bom(bytes: &[u8]) -> (ByteOrder, &[u8]) {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => (ByteOrder::Little, rest),
        [0xFE, 0xFF, rest @ ..] => (ByteOrder::Big, rest),
        _ => (ByteOrder::Big, bytes),
    }
}

fn utf16_units(bytes: &[u8], order: ByteOrder) -> Result<Vec<u16>, HttpError> {
    ensure!(
        bytes.len() % 2 == 0,
        HttpError::invalid_body(format!("utf-16 body truncated: {} bytes is not a whole number of units", bytes.len()))
    );

    let units = bytes
        .chunks_exact(2)
        .map(|pair| match order {
            ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
            ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
        })
        .collect();
    Ok(units)
}

/// Decodes the UTF-16 code units of a wide-charset body.
fn wide_units(bytes: &[u8], charset: Charset) -> Result<Vec<u16>, HttpError> {
    match charset {
        Charset::Utf16 => {
            let (order, body) = detect_bom(bytes);
            utf16_units(body, order)
        }
        Charset::Utf16Le => utf16_units(bytes, ByteOrder::Little),
        _ => utf16_units(bytes, ByteOrder::Big),
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Rejects any byte outside the 7-bit range.
fn check_ascii(bytes: Vec<u8>) -> Result<Vec<u8>, HttpError> {
    match bytes.iter().position(|b| !b.is_ascii()) {
        Some(offset) => Err(HttpError::invalid_body(format!(
            "body is not valid {}: byte {:#04x} at offset {offset}",
            Charset::Ascii,
            bytes[offset]
        ))),
        None => Ok(bytes),
    }
}

fn utf8_to_string(bytes: Vec<u8>, charset: Charset) -> Result<String, HttpError> {
    String::from_utf8(bytes).map_err(|e| HttpError::invalid_body(format!("body is not valid {charset}: {e}")))
}

/// Transcodes a body to a Rust string.
pub fn decode_to_string(bytes: Vec<u8>, charset: Charset) -> Result<String, HttpError> {
    match charset {
        Charset::Ascii => utf8_to_string(check_ascii(bytes)?, charset),
        Charset::Utf8 => utf8_to_string(bytes, charset),
        Charset::Latin1 => Ok(latin1_to_string(&bytes)),
        Charset::Utf16 | Charset::Utf16Le | Charset::Utf16Be => {
            let units = wide_units(&bytes, charset)?;
            String::from_utf16(&units).map_err(|e| HttpError::invalid_body(format!("body is not valid {charset}: {e}")))
        }
    }
}

/// Transcodes a body to UTF-8 bytes. UTF-8 bodies pass through untouched,
/// ASCII bodies only once every byte is checked.
pub fn decode_to_utf8(bytes: Vec<u8>, charset: Charset) -> Result<Vec<u8>, HttpError> {
    match charset {
        Charset::Ascii => check_ascii(bytes),
        Charset::Utf8 => Ok(bytes),
        _ => decode_to_string(bytes, charset).map(String::into_bytes),
    }
}

/// Transcodes a body to UTF-16 code units.
pub fn decode_to_utf16(bytes: Vec<u8>, charset: Charset) -> Result<Vec<u16>, HttpError> {
    match charset {
        Charset::Ascii => Ok(check_ascii(bytes)?.into_iter().map(u16::from).collect()),
        Charset::Utf8 => Ok(utf8_to_string(bytes, charset)?.encode_utf16().collect()),
        Charset::Latin1 => Ok(bytes.into_iter().map(u16::from).collect()),
        Charset::Utf16 | Charset::Utf16Le | Charset::Utf16Be => wide_units(&bytes, charset),
    }
}

/// Encodes `text` in `charset`.
///
/// `utf-16` output is big-endian and starts with a BOM. Characters the charset
/// cannot represent are rejected.
pub fn encode(text: &str, charset: Charset) -> Result<Vec<u8>, HttpError> {
    let unrepresentable = |c: char| HttpError::invalid_argument(format!("character {c:?} cannot be encoded as {charset}"));

    match charset {
        Charset::Utf8 => Ok(text.as_bytes().to_vec()),
        Charset::Ascii => match text.chars().find(|c| !c.is_ascii()) {
            Some(c) => Err(unrepresentable(c)),
            None => Ok(text.as_bytes().to_vec()),
        },
        Charset::Latin1 => text.chars().map(|c| u8::try_from(c).map_err(|_e| unrepresentable(c))).collect(),
        Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        Charset::Utf16 => {
            let mut bytes = vec![0xFE, 0xFF];
            bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_without_parameters_uses_default_charset() {
        assert_eq!(parse_content_type_and_charset("text/plain"), ("text/plain", "iso-8859-1"));
        assert_eq!(parse_content_type_and_charset("  application/json "), ("application/json", "utf-8"));
        assert_eq!(parse_content_type_and_charset("TEXT/JSON"), ("TEXT/JSON", "utf-8"));
        assert_eq!(parse_content_type_and_charset(""), ("", "iso-8859-1"));
    }

    #[test]
    fn explicit_charset_overrides_default() {
        assert_eq!(parse_content_type_and_charset("text/plain; charset=utf-16le"), ("text/plain", "utf-16le"));
        assert_eq!(parse_content_type_and_charset("application/json;CharSet=latin1"), ("application/json", "latin1"));
    }

    #[test]
    fn charset_value_is_cleaned_up() {
        assert_eq!(parse_content_type_and_charset("text/html; charset=\"utf-8\""), ("text/html", "utf-8"));
        assert_eq!(parse_content_type_and_charset("text/html; charset= \" utf-8 \" "), ("text/html", "utf-8"));
        assert_eq!(parse_content_type_and_charset("text/html; charset=utf-8;;"), ("text/html", "utf-8"));
        assert_eq!(parse_content_type_and_charset("text/html; charset=\""), ("text/html", "\""));
    }

    #[test]
    fn other_first_parameter_falls_back_to_default() {
        assert_eq!(parse_content_type_and_charset("text/plain; format=flowed; charset=utf-8"), ("text/plain", "iso-8859-1"));
        assert_eq!(parse_content_type_and_charset("application/json; boundary"), ("application/json", "utf-8"));
    }

    #[test]
    fn textual_and_json_checks() {
        assert!(is_content_type_textual("text/plain"));
        assert!(is_content_type_textual("Text/CSV"));
        assert!(is_content_type_textual("textual/whatever"));
        assert!(is_content_type_textual("APPLICATION/JSON"));
        assert!(is_content_type_textual("application/x-www-form-urlencoded"));
        assert!(!is_content_type_textual("application/octet-stream"));
        assert!(!is_content_type_textual("tex"));
        assert!(!is_content_type_textual("image/png"));

        assert!(is_content_type_json("text/x-javascript"));
        assert!(is_content_type_json("Application/X-Json"));
        assert!(!is_content_type_json("text/plain"));
        assert!(!is_content_type_json("application/xml"));
    }

    #[test]
    fn labels() {
        assert_eq!(Charset::from_label("US-ASCII"), Some(Charset::Ascii));
        assert_eq!(Charset::from_label("latin1"), Some(Charset::Latin1));
        assert_eq!(Charset::from_label("UTF-16BE"), Some(Charset::Utf16Be));
        assert_eq!(Charset::from_label("utf8"), None);
        assert!(matches!("koi8-r".parse::<Charset>(), Err(HttpError::UnsupportedCharset { .. })));
        assert_eq!(Charset::Latin1.to_string(), "iso-8859-1");
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        assert_eq!(decode_to_string(vec![b'h', 0xE9, b'!'], Charset::Latin1).unwrap(), "hé!");
        assert_eq!(decode_to_utf8(vec![0xE9], Charset::Latin1).unwrap(), "é".as_bytes());
        assert_eq!(decode_to_utf16(vec![0xFF], Charset::Latin1).unwrap(), vec![0x00FF]);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let err = decode_to_string(vec![0xC3], Charset::Utf8).unwrap_err();
        assert!(matches!(err, HttpError::InvalidBody { .. }));
        // the byte-oriented target passes utf-8 through unchecked
        assert_eq!(decode_to_utf8(vec![0xC3], Charset::Utf8).unwrap(), vec![0xC3]);
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        for target in 0..3 {
            let err = match target {
                0 => decode_to_string(vec![b'o', 0xE9], Charset::Ascii).map(|_| ()),
                1 => decode_to_utf8(vec![b'o', 0xE9], Charset::Ascii).map(|_| ()),
                _ => decode_to_utf16(vec![b'o', 0xE9], Charset::Ascii).map(|_| ()),
            }
            .unwrap_err();
            assert!(matches!(err, HttpError::InvalidBody { ref reason } if reason.contains("offset 1")), "target {target}");
        }
        assert_eq!(decode_to_utf16(b"ok".to_vec(), Charset::Ascii).unwrap(), vec![0x6F, 0x6B]);
    }

    #[test]
    fn utf16_bom_detection() {
        let le_with_bom = [0xFF, 0xFE, b'h', 0, b'i', 0];
        assert_eq!(decode_to_string(le_with_bom.to_vec(), Charset::Utf16).unwrap(), "hi");

        let be_with_bom = [0xFE, 0xFF, 0, b'h', 0, b'i'];
        assert_eq!(decode_to_string(be_with_bom.to_vec(), Charset::Utf16).unwrap(), "hi");

        let be_without_bom = [0, b'h', 0, b'i'];
        assert_eq!(decode_to_string(be_without_bom.to_vec(), Charset::Utf16).unwrap(), "hi");
        assert_eq!(decode_to_utf16(le_with_bom.to_vec(), Charset::Utf16).unwrap(), vec![0x68, 0x69]);
    }

    #[test]
    fn fixed_order_utf16_keeps_bom() {
        let le_with_bom = [0xFF, 0xFE, b'h', 0];
        assert_eq!(decode_to_string(le_with_bom.to_vec(), Charset::Utf16Le).unwrap(), "\u{FEFF}h");
        assert_eq!(decode_to_utf16(le_with_bom.to_vec(), Charset::Utf16Le).unwrap(), vec![0xFEFF, 0x68]);

        let be_with_bom = [0xFE, 0xFF, 0, b'h'];
        assert_eq!(decode_to_utf16(be_with_bom.to_vec(), Charset::Utf16Be).unwrap(), vec![0xFEFF, 0x68]);
    }

    #[test]
    fn odd_utf16_length_is_truncation() {
        for charset in [Charset::Utf16, Charset::Utf16Le, Charset::Utf16Be] {
            let err = decode_to_string(vec![0, b'h', 0], charset).unwrap_err();
            assert!(matches!(err, HttpError::InvalidBody { .. }), "{charset}");
            assert!(decode_to_utf16(vec![b'h'], charset).is_err());
        }
    }

    #[test]
    fn surrogate_pairs_survive() {
        let text = "a😀b";
        for charset in [Charset::Utf8, Charset::Utf16, Charset::Utf16Le, Charset::Utf16Be] {
            let bytes = encode(text, charset).unwrap();
            assert_eq!(decode_to_string(bytes.clone(), charset).unwrap(), text, "{charset}");
            assert_eq!(String::from_utf16(&decode_to_utf16(bytes, charset).unwrap()).unwrap().trim_start_matches('\u{FEFF}'), text);
        }
    }

    #[test]
    fn encode_rejects_unrepresentable() {
        assert!(encode("é", Charset::Ascii).is_err());
        assert!(encode("€", Charset::Latin1).is_err());
        assert_eq!(encode("é", Charset::Latin1).unwrap(), vec![0xE9]);
        assert_eq!(encode("hi", Charset::Utf16).unwrap(), vec![0xFE, 0xFF, 0, b'h', 0, b'i']);
    }
}
