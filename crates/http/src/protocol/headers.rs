use std::fmt;

use http::header::{AsHeaderName, CONTENT_LENGTH, CONTENT_TYPE, Entry, HeaderName, HeaderValue};
use http::HeaderMap;

use super::HttpError;

/// The header collection owned by a message.
///
/// Names are case-insensitive and iterate in insertion order. [`set`](Self::set)
/// overwrites, [`add`](Self::add) folds a repeated name into one comma-joined
/// value, so every name maps to exactly one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    map: HeaderMap,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any existing value.
    pub fn set<K, V>(&mut self, name: K, value: V) -> Result<(), HttpError>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let (name, value) = convert(name, value)?;
        self.map.insert(name, value);
        Ok(())
    }

    /// Adds `value` under `name`; an existing value becomes `"old, value"`.
    pub fn add<K, V>(&mut self, name: K, value: V) -> Result<(), HttpError>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let (name, value) = convert(name, value)?;
        match self.map.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                let mut joined = Vec::with_capacity(existing.len() + 2 + value.len());
                joined.extend_from_slice(existing.as_bytes());
                joined.extend_from_slice(b", ");
                joined.extend_from_slice(value.as_bytes());
                *existing = HeaderValue::from_bytes(&joined).map_err(|e| HttpError::invalid_argument(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// The value of `name`, if present and visible ASCII.
    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.map.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.map.contains_key(name)
    }

    pub fn remove<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        self.map.remove(name)
    }

    /// The raw Content-Type value, or an empty string when absent.
    pub fn content_type(&self) -> &str {
        self.get(CONTENT_TYPE).unwrap_or_default()
    }

    pub fn set_content_type(&mut self, content_type: &str) -> Result<(), HttpError> {
        self.set(CONTENT_TYPE, content_type)
    }

    /// The Content-Length value, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH).and_then(|value| value.trim().parse().ok())
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.map.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    pub fn iter(&self) -> http::header::Iter<'_, HeaderValue> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn as_header_map(&self) -> &HeaderMap {
        &self.map
    }

    pub fn into_header_map(self) -> HeaderMap {
        self.map
    }
}

fn convert<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), HttpError>
where
    K: TryInto<HeaderName>,
    K::Error: Into<http::Error>,
    V: TryInto<HeaderValue>,
    V::Error: Into<http::Error>,
{
    let name = name.try_into().map_err(|e| HttpError::invalid_argument(Into::<http::Error>::into(e)))?;
    let value = value.try_into().map_err(|e| HttpError::invalid_argument(Into::<http::Error>::into(e)))?;
    Ok((name, value))
}

impl From<HeaderMap> for HttpHeaders {
    /// Repeated names are folded the same way [`HttpHeaders::add`] folds them.
    fn from(map: HeaderMap) -> Self {
        let mut headers = Self::default();
        let mut last = None;
        for (name, value) in map {
            // the iterator yields `None` names for extra values of the previous name
            let Some(name) = name.or_else(|| last.clone()) else {
                continue;
            };
            last = Some(name.clone());
            // folding two valid values always yields a valid value
            let _ = headers.add(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a HttpHeaders {
    type Item = (&'a HeaderName, &'a HeaderValue);
    type IntoIter = http::header::Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

/// Renders the HTTP/1.1 header block: `Key: Value\r\n` lines and a blank line.
impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.map {
            write!(f, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        f.write_str("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, TRANSFER_ENCODING, USER_AGENT};
    use indoc::indoc;

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = HttpHeaders::new();
        headers.set("Content-Type", "text/plain").unwrap();
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get(CONTENT_TYPE), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));

        headers.set("CONTENT-TYPE", "application/json").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.content_type(), "application/json");
    }

    #[test]
    fn add_folds_repeated_names() {
        let mut headers = HttpHeaders::new();
        headers.add(ACCEPT, "text/html").unwrap();
        headers.add("accept", "application/json").unwrap();
        assert_eq!(headers.get(ACCEPT), Some("text/html, application/json"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut headers = HttpHeaders::new();
        let err = headers.set("bad header", "x").unwrap_err();
        assert!(matches!(err, HttpError::InvalidArgument { .. }));
        assert!(headers.set("x-ok", "line\nbreak").is_err());
    }

    #[test]
    fn content_length_round_trips() {
        let mut headers = HttpHeaders::new();
        assert_eq!(headers.content_length(), None);
        headers.set_content_length(100);
        assert_eq!(headers.content_length(), Some(100));
        headers.set(CONTENT_LENGTH, "garbage").unwrap();
        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn from_header_map_folds_duplicates() {
        let mut map = HeaderMap::new();
        map.append(TRANSFER_ENCODING, HeaderValue::from_static("gzip"));
        map.append(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        map.insert(USER_AGENT, HeaderValue::from_static("probe"));

        let headers = HttpHeaders::from(map);
        assert_eq!(headers.get(TRANSFER_ENCODING), Some("gzip, chunked"));
        assert_eq!(headers.get(USER_AGENT), Some("probe"));
    }

    #[test]
    fn displays_as_header_block() {
        let mut headers = HttpHeaders::new();
        headers.set(CONTENT_TYPE, "text/plain").unwrap();
        headers.set_content_length(5);

        let expected = indoc! {"
            content-type: text/plain\r
            content-length: 5\r
            \r
        "};
        assert_eq!(headers.to_string(), expected);
    }
}
