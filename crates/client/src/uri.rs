//! URI checks and joining.

use http::Uri;
use http::uri::{PathAndQuery, Scheme};
use micro_rest_http::protocol::HttpError;

/// Fails unless `uri` is an `http` or `https` URI with a host.
pub fn verify_uri(uri: &Uri) -> Result<(), HttpError> {
    let scheme = uri.scheme_str().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(HttpError::invalid_argument("URI scheme must be 'http' or 'https'"));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(HttpError::invalid_argument("URI must contain a hostname."));
    }
    Ok(())
}

/// Parses `uri`, supplying `http` when it names no scheme.
pub fn with_default_scheme(uri: &str) -> Result<Uri, HttpError> {
    let uri = uri.trim();
    if has_scheme(uri) {
        return uri.parse().map_err(HttpError::invalid_argument);
    }
    format!("http://{uri}").parse().map_err(HttpError::invalid_argument)
}

/// Resolves a request target against a base URI.
///
/// An absolute `target` is used as is. Otherwise its path is appended to
/// the base path, and its query (if any) replaces the base query.
pub fn resolve(base: &Uri, target: &str) -> Result<Uri, HttpError> {
    if target.is_empty() {
        return Ok(base.clone());
    }

    if has_scheme(target) {
        return target.parse().map_err(HttpError::invalid_argument);
    }

    let (target_path, target_query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    let base_path = base.path().trim_end_matches('/');
    let target_path = target_path.trim_start_matches('/');

    let mut path_and_query = match (base_path.is_empty(), target_path.is_empty()) {
        (_, true) => format!("{base_path}/"),
        (true, false) => format!("/{target_path}"),
        (false, false) => format!("{base_path}/{target_path}"),
    };
    match target_query.or(base.query()) {
        Some(query) if !query.is_empty() => {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        _ => {}
    }

    let mut parts = base.clone().into_parts();
    parts.scheme = Some(parts.scheme.unwrap_or(Scheme::HTTP));
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).map_err(HttpError::invalid_argument)?);
    Uri::from_parts(parts).map_err(HttpError::invalid_argument)
}

/// Whether `uri` starts with `scheme://`, the scheme being
/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )` (RFC 3986 section 3.1).
fn has_scheme(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// The origin-form request target (`/path?query`) of `uri`.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", PathAndQuery::as_str)
}
