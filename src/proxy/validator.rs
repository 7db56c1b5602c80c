//! Target URL validation.

use url::Url;

/// Parse `candidate` as an absolute `http`/`https` URL.
///
/// Returns `None` for anything unparsable, relative, or using another scheme.
pub fn parse_target(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Returns true if `candidate` is an absolute `http`/`https` URL.
pub fn is_valid_url(candidate: &str) -> bool {
    parse_target(candidate).is_some()
}
