use url::{form_urlencoded, Url};

/// Schemes a pasted console link can plausibly have.
const WEB_SCHEMES: &[&str] = &["http", "https", "ftp"];

/// The value as a URL, if it is shaped like one.
fn as_web_url(value: &str) -> Option<Url> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return None;
    }
    let url = Url::parse(value).ok()?;
    if !WEB_SCHEMES.contains(&url.scheme()) {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Project ID from the free-form project field.
///
/// A URL yields its encoded `project` query parameter, or the empty string when there is none.
/// Anything else is taken to be the project ID itself. The result is always URL encoded since it
/// ends up in an API path.
pub fn resolve_project_id(value: &str) -> String {
    match as_web_url(value) {
        Some(url) => url
            .query_pairs()
            .filter(|(k, v)| k == "project" && !v.is_empty())
            .last()
            .map(|(_, v)| encode(&v))
            .unwrap_or_default(),
        None => encode(value),
    }
}
