//! URL and token normalization
//!
//! Pure string transforms. Anything unrecognised passes through unchanged.

/// Strip a leading `Bearer ` prefix (any casing) and surrounding whitespace
pub fn clean_token(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Whether the string starts with an explicit `scheme://`
pub fn has_scheme(url: &str) -> bool {
    match url.find("://") {
        Some(idx) if idx > 0 => url[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        _ => false,
    }
}

/// Normalize a gateway address into an HTTP base URL.
///
/// Maps `ws://` to `http://` and `wss://` to `https://`, defaults to
/// `https://` when no scheme is present and never ends with `/`.
pub fn normalize_http_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if has_scheme(trimmed) {
        convert_ws_to_http(trimmed)
    } else {
        format!("https://{}", trimmed)
    }
}

/// `http://` → `ws://`, `https://` → `wss://`
pub fn convert_http_to_ws(url: &str) -> String {
    replace_scheme(url, &[("https://", "wss://"), ("http://", "ws://")])
}

/// `ws://` → `http://`, `wss://` → `https://`
pub fn convert_ws_to_http(url: &str) -> String {
    replace_scheme(url, &[("wss://", "https://"), ("ws://", "http://")])
}

fn replace_scheme(url: &str, mappings: &[(&str, &str)]) -> String {
    for (from, to) in mappings {
        if let Some(prefix) = url.get(..from.len()) {
            if prefix.eq_ignore_ascii_case(from) {
                return format!("{}{}", to, &url[from.len()..]);
            }
        }
    }
    url.to_string()
}
