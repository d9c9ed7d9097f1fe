const WILDCARD_SCHEME: &str = "*://";
const WILDCARD_PATH: &str = "/*";

/// Turns user input such as `example.com` or `https://example.com/` into the
/// match pattern `*://example.com/*`. Returns `None` for blank input.
///
/// Normalising an already-normalised pattern returns it unchanged.
pub fn normalize_site(raw: &str) -> Option<String> {
    let rest = strip_scheme(raw.trim());
    let rest = rest.strip_suffix(WILDCARD_PATH).unwrap_or(rest);
    // Every trailing slash goes, otherwise `a/b//` would not be a fixed point.
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }

    Some(format!("{WILDCARD_SCHEME}{rest}{WILDCARD_PATH}"))
}

fn strip_scheme(input: &str) -> &str {
    for scheme in ["https://", "http://", WILDCARD_SCHEME] {
        if let Some(rest) = strip_prefix_ignore_case(input, scheme) {
            return rest;
        }
    }
    input
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        input.get(prefix.len()..)
    } else {
        None
    }
}
