//! Internal-path and junk-path heuristics (spec section 4.4.1 / section 4.4.2), split out
//! so the inline-JS scanner, the `__NEXT_DATA__` walker, and tests can all
//! share one definition.

const ASSET_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot", ".map",
];

const JUNK_PREFIXES: &[&str] = &[
    "/_next/", "/_nuxt/", "/static/", "/assets/", "/webpack/", "/chunks/",
];

/// section 4.4.2 -- reject asset-extension paths and known build-output prefixes.
pub fn is_junk_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    JUNK_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// section 4.4.1 -- a string is an internal-path candidate iff: length 2..300,
/// starts with `/` but not `//` (protocol-relative), second byte is an
/// ASCII letter, and it does not match the junk filter.
pub fn is_internal_path(s: &str) -> bool {
    if s.len() < 2 || s.len() > 300 {
        return false;
    }
    let bytes = s.as_bytes();
    if bytes[0] != b'/' || bytes[1] == b'/' {
        return false;
    }
    if !bytes[1].is_ascii_alphabetic() {
        return false;
    }
    !is_junk_path(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_path() {
        assert!(is_internal_path("/blog/my-post"));
    }

    #[test]
    fn rejects_protocol_relative() {
        assert!(!is_internal_path("//cdn.example.com/x"));
    }

    #[test]
    fn rejects_non_letter_second_char() {
        assert!(!is_internal_path("/1/2/3"));
    }

    #[test]
    fn rejects_asset_extensions() {
        assert!(!is_internal_path("/app.js"));
        assert!(!is_internal_path("/styles/site.CSS"));
    }

    #[test]
    fn rejects_build_prefixes() {
        assert!(!is_internal_path("/_next/static/chunk"));
        assert!(!is_internal_path("/static/logo"));
        assert!(!is_internal_path("/assets/app"));
    }

    #[test]
    fn accepts_minimum_length() {
        assert!(is_internal_path("/a"));
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(!is_internal_path("/"));
        assert!(!is_internal_path(""));
        assert!(!is_internal_path(&format!("/a{}", "x".repeat(300))));
    }
}
