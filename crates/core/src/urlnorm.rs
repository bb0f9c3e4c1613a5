use url::Url;

/// Tracking-parameter keys stripped during normalization. Fixed set, not
/// configurable — matching the spec's closed list keeps normalization
/// deterministic across runs.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "gclsrc",
    "msclkid",
    "twclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "_hsenc",
    "_hsmi",
];

/// Normalizes a raw URL string into its canonical form, or returns an
/// empty string when the URL is not http(s), unparseable, or lacks a
/// host. See module-level contract: scheme/host lowercased, default
/// ports stripped, trailing slash trimmed (never from root), fragment
/// dropped, tracking params stripped, remaining query sorted.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fragment = match trimmed.split_once('#') {
        Some((head, _)) => head,
        None => trimmed,
    };

    let parsed = match Url::parse(without_fragment) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return String::new();
    }

    let host = match parsed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return String::new(),
    };

    let scheme = parsed.scheme().to_ascii_lowercase();
    let default_port = if scheme == "http" { 80 } else { 443 };
    let port = parsed.port().filter(|p| *p != default_port);

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path = "/".to_string();
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut out = String::new();
    out.push_str(&scheme);
    out.push_str("://");
    out.push_str(&host);
    if let Some(p) = port {
        out.push(':');
        out.push_str(&p.to_string());
    }
    out.push_str(&path);

    if !pairs.is_empty() {
        out.push('?');
        let encoded: Vec<String> = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    url::form_urlencoded::byte_serialize(k.as_bytes()).collect::<String>()
                } else {
                    format!(
                        "{}={}",
                        url::form_urlencoded::byte_serialize(k.as_bytes()).collect::<String>(),
                        url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>()
                    )
                }
            })
            .collect();
        out.push_str(&encoded.join("&"));
    }

    out
}

/// Whether a `Content-Type` header value denotes HTML, ignoring any
/// `;charset=...` parameter.
pub fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let base = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            base == "text/html" || base == "application/xhtml+xml"
        }
        None => false,
    }
}

/// Holds when `host` (lowercased, with a single leading `www.` stripped)
/// equals `domain`, or — when `include_subdomain` — ends with
/// `.{domain}`.
pub fn is_same_domain(host: &str, domain: &str, include_subdomain: bool) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let domain = domain.to_ascii_lowercase();

    if host == domain {
        return true;
    }
    if include_subdomain {
        return host.ends_with(&format!(".{domain}"));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_default_port() {
        assert_eq!(
            normalize("HTTPS://Example.com:443/Path/#section"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn trims_trailing_slash_except_root() {
        assert_eq!(normalize("http://example.com/"), "http://example.com/");
        assert_eq!(normalize("http://example.com/a/"), "http://example.com/a");
    }

    #[test]
    fn strips_tracking_params_and_sorts_rest() {
        let out = normalize("http://example.com/a?utm_source=x&b=2&a=1");
        assert_eq!(out, "http://example.com/a?a=1&b=2");
    }

    #[test]
    fn sorts_values_within_duplicate_keys() {
        let out = normalize("http://example.com/a?tag=b&tag=a");
        assert_eq!(out, "http://example.com/a?tag=a&tag=b");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(normalize("ftp://example.com/"), "");
        assert_eq!(normalize("mailto:a@example.com"), "");
    }

    #[test]
    fn rejects_unparseable() {
        assert_eq!(normalize("not a url"), "");
    }

    #[test]
    fn keeps_non_default_port() {
        assert_eq!(
            normalize("http://example.com:8080/a"),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn is_html_ignores_charset() {
        assert!(is_html(Some("text/html; charset=utf-8")));
        assert!(is_html(Some("application/xhtml+xml")));
        assert!(!is_html(Some("application/json")));
        assert!(!is_html(None));
    }

    #[test]
    fn same_domain_strips_www() {
        assert!(is_same_domain("www.example.com", "example.com", false));
        assert!(!is_same_domain("blog.example.com", "example.com", false));
        assert!(is_same_domain("blog.example.com", "example.com", true));
        assert!(!is_same_domain("notexample.com", "example.com", true));
    }
}
