//! Link discovery inside embedded JSON blobs: `__NEXT_DATA__` (walk every
//! string value looking for internal paths) and JSON-LD (walk every object,
//! pull out specific well-known keys that hold URLs).

use url::Url;

use crate::paths::is_internal_path;

/// Recursively collects every string value in `value` that looks like an
/// internal path (spec section 4.4.1 / section 4.4.2), resolves it against `base`, and
/// returns the resolved absolute URLs. Used for `__NEXT_DATA__` payloads,
/// which have no fixed schema.
pub fn next_data_paths(value: &serde_json::Value, base: &Url) -> Vec<String> {
    let mut out = Vec::new();
    walk_strings(value, &mut |s| {
        if is_internal_path(s) {
            if let Ok(u) = base.join(s) {
                out.push(u.to_string());
            }
        }
    });
    out
}

fn walk_strings(value: &serde_json::Value, on_string: &mut impl FnMut(&str)) {
    match value {
        serde_json::Value::String(s) => on_string(s),
        serde_json::Value::Array(items) => {
            for item in items {
                walk_strings(item, on_string);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                walk_strings(v, on_string);
            }
        }
        _ => {}
    }
}

/// JSON-LD keys (compared case-insensitively) whose string values are
/// treated as URLs, per spec section 4.4's `<script type=application/ld+json>`
/// row.
const LD_JSON_URL_KEYS: &[&str] = &[
    "url",
    "@id",
    "mainentityofpage",
    "sameas",
    "image",
    "logo",
    "thumbnailurl",
    "contenturl",
];

/// Walks a JSON-LD document (object, array of objects, or `@graph`-nested
/// object) and returns every string found under one of `LD_JSON_URL_KEYS`
/// that parses as an absolute http(s) URL.
pub fn ld_json_urls(value: &serde_json::Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_ld_urls(value, &mut out);
    out
}

fn collect_ld_urls(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                let key_lower = key.to_ascii_lowercase();
                if LD_JSON_URL_KEYS.contains(&key_lower.as_str()) {
                    collect_url_strings(v, out);
                }
                collect_ld_urls(v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_ld_urls(item, out);
            }
        }
        _ => {}
    }
}

fn collect_url_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            if looks_like_url(s) {
                out.push(s.clone());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_url_strings(item, out);
            }
        }
        _ => {}
    }
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_data_walk_finds_internal_path() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"props":{"pageProps":{"posts":[{"slug":"/blog/a"}]}}}"#,
        )
        .unwrap();
        let base = Url::parse("https://openai.com/").unwrap();
        let paths = next_data_paths(&v, &base);
        assert_eq!(paths, vec!["https://openai.com/blog/a".to_string()]);
    }

    #[test]
    fn ld_json_finds_url_and_sameas() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"@type":"Person","url":"https://example.com/me","sameAs":["https://twitter.com/me","not a url"]}"#,
        )
        .unwrap();
        let urls = ld_json_urls(&v);
        assert!(urls.contains(&"https://example.com/me".to_string()));
        assert!(urls.contains(&"https://twitter.com/me".to_string()));
        assert!(!urls.iter().any(|u| u == "not a url"));
    }

    #[test]
    fn ld_json_walks_graph_array() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"@graph":[{"@id":"https://example.com/a"},{"@id":"https://example.com/b"}]}"#,
        )
        .unwrap();
        let urls = ld_json_urls(&v);
        assert_eq!(urls.len(), 2);
    }
}
