//! Sitemap discovery (C5): follows `robots.txt` `Sitemap:` directives (or a
//! conventional `/sitemap.xml` guess when robots listed none), walks
//! sitemap-index files up to 3 levels deep, and returns the flat list of page
//! URLs found, capped at `max_urls`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

const MAX_INDEX_DEPTH: u32 = 3;

static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<loc>\s*([^<]+?)\s*</loc>").unwrap());
static SITEMAPINDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<sitemapindex[\s>]").unwrap());

/// Fetches and walks the sitemap graph starting from `robots_sitemaps` (or a
/// `{domain}/sitemap.xml` guess if that list is empty), returning up to
/// `max_urls` page URLs. Any fetch failure along the way is swallowed; we
/// return whatever was collected before the failure.
pub async fn discover_sitemap_urls(
    client: &reqwest::Client,
    domain_root: &str,
    robots_sitemaps: &[String],
    max_urls: usize,
) -> Vec<String> {
    let mut roots: Vec<String> = robots_sitemaps.to_vec();
    if roots.is_empty() {
        roots.push(format!("{}/sitemap.xml", domain_root.trim_end_matches('/')));
    }

    let mut found = Vec::new();
    let mut queue: Vec<(String, u32)> = roots.drain(..).map(|u| (u, 0)).collect();
    let mut visited = std::collections::HashSet::new();

    while let Some((url, depth)) = queue.pop() {
        if found.len() >= max_urls {
            break;
        }
        if !visited.insert(url.clone()) {
            continue;
        }
        let Some(body) = fetch_sitemap_body(client, &url).await else {
            debug!(url = %url, "sitemap fetch failed, skipping");
            continue;
        };

        if SITEMAPINDEX_RE.is_match(&body) {
            if depth >= MAX_INDEX_DEPTH {
                debug!(url = %url, depth, "sitemap index depth cap reached");
                continue;
            }
            for loc in extract_locs(&body) {
                queue.push((loc, depth + 1));
            }
        } else {
            for loc in extract_locs(&body) {
                if found.len() >= max_urls {
                    break;
                }
                found.push(loc);
            }
        }
    }

    found.truncate(max_urls);
    found
}

fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn fetch_sitemap_body(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = client.get(url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let bytes = resp.bytes().await.ok()?;
    Some(decode_body(url, &bytes))
}

/// gzip-decodes when the URL says `.gz` or the body starts with the gzip
/// magic bytes; otherwise treats the body as plain UTF-8 (lossily).
fn decode_body(url: &str, bytes: &[u8]) -> String {
    let looks_gzipped = url.ends_with(".gz") || bytes.starts_with(&[0x1f, 0x8b]);
    if looks_gzipped {
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut out = String::new();
        if decoder.read_to_string(&mut out).is_ok() {
            return out;
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_locs_from_urlset() {
        let xml = "<urlset><url><loc>https://example.com/a</loc></url>\
                   <url><loc>https://example.com/b</loc></url></urlset>";
        assert_eq!(
            extract_locs(xml),
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string()
            ]
        );
    }

    #[test]
    fn detects_sitemap_index_marker() {
        let xml = "<sitemapindex xmlns=\"x\"><sitemap><loc>https://example.com/a.xml</loc></sitemap></sitemapindex>";
        assert!(SITEMAPINDEX_RE.is_match(xml));
        assert_eq!(extract_locs(xml), vec!["https://example.com/a.xml".to_string()]);
    }

    #[test]
    fn plain_body_is_not_gzip_decoded() {
        let body = decode_body("https://example.com/sitemap.xml", b"<urlset></urlset>");
        assert_eq!(body, "<urlset></urlset>");
    }
}
