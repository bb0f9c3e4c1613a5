//! Single-pass HTML tokenizer -> extraction (C4). Built on html5ever's raw
//! `Tokenizer`/`TokenSink`, which emits start-tag, text, and end-tag events
//! in document order without building a DOM -- the model the spec
//! describes directly, rather than a selector-matching rewriter.

use html5ever::buffer_queue::BufferQueue;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use spindle_core::types::{ExtractResult, ExtractedLink};
use spindle_core::urlnorm::is_same_domain;

use crate::json_links::{ld_json_urls, next_data_paths};
use crate::paths::is_internal_path;
use crate::srcset::parse_srcset;

const TITLE_MAX: usize = 500;
const DESCRIPTION_MAX: usize = 500;
const ANCHOR_TEXT_MAX: usize = 200;
const INLINE_SCRIPT_MAX_BYTES: usize = 100 * 1024;
const INLINE_SCRIPT_LINK_CAP: usize = 200;

static INLINE_JS_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](/[A-Za-z][^"'\\]{1,200})["']"#).unwrap());

static META_REFRESH_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)url\s*=\s*['"]?([^'";]+)['"]?"#).unwrap());

const LINK_REL_PASSTHROUGH: &[&str] = &[
    "next",
    "prev",
    "alternate",
    "prefetch",
    "preload",
    "prerender",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    None,
    NextData,
    JsonLd,
    Inline,
}

#[derive(Default)]
struct AnchorState {
    target_url: Option<String>,
    target_is_internal: bool,
    rel: Option<String>,
    title_attr: Option<String>,
    buf: String,
}

/// Tokenizer sink that drives the extraction state machine. html5ever
/// owns this by value and calls `process_token(&mut self, ...)` once per
/// tag/text event in document order, which is exactly the flag-tracking
/// model the spec describes: `in_title`/`in_anchor`/`in_script` plus the
/// in-flight anchor's partial state.
struct Extractor<'a> {
    domain: &'a str,
    extract_images: bool,
    base_url: Url,
    effective_base: Url,

    title: Option<String>,
    title_buf: Option<String>,
    description: Option<String>,
    language: Option<String>,
    canonical: Option<String>,
    links: Vec<ExtractedLink>,

    in_anchor: bool,
    anchor: AnchorState,

    script_kind: ScriptKind,
    script_buf: String,
    inline_link_count: usize,
}

impl<'a> Extractor<'a> {
    fn new(base_url: Url, domain: &'a str, extract_images: bool) -> Self {
        Self {
            domain,
            extract_images,
            effective_base: base_url.clone(),
            base_url,
            title: None,
            title_buf: None,
            description: None,
            language: None,
            canonical: None,
            links: Vec::new(),
            in_anchor: false,
            anchor: AnchorState::default(),
            script_kind: ScriptKind::None,
            script_buf: String::new(),
            inline_link_count: 0,
        }
    }

    fn is_internal(&self, url: &Url) -> bool {
        url.host_str()
            .map(|h| is_same_domain(h, self.domain, true))
            .unwrap_or(false)
    }

    /// Rejects hrefs the spec's URL resolution filter excludes, then
    /// resolves against the effective base.
    fn resolve_href(&self, href: &str) -> Option<Url> {
        if href.is_empty() {
            return None;
        }
        let lower = href.trim_start().to_ascii_lowercase();
        if lower.starts_with("javascript:")
            || lower.starts_with("mailto:")
            || lower.starts_with("tel:")
            || lower.starts_with("data:")
        {
            return None;
        }
        self.effective_base.join(href).ok()
    }

    fn finalize_anchor(&mut self) {
        if !self.in_anchor {
            return;
        }
        self.in_anchor = false;
        let anchor = std::mem::take(&mut self.anchor);
        let Some(target_url) = anchor.target_url else {
            return;
        };
        let mut text = normalize_whitespace(&anchor.buf);
        if text.is_empty() {
            text = anchor.title_attr.unwrap_or_default();
        }
        let text = truncate_chars(&text, ANCHOR_TEXT_MAX);
        self.links.push(ExtractedLink {
            target_url,
            anchor_text: if text.is_empty() { None } else { Some(text) },
            rel: anchor.rel,
            is_internal: anchor.target_is_internal,
        });
    }

    fn handle_start_tag(&mut self, tag: &Tag) {
        let name = tag.name.to_string();
        match name.as_str() {
            "title" => {
                self.title_buf = Some(String::new());
            }
            "a" => {
                // Consecutive <a> without an intervening close: finalize
                // whatever anchor is still open before starting the new one.
                self.finalize_anchor();
                let href = attr(tag, "href");
                let rel = attr(tag, "rel");
                let title_attr = attr(tag, "title");
                let resolved = href.and_then(|h| self.resolve_href(&h));
                let target_is_internal = resolved.as_ref().map(|u| self.is_internal(u)).unwrap_or(false);
                self.in_anchor = true;
                self.anchor = AnchorState {
                    target_is_internal,
                    target_url: resolved.map(|u| u.to_string()),
                    rel,
                    title_attr,
                    buf: String::new(),
                };
            }
            "area" => {
                if let Some(href) = attr(tag, "href") {
                    if let Some(resolved) = self.resolve_href(&href) {
                        let is_internal = self.is_internal(&resolved);
                        let anchor_text = attr(tag, "alt").filter(|s| !s.is_empty());
                        self.links.push(ExtractedLink {
                            target_url: resolved.to_string(),
                            anchor_text,
                            rel: attr(tag, "rel"),
                            is_internal,
                        });
                    }
                }
            }
            "base" => {
                if let Some(href) = attr(tag, "href") {
                    if let Ok(resolved) = self.base_url.join(&href) {
                        self.effective_base = resolved;
                    }
                }
            }
            "link" => {
                let rel = attr(tag, "rel").unwrap_or_default().to_ascii_lowercase();
                if let Some(href) = attr(tag, "href") {
                    if rel == "canonical" {
                        if let Some(resolved) = self.resolve_href(&href) {
                            self.canonical = Some(resolved.to_string());
                        }
                    } else if LINK_REL_PASSTHROUGH.contains(&rel.as_str()) {
                        if let Some(resolved) = self.resolve_href(&href) {
                            let is_internal = self.is_internal(&resolved);
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text: None,
                                rel: Some(rel),
                                is_internal,
                            });
                        }
                    }
                }
            }
            "meta" => self.handle_meta(tag),
            "html" => {
                if let Some(lang) = attr(tag, "lang") {
                    if !lang.is_empty() {
                        self.language = Some(lang);
                    }
                }
            }
            "img" if self.extract_images => {
                if let Some(src) = attr(tag, "src") {
                    if !src.to_ascii_lowercase().starts_with("data:") {
                        if let Some(resolved) = self.resolve_href(&src) {
                            let is_internal = self.is_internal(&resolved);
                            let anchor_text = attr(tag, "alt").filter(|s| !s.is_empty());
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text,
                                rel: Some("image".to_string()),
                                is_internal,
                            });
                        }
                    }
                }
                if let Some(srcset) = attr(tag, "srcset") {
                    for candidate in parse_srcset(&srcset) {
                        if candidate.to_ascii_lowercase().starts_with("data:") {
                            continue;
                        }
                        if let Some(resolved) = self.resolve_href(&candidate) {
                            let is_internal = self.is_internal(&resolved);
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text: None,
                                rel: Some("image-srcset".to_string()),
                                is_internal,
                            });
                        }
                    }
                }
            }
            "iframe" => {
                if let Some(src) = attr(tag, "src") {
                    if let Some(resolved) = self.resolve_href(&src) {
                        if self.is_internal(&resolved) {
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text: None,
                                rel: Some("iframe".to_string()),
                                is_internal: true,
                            });
                        }
                    }
                }
            }
            "script" => {
                let id = attr(tag, "id").unwrap_or_default();
                let script_type = attr(tag, "type").unwrap_or_default().to_ascii_lowercase();
                let has_src = attr(tag, "src").is_some();
                self.script_kind = if has_src {
                    ScriptKind::None
                } else if id == "__NEXT_DATA__" {
                    ScriptKind::NextData
                } else if script_type == "application/ld+json" {
                    ScriptKind::JsonLd
                } else {
                    ScriptKind::Inline
                };
                self.script_buf.clear();
            }
            _ => {}
        }
    }

    fn handle_meta(&mut self, tag: &Tag) {
        let name = attr(tag, "name").unwrap_or_default().to_ascii_lowercase();
        let http_equiv = attr(tag, "http-equiv").unwrap_or_default().to_ascii_lowercase();
        let property = attr(tag, "property").unwrap_or_default().to_ascii_lowercase();
        let content = attr(tag, "content").unwrap_or_default();

        if name == "description" {
            self.description = Some(truncate_chars(content.trim(), DESCRIPTION_MAX));
        } else if name == "language" {
            self.language = Some(content.clone());
        } else if http_equiv == "refresh" {
            if let Some(cap) = META_REFRESH_URL_RE.captures(&content) {
                let raw = cap[1].trim().to_string();
                if let Some(resolved) = self.resolve_href(&raw) {
                    let is_internal = self.is_internal(&resolved);
                    self.links.push(ExtractedLink {
                        target_url: resolved.to_string(),
                        anchor_text: None,
                        rel: Some("meta-refresh".to_string()),
                        is_internal,
                    });
                }
            }
        } else if property == "og:image" && self.extract_images {
            if let Some(resolved) = self.resolve_href(&content) {
                let is_internal = self.is_internal(&resolved);
                self.links.push(ExtractedLink {
                    target_url: resolved.to_string(),
                    anchor_text: None,
                    rel: Some("og:image".to_string()),
                    is_internal,
                });
            }
        }
    }

    fn handle_end_tag(&mut self, name: &str) {
        match name {
            "title" => {
                if let Some(buf) = self.title_buf.take() {
                    let title = truncate_chars(&normalize_whitespace(&buf), TITLE_MAX);
                    if !title.is_empty() {
                        self.title = Some(title);
                    }
                }
            }
            "a" => self.finalize_anchor(),
            "script" => self.finish_script(),
            _ => {}
        }
    }

    fn finish_script(&mut self) {
        let kind = self.script_kind;
        self.script_kind = ScriptKind::None;
        if kind == ScriptKind::None {
            return;
        }
        let buf = std::mem::take(&mut self.script_buf);
        match kind {
            ScriptKind::NextData => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&buf) {
                    for target_url in next_data_paths(&value, &self.effective_base) {
                        self.links.push(ExtractedLink {
                            target_url,
                            anchor_text: None,
                            rel: Some("next-data".to_string()),
                            is_internal: true,
                        });
                    }
                }
            }
            ScriptKind::JsonLd => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&buf) {
                    for target_url in ld_json_urls(&value) {
                        if let Ok(resolved) = Url::parse(&target_url) {
                            let is_internal = self.is_internal(&resolved);
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text: None,
                                rel: Some("json-ld".to_string()),
                                is_internal,
                            });
                        }
                    }
                }
            }
            ScriptKind::Inline => {
                if buf.len() < INLINE_SCRIPT_MAX_BYTES {
                    let mut to_emit = Vec::new();
                    for cap in INLINE_JS_PATH_RE.captures_iter(&buf) {
                        if self.inline_link_count + to_emit.len() >= INLINE_SCRIPT_LINK_CAP {
                            break;
                        }
                        let path = cap[1].to_string();
                        if is_internal_path(&path) {
                            to_emit.push(path);
                        }
                    }
                    for path in to_emit {
                        if let Ok(resolved) = self.effective_base.join(&path) {
                            self.inline_link_count += 1;
                            self.links.push(ExtractedLink {
                                target_url: resolved.to_string(),
                                anchor_text: None,
                                rel: Some("inline-js".to_string()),
                                is_internal: true,
                            });
                        }
                    }
                }
            }
            ScriptKind::None => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        if self.title_buf.is_some() {
            self.title_buf.as_mut().unwrap().push_str(text);
        }
        if self.in_anchor {
            self.anchor.buf.push_str(text);
        }
        if self.script_kind != ScriptKind::None {
            self.script_buf.push_str(text);
        }
    }

    fn finish(mut self) -> ExtractResult {
        // EOF with an unclosed anchor still contributes its text.
        self.finalize_anchor();
        ExtractResult {
            title: self.title,
            description: self.description,
            language: self.language,
            canonical: self.canonical,
            links: self.links,
        }
    }
}

impl<'a> TokenSink for Extractor<'a> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => self.handle_start_tag(&tag),
                TagKind::EndTag => self.handle_end_tag(&tag.name),
            },
            Token::CharacterTokens(text) => self.handle_text(&text),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn attr(tag: &Tag, name: &str) -> Option<String> {
    tag.attrs
        .iter()
        .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(name))
        .map(|a| a.value.to_string())
}

/// Collapses runs of whitespace to a single space and trims the ends.
fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Pure extraction entry point (C4's contract). Never fails -- malformed
/// input just yields partial output.
pub fn extract(body: &[u8], base_url: &str, domain: &str, extract_images: bool) -> ExtractResult {
    let Ok(base) = Url::parse(base_url) else {
        return ExtractResult::default();
    };
    let html = String::from_utf8_lossy(body);

    let sink = Extractor::new(base, domain, extract_images);
    let mut queue = BufferQueue::default();
    queue.push_back(StrTendril::from(html.as_ref()));
    let mut tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let _ = tokenizer.feed(&mut queue);
    tokenizer.end();
    tokenizer.sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_description() {
        let html = br#"<html><head><title>Hello World</title>
            <meta name="description" content="A test page."></head><body></body></html>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.title.as_deref(), Some("Hello World"));
        assert_eq!(r.description.as_deref(), Some("A test page."));
    }

    #[test]
    fn anchor_text_through_nested_tags() {
        let html = br#"<a href="/x"><b>Hello</b> <i>World</i></a>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.links.len(), 1);
        assert_eq!(r.links[0].anchor_text.as_deref(), Some("Hello World"));
        assert_eq!(r.links[0].target_url, "https://example.com/x");
    }

    #[test]
    fn base_href_rebases_subsequent_links() {
        let html = br#"<base href="https://cdn.example.com/p/"><a href="art.html">A</a>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.links[0].target_url, "https://cdn.example.com/p/art.html");
    }

    #[test]
    fn next_data_walk_emits_internal_link() {
        let html = br#"<script id="__NEXT_DATA__" type="application/json">{"props":{"pageProps":{"posts":[{"slug":"/blog/a"}]}}}</script>"#;
        let r = extract(html, "https://openai.com/", "openai.com", false);
        assert!(r
            .links
            .iter()
            .any(|l| l.target_url == "https://openai.com/blog/a"
                && l.rel.as_deref() == Some("next-data")
                && l.is_internal));
    }

    #[test]
    fn meta_refresh_emits_link() {
        let html = br#"<meta http-equiv="refresh" content="5; url=/next">"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.links.len(), 1);
        assert_eq!(r.links[0].target_url, "https://example.com/next");
        assert_eq!(r.links[0].rel.as_deref(), Some("meta-refresh"));
    }

    #[test]
    fn canonical_and_passthrough_rel_links() {
        let html = br#"<link rel="canonical" href="/canon">
            <link rel="next" href="/page2">
            <link rel="stylesheet" href="/style.css">"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.canonical.as_deref(), Some("https://example.com/canon"));
        assert_eq!(r.links.len(), 1);
        assert_eq!(r.links[0].rel.as_deref(), Some("next"));
    }

    #[test]
    fn rejects_javascript_and_mailto_hrefs() {
        let html = br#"<a href="javascript:void(0)">X</a><a href="mailto:a@b.com">Y</a>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert!(r.links.is_empty());
    }

    #[test]
    fn consecutive_anchors_without_close_are_both_captured() {
        let html = br#"<a href="/a">A<a href="/b">B</a>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.links.len(), 2);
        assert_eq!(r.links[0].target_url, "https://example.com/a");
        assert_eq!(r.links[0].anchor_text.as_deref(), Some("A"));
        assert_eq!(r.links[1].target_url, "https://example.com/b");
    }

    #[test]
    fn iframe_emitted_only_when_internal() {
        let html =
            br#"<iframe src="/inside"></iframe><iframe src="https://other.com/x"></iframe>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.links.len(), 1);
        assert_eq!(r.links[0].rel.as_deref(), Some("iframe"));
    }

    #[test]
    fn images_only_extracted_when_enabled() {
        let html = br#"<img src="/a.png" srcset="/b.png 1x, /c.png 2x" alt="x">"#;
        let off = extract(html, "https://example.com/", "example.com", false);
        assert!(off.links.is_empty());
        let on = extract(html, "https://example.com/", "example.com", true);
        assert_eq!(on.links.len(), 3);
    }

    #[test]
    fn html_lang_is_overridden_by_later_meta_language() {
        let html = br#"<html lang="en"><meta name="language" content="fr"></html>"#;
        let r = extract(html, "https://example.com/", "example.com", false);
        assert_eq!(r.language.as_deref(), Some("fr"));
    }

    #[test]
    fn inline_script_path_extraction_respects_cap_and_junk_filter() {
        let mut script_body = String::new();
        for i in 0..5 {
            script_body.push_str(&format!("\"/page-{i}\",\"/_next/static/chunk-{i}.js\","));
        }
        let html = format!("<script>{}</script>", script_body);
        let r = extract(html.as_bytes(), "https://example.com/", "example.com", false);
        assert_eq!(r.links.len(), 5);
        assert!(r.links.iter().all(|l| l.rel.as_deref() == Some("inline-js")));
    }
}
