use std::collections::HashMap;

use ego_tree::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use url::Url;

use super::ExtractError;

const REMOVE_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg", "canvas"];

const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main-content",
    ".content",
    ".main-content",
    ".post-content",
    ".article-content",
];

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static EXCESS_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

#[derive(Debug, Clone, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
    pub title: String,
    pub external: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageLink {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ExtractedContent {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub headings: Vec<Heading>,
    pub links: Vec<PageLink>,
    pub images: Vec<ImageLink>,
    pub meta: HashMap<String, String>,
    pub language: Option<String>,
}

pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts title, text, headings, links, images, and metadata from
    /// `html`. When `selector` is given, text/headings/links/images are
    /// scoped to the first matching element; title/language/meta are always
    /// read from the whole document, matching the teacher's behavior.
    pub fn extract(
        &self,
        html: &str,
        url: &str,
        selector: Option<&str>,
        include_links: bool,
        include_images: bool,
        include_meta: bool,
    ) -> Result<ExtractedContent, ExtractError> {
        let document = Html::parse_document(html);

        let title = extract_title(&document);
        let language = extract_language(&document);
        let meta = if include_meta { extract_meta(&document) } else { HashMap::new() };

        let scope_root: NodeRef<'_, Node> = match selector {
            None => *document.root_element(),
            Some(sel) => {
                let parsed = Selector::parse(sel).map_err(|e| ExtractError::InvalidSelector {
                    selector: sel.to_string(),
                    message: format!("{e:?}"),
                })?;
                let found = document
                    .select(&parsed)
                    .next()
                    .ok_or_else(|| ExtractError::SelectorNotFound {
                        selector: sel.to_string(),
                    })?;
                *found
            }
        };

        let text = extract_text(scope_root);
        let headings = extract_headings(scope_root);
        let links = if include_links {
            extract_links(scope_root, url)
        } else {
            Vec::new()
        };
        let images = if include_images {
            extract_images(scope_root, url)
        } else {
            Vec::new()
        };

        Ok(ExtractedContent {
            url: url.to_string(),
            title,
            text,
            headings,
            links,
            images,
            meta,
            language,
        })
    }

    /// Best-effort "reader mode": tries a short list of common main-content
    /// selectors in order, falling back to `<body>` and then the whole
    /// document.
    pub fn extract_main_content(&self, html: &str, url: &str) -> Result<ExtractedContent, ExtractError> {
        let document = Html::parse_document(html);

        let mut main_element: Option<ElementRef<'_>> = None;
        for selector_text in MAIN_CONTENT_SELECTORS {
            if let Ok(parsed) = Selector::parse(selector_text) {
                if let Some(found) = document.select(&parsed).next() {
                    main_element = Some(found);
                    break;
                }
            }
        }

        let body_selector = Selector::parse("body").unwrap();
        let main_element = main_element
            .or_else(|| document.select(&body_selector).next())
            .unwrap_or_else(|| document.root_element());

        let scope_root: NodeRef<'_, Node> = *main_element;

        Ok(ExtractedContent {
            url: url.to_string(),
            title: extract_title(&document),
            text: extract_text(scope_root),
            headings: extract_headings(scope_root),
            links: extract_links(scope_root, url),
            images: extract_images(scope_root, url),
            meta: extract_meta(&document),
            language: extract_language(&document),
        })
    }

    /// Extracts and concatenates the text of every element matching
    /// `selector`, joined by a blank line.
    pub fn extract_by_selector(&self, html: &str, selector: &str, url: &str) -> Result<ExtractedContent, ExtractError> {
        let document = Html::parse_document(html);
        let parsed = Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{e:?}"),
        })?;

        let pieces: Vec<String> = document
            .select(&parsed)
            .map(|el| extract_text(*el))
            .filter(|t| !t.is_empty())
            .collect();

        if pieces.is_empty() {
            return Err(ExtractError::SelectorNotFound {
                selector: selector.to_string(),
            });
        }

        Ok(ExtractedContent {
            url: url.to_string(),
            title: extract_title(&document),
            text: pieces.join("\n\n"),
            language: extract_language(&document),
            ..Default::default()
        })
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn should_skip(tag: &str) -> bool {
    REMOVE_TAGS.contains(&tag)
}

fn collect_text_pieces<'a>(node: NodeRef<'a, Node>, out: &mut Vec<String>) {
    match node.value() {
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        Node::Element(el) => {
            if should_skip(el.name()) {
                return;
            }
            for child in node.children() {
                collect_text_pieces(child, out);
            }
        }
        _ => {
            for child in node.children() {
                collect_text_pieces(child, out);
            }
        }
    }
}

fn extract_text(node: NodeRef<'_, Node>) -> String {
    let mut pieces = Vec::new();
    collect_text_pieces(node, &mut pieces);
    let joined = pieces.join("\n");
    let collapsed_newlines = EXCESS_NEWLINES.replace_all(&joined, "\n\n");
    let collapsed_spaces = EXCESS_SPACES.replace_all(&collapsed_newlines, " ");
    collapsed_spaces.trim().to_string()
}

fn flat_text(node: NodeRef<'_, Node>) -> String {
    let mut pieces = Vec::new();
    collect_text_pieces(node, &mut pieces);
    pieces.join("")
}

fn extract_title(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("title") {
        if let Some(el) = document.select(&selector).next() {
            let text = flat_text(*el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    if let Ok(selector) = Selector::parse("h1") {
        if let Some(el) = document.select(&selector).next() {
            let text = flat_text(*el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_language(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("html") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(lang) = el.value().attr("lang") {
                if !lang.is_empty() {
                    return Some(lang.to_string());
                }
            }
        }
    }
    if let Ok(selector) = Selector::parse("meta[http-equiv]") {
        for el in document.select(&selector) {
            let is_content_language = el
                .value()
                .attr("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("content-language"))
                .unwrap_or(false);
            if is_content_language {
                if let Some(content) = el.value().attr("content") {
                    if !content.is_empty() {
                        return Some(content.to_string());
                    }
                }
            }
        }
    }
    None
}

fn extract_meta(document: &Html) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    let Ok(selector) = Selector::parse("meta[content]") else {
        return meta;
    };
    for el in document.select(&selector) {
        let name = el.value().attr("name").or_else(|| el.value().attr("property"));
        let content = el.value().attr("content");
        if let (Some(name), Some(content)) = (name, content) {
            meta.insert(name.to_string(), content.to_string());
        }
    }
    meta
}

fn extract_headings(scope: NodeRef<'_, Node>) -> Vec<Heading> {
    let mut headings = Vec::new();
    for level in 1..=6u8 {
        let selector_text = format!("h{level}");
        let Ok(selector) = Selector::parse(&selector_text) else {
            continue;
        };
        for el in select_within(scope, &selector) {
            let text = flat_text(*el);
            if !text.is_empty() {
                headings.push(Heading { level, text });
            }
        }
    }
    headings
}

fn extract_links(scope: NodeRef<'_, Node>, base_url: &str) -> Vec<PageLink> {
    let mut links = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };
    let base = Url::parse(base_url).ok();

    for el in select_within(scope, &selector) {
        let Some(href) = el.value().attr("href") else { continue };
        if href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }

        let resolved = resolve_url(base.as_ref(), href);
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let text = flat_text(*el);
        let title = el.value().attr("title").unwrap_or("").to_string();
        let external = is_external(base.as_ref(), &resolved);

        links.push(PageLink {
            url: resolved,
            text,
            title,
            external,
        });
    }
    links
}

fn extract_images(scope: NodeRef<'_, Node>, base_url: &str) -> Vec<ImageLink> {
    let mut images = Vec::new();
    let Ok(selector) = Selector::parse("img[src]") else {
        return images;
    };
    let base = Url::parse(base_url).ok();

    for el in select_within(scope, &selector) {
        let Some(src) = el.value().attr("src") else { continue };
        let resolved = resolve_url(base.as_ref(), src);
        let alt = el.value().attr("alt").unwrap_or("").to_string();
        images.push(ImageLink { url: resolved, alt });
    }
    images
}

pub(super) fn select_within<'a>(scope: NodeRef<'a, Node>, selector: &'a Selector) -> Vec<ElementRef<'a>> {
    match ElementRef::wrap(scope) {
        Some(el) => el.select(selector).collect(),
        None => Vec::new(),
    }
}

pub(super) fn resolve_url(base: Option<&Url>, href: &str) -> String {
    match base {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

pub(super) fn is_external(base: Option<&Url>, resolved: &str) -> bool {
    let Some(base) = base else { return false };
    let Ok(resolved_url) = Url::parse(resolved) else {
        return false;
    };
    match resolved_url.host_str() {
        Some(host) => !host.is_empty() && (host != base.host_str().unwrap_or("") || resolved_url.port() != base.port()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html lang="en">
        <head><title>Example Page</title><meta name="description" content="A sample"></head>
        <body>
            <script>var x = 1;</script>
            <main>
                <h1>Welcome</h1>
                <p>Hello <a href="/about">About</a> and <a href="https://other.example/x">External</a>.</p>
                <img src="/logo.png" alt="Logo">
            </main>
        </body>
        </html>
    "#;

    #[test]
    fn extracts_title_language_and_meta() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract(SAMPLE, "https://example.com/page", None, true, true, true).unwrap();
        assert_eq!(content.title.as_deref(), Some("Example Page"));
        assert_eq!(content.language.as_deref(), Some("en"));
        assert_eq!(content.meta.get("description").map(String::as_str), Some("A sample"));
    }

    #[test]
    fn strips_script_tag_content() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract(SAMPLE, "https://example.com/page", None, true, true, true).unwrap();
        assert!(!content.text.contains("var x"));
        assert!(content.text.contains("Welcome"));
    }

    #[test]
    fn links_resolve_and_classify_external() {
        let extractor = ContentExtractor::new();
        let content = extractor.extract(SAMPLE, "https://example.com/page", None, true, true, true).unwrap();
        let about = content.links.iter().find(|l| l.url.ends_with("/about")).unwrap();
        assert!(!about.external);
        let external = content.links.iter().find(|l| l.url.contains("other.example")).unwrap();
        assert!(external.external);
    }

    #[test]
    fn unmatched_selector_is_an_error() {
        let extractor = ContentExtractor::new();
        let err = extractor
            .extract(SAMPLE, "https://example.com/page", Some("#does-not-exist"), true, true, true)
            .unwrap_err();
        assert_eq!(err.error_code(), "SELECTOR_NOT_FOUND");
    }
}
