use std::collections::HashSet;

use scraper::{Html, Node, Selector};
use serde::Serialize;
use url::Url;

use super::content::{is_external, resolve_url, select_within};
use super::ExtractError;

const SECTION_TAGS: &[&str] = &["header", "nav", "main", "article", "section", "aside", "footer"];
const NAV_CLASSES: &[&str] = &["nav", "navigation", "menu", "navbar", "header-nav", "main-nav"];
const NAV_IDS: &[&str] = &["nav", "navigation", "main-nav", "menu"];

const PREVIEW_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct PageSection {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub heading: Option<String>,
    pub links_count: usize,
    pub text_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavLink {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub field_type: String,
    pub name: Option<String>,
    pub id: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormInfo {
    pub id: Option<String>,
    pub action: String,
    pub method: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlineEntry {
    pub level: u8,
    pub text: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PageStructure {
    pub url: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub sections: Vec<PageSection>,
    pub navigation: Vec<NavLink>,
    pub internal_links: Vec<NavLink>,
    pub external_links: Vec<NavLink>,
    pub meta: std::collections::HashMap<String, String>,
    pub forms: Vec<FormInfo>,
    pub outline: Vec<OutlineEntry>,
}

pub struct StructureAnalyzer;

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, html: &str, url: &str) -> Result<PageStructure, ExtractError> {
        let document = Html::parse_document(html);

        let title = extract_title(&document);
        let language = extract_language(&document);
        let meta = extract_meta(&document);
        let sections = find_sections(&document);
        let navigation = extract_navigation(&document, url);
        let (internal_links, external_links) = categorize_links(&document, url);
        let forms = find_forms(&document);
        let outline = build_outline(&document);

        Ok(PageStructure {
            url: url.to_string(),
            title,
            language,
            sections,
            navigation,
            internal_links,
            external_links,
            meta,
            forms,
            outline,
        })
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn node_text(el: scraper::ElementRef<'_>, sep: &str) -> String {
    let mut pieces = Vec::new();
    collect_plain_text(*el, &mut pieces);
    pieces.join(sep)
}

fn collect_plain_text(node: ego_tree::NodeRef<'_, Node>, out: &mut Vec<String>) {
    match node.value() {
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        _ => {
            for child in node.children() {
                collect_plain_text(child, out);
            }
        }
    }
}

fn extract_title(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("title") {
        if let Some(el) = document.select(&selector).next() {
            let text = node_text(el, "");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    if let Ok(selector) = Selector::parse("h1") {
        if let Some(el) = document.select(&selector).next() {
            let text = node_text(el, "");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn extract_language(document: &Html) -> Option<String> {
    let selector = Selector::parse("html").ok()?;
    let el = document.select(&selector).next()?;
    el.value().attr("lang").filter(|l| !l.is_empty()).map(str::to_string)
}

fn extract_meta(document: &Html) -> std::collections::HashMap<String, String> {
    let mut meta = std::collections::HashMap::new();
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

fn find_sections(document: &Html) -> Vec<PageSection> {
    let mut sections = Vec::new();
    for tag_name in SECTION_TAGS {
        let Ok(selector) = Selector::parse(tag_name) else { continue };
        for el in document.select(&selector) {
            let classes = el
                .value()
                .attr("class")
                .map(|c| c.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            let heading = find_section_heading(el);
            let link_selector = Selector::parse("a").unwrap();
            let links_count = select_within(*el, &link_selector).len();

            sections.push(PageSection {
                tag: tag_name.to_string(),
                id: el.value().attr("id").map(str::to_string),
                classes,
                heading,
                links_count,
                text_preview: text_preview(el),
            });
        }
    }
    sections
}

fn find_section_heading(el: scraper::ElementRef<'_>) -> Option<String> {
    for level in 1..=6u8 {
        let selector_text = format!("h{level}");
        let Ok(selector) = Selector::parse(&selector_text) else { continue };
        if let Some(heading) = select_within(*el, &selector).into_iter().next() {
            let text = node_text(heading, "");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn text_preview(el: scraper::ElementRef<'_>) -> String {
    let text = node_text(el, " ");
    if text.chars().count() > PREVIEW_MAX_LEN {
        let truncated: String = text.chars().take(PREVIEW_MAX_LEN).collect();
        format!("{truncated}...")
    } else {
        text
    }
}

fn extract_navigation(document: &Html, base_url: &str) -> Vec<NavLink> {
    let mut nav_elements = Vec::new();
    if let Ok(selector) = Selector::parse("nav") {
        nav_elements.extend(document.select(&selector));
    }
    for class_name in NAV_CLASSES {
        if let Ok(selector) = Selector::parse(&format!(".{class_name}")) {
            nav_elements.extend(document.select(&selector));
        }
    }
    for id_name in NAV_IDS {
        if let Ok(selector) = Selector::parse(&format!("#{id_name}")) {
            if let Some(el) = document.select(&selector).next() {
                nav_elements.push(el);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let base = Url::parse(base_url).ok();
    let link_selector = Selector::parse("a[href]").unwrap();

    for nav in nav_elements {
        for link in select_within(*nav, &link_selector) {
            let Some(href) = link.value().attr("href") else { continue };
            if href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            let resolved = resolve_url(base.as_ref(), href);
            if !seen.insert(resolved.clone()) {
                continue;
            }
            links.push(NavLink {
                url: resolved,
                text: node_text(link, ""),
            });
        }
    }
    links
}

fn categorize_links(document: &Html, base_url: &str) -> (Vec<NavLink>, Vec<NavLink>) {
    let mut internal = Vec::new();
    let mut external = Vec::new();
    let mut seen = HashSet::new();
    let base = Url::parse(base_url).ok();

    let Ok(selector) = Selector::parse("a[href]") else {
        return (internal, external);
    };

    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else { continue };
        if href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let resolved = resolve_url(base.as_ref(), href);
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let info = NavLink {
            url: resolved.clone(),
            text: node_text(link, ""),
        };

        if is_external(base.as_ref(), &resolved) {
            external.push(info);
        } else {
            internal.push(info);
        }
    }

    (internal, external)
}

fn find_forms(document: &Html) -> Vec<FormInfo> {
    let mut forms = Vec::new();
    let Ok(form_selector) = Selector::parse("form") else {
        return forms;
    };
    let Ok(field_selector) = Selector::parse("input, textarea, select") else {
        return forms;
    };

    for form in document.select(&form_selector) {
        let method = form
            .value()
            .attr("method")
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        let mut fields = Vec::new();
        for input in select_within(*form, &field_selector) {
            let tag_name = input.value().name();
            let field_type = if tag_name == "input" {
                input.value().attr("type").unwrap_or("text").to_string()
            } else {
                tag_name.to_string()
            };
            fields.push(FormField {
                field_type,
                name: input.value().attr("name").map(str::to_string),
                id: input.value().attr("id").map(str::to_string),
                required: input.value().attr("required").is_some(),
            });
        }

        forms.push(FormInfo {
            id: form.value().attr("id").map(str::to_string),
            action: form.value().attr("action").unwrap_or("").to_string(),
            method,
            fields,
        });
    }
    forms
}

fn build_outline(document: &Html) -> Vec<OutlineEntry> {
    let mut outline = Vec::new();
    for level in 1..=6u8 {
        let selector_text = format!("h{level}");
        let Ok(selector) = Selector::parse(&selector_text) else { continue };
        for heading in document.select(&selector) {
            let text = node_text(heading, "");
            if !text.is_empty() {
                outline.push(OutlineEntry {
                    level,
                    text,
                    id: heading.value().attr("id").map(str::to_string),
                });
            }
        }
    }
    outline
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html lang="en">
        <head><title>Site</title></head>
        <body>
            <nav class="main-nav"><a href="/home">Home</a><a href="/about">About</a></nav>
            <main>
                <h1>Welcome</h1>
                <article><h2>Section</h2><p>Text <a href="https://other.example/">Other</a></p></article>
                <form id="signup" method="post"><input type="email" name="email" required></form>
            </main>
        </body>
        </html>
    "#;

    #[test]
    fn finds_semantic_sections_with_headings() {
        let analyzer = StructureAnalyzer::new();
        let structure = analyzer.analyze(SAMPLE, "https://example.com/").unwrap();
        let article = structure.sections.iter().find(|s| s.tag == "article").unwrap();
        assert_eq!(article.heading.as_deref(), Some("Section"));
    }

    #[test]
    fn navigation_links_are_deduped_and_resolved() {
        let analyzer = StructureAnalyzer::new();
        let structure = analyzer.analyze(SAMPLE, "https://example.com/").unwrap();
        assert_eq!(structure.navigation.len(), 2);
        assert!(structure.navigation.iter().any(|l| l.url == "https://example.com/home"));
    }

    #[test]
    fn links_are_categorized_internal_vs_external() {
        let analyzer = StructureAnalyzer::new();
        let structure = analyzer.analyze(SAMPLE, "https://example.com/").unwrap();
        assert!(structure.external_links.iter().any(|l| l.url.contains("other.example")));
        assert!(structure.internal_links.iter().any(|l| l.url.ends_with("/home")));
    }

    #[test]
    fn forms_report_required_fields() {
        let analyzer = StructureAnalyzer::new();
        let structure = analyzer.analyze(SAMPLE, "https://example.com/").unwrap();
        let form = &structure.forms[0];
        assert_eq!(form.method, "POST");
        assert!(form.fields[0].required);
    }

    #[test]
    fn outline_groups_by_heading_level() {
        let analyzer = StructureAnalyzer::new();
        let structure = analyzer.analyze(SAMPLE, "https://example.com/").unwrap();
        assert_eq!(structure.outline[0].level, 1);
        assert_eq!(structure.outline[1].level, 2);
    }
}
