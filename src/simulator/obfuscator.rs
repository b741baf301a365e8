//! Content obfuscation for recorded fixtures.
//!
//! Grounded on `examples/original_source/simulator/recording/obfuscator.py`:
//! three scrubbing passes over raw HTML so recorded fixtures preserve DOM
//! structure (tags, attributes, classes, IDs — CSS selectors and extraction
//! logic keep working against them) while containing no PII, no copyrighted
//! prose, and no real media payloads.
//!
//! 1. `scrub_pii`   — redact emails and phone numbers.
//! 2. `scrub_text`  — replace visible text nodes with length-matched lorem ipsum.
//! 3. `scrub_media` — replace `<img>` `src`/`srcset` with an inline placeholder SVG.

use once_cell::sync::Lazy;
use regex::Regex;

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do", "eiusmod", "tempor",
    "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim", "ad", "minim", "veniam", "quis",
    "nostrud", "exercitation", "ullamco", "laboris", "nisi", "aliquip", "ex", "ea", "commodo", "consequat", "duis",
    "aute", "irure", "in", "reprehenderit", "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur",
    "excepteur", "sint", "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est", "laborum",
];

const PLACEHOLDER_SVG: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' \
width='400' height='300'%3E%3Crect width='100%25' height='100%25' \
fill='%23ddd'/%3E%3Ctext x='50%25' y='50%25' dominant-baseline='middle' \
text-anchor='middle' fill='%23999' font-size='18'%3Eplaceholder%3C/text%3E%3C/svg%3E";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap());

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[\s\-.]?)?(?:\(?\d{2,4}\)?[\s\-.]?)\d{3,4}[\s\-.]?\d{3,4}").unwrap()
});

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)(<img\b[^>]*?\bsrc\s*=\s*)("[^"]*"|'[^']*')"#).unwrap());
static IMG_SRCSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)(<img\b[^>]*?\bsrcset\s*=\s*)("[^"]*"|'[^']*')"#).unwrap());

const PRESERVE_TEXT_TAGS: &[&str] = &["script", "style", "code", "pre", "textarea", "noscript", "template"];

/// Full pipeline: PII redaction, then text replacement, then media
/// replacement. Output is valid HTML with the same DOM shape.
pub fn obfuscate(html: &str) -> String {
    let scrubbed = scrub_pii(html);
    let scrubbed = scrub_text(&scrubbed);
    scrub_media(&scrubbed)
}

/// Replace email addresses and phone numbers with same-length redactions.
pub fn scrub_pii(text: &str) -> String {
    let after_email = EMAIL_RE.replace_all(text, |caps: &regex::Captures| "x".repeat(caps[0].len()));
    PHONE_RE
        .replace_all(&after_email, |caps: &regex::Captures| {
            caps[0].chars().map(|c| if c.is_ascii_digit() { '0' } else { c }).collect::<String>()
        })
        .into_owned()
}

/// Replace visible text nodes with deterministic, length-matched lorem
/// ipsum while preserving tags, attributes, and the content of
/// script/style/code/pre/textarea/noscript/template elements.
pub fn scrub_text(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut tag_stack: Vec<String> = Vec::new();
    let bytes = html.as_bytes();
    let mut i = 0;
    let mut text_run_start = 0;

    let flush_text = |output: &mut String, run: &str, tag_stack: &[String]| {
        if run.is_empty() {
            return;
        }
        let in_preserved = tag_stack.iter().any(|t| PRESERVE_TEXT_TAGS.contains(&t.as_str()));
        if in_preserved || run.trim().is_empty() {
            output.push_str(run);
        } else {
            output.push_str(&lorem_for_length(run.chars().count(), run));
        }
    };

    while i < bytes.len() {
        if bytes[i] == b'<' {
            flush_text(&mut output, &html[text_run_start..i], &tag_stack);
            let Some(end_rel) = html[i..].find('>') else {
                // Unterminated tag at end of document: copy the rest verbatim.
                output.push_str(&html[i..]);
                i = bytes.len();
                text_run_start = i;
                break;
            };
            let end = i + end_rel + 1;
            let tag_text = &html[i..end];
            output.push_str(tag_text);
            update_tag_stack(tag_text, &mut tag_stack);
            i = end;
            text_run_start = i;
        } else {
            i += 1;
        }
    }
    flush_text(&mut output, &html[text_run_start..i], &tag_stack);

    output
}

fn update_tag_stack(tag_text: &str, tag_stack: &mut Vec<String>) {
    let inner = tag_text.trim_start_matches('<').trim_end_matches('>');
    if inner.starts_with('!') || inner.starts_with('?') {
        return; // comment/doctype/processing instruction
    }
    if let Some(name) = inner.strip_prefix('/') {
        let name = first_token(name).to_ascii_lowercase();
        if tag_stack.last().map(|t| t.as_str()) == Some(name.as_str()) {
            tag_stack.pop();
        } else if let Some(pos) = tag_stack.iter().rposition(|t| t == &name) {
            tag_stack.truncate(pos);
        }
        return;
    }
    if inner.ends_with('/') {
        return; // self-closing, no push
    }
    let name = first_token(inner).to_ascii_lowercase();
    const VOID_ELEMENTS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
    ];
    if !VOID_ELEMENTS.contains(&name.as_str()) {
        tag_stack.push(name);
    }
}

fn first_token(s: &str) -> &str {
    let end = s.find(|c: char| c.is_whitespace() || c == '/').unwrap_or(s.len());
    &s[..end]
}

fn lorem_for_length(length: usize, seed: &str) -> String {
    if length == 0 {
        return String::new();
    }
    let seed_hash = fnv1a(seed.as_bytes());
    let pool_len = LOREM_WORDS.len();
    let mut idx = (seed_hash as usize) % pool_len;

    let mut words: Vec<&str> = Vec::new();
    let mut char_count = 0usize;
    loop {
        let word = LOREM_WORDS[idx % pool_len];
        let extra = if words.is_empty() { 0 } else { 1 };
        if char_count + word.len() + extra > length + 5 {
            break;
        }
        if !words.is_empty() {
            char_count += 1;
        }
        words.push(word);
        char_count += word.len();
        idx += 1;
        if char_count >= length {
            break;
        }
    }

    let mut result = words.join(" ");
    if result.chars().count() > length {
        result = result.chars().take(length).collect::<String>().trim_end().to_string();
    } else if result.chars().count() < length {
        let pad = length - result.chars().count();
        result.push_str(&" ".repeat(pad));
    }
    result
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Replace `<img>` `src`/`srcset` attribute values with an inline
/// placeholder SVG data URL.
pub fn scrub_media(html: &str) -> String {
    let after_src = IMG_SRC_RE.replace_all(html, |caps: &regex::Captures| format!("{}\"{}\"", &caps[1], PLACEHOLDER_SVG));
    IMG_SRCSET_RE
        .replace_all(&after_src, |caps: &regex::Captures| format!("{}\"{}\"", &caps[1], PLACEHOLDER_SVG))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_pii_redacts_emails_and_phones() {
        let input = "Contact jane.doe@example.com or +1 415-555-0100 for details.";
        let out = scrub_pii(input);
        assert!(!out.contains("jane.doe@example.com"));
        assert!(!out.contains("415-555-0100"));
        assert!(out.contains("xxxxxxxxxxxxxxxxxxxxx") || out.contains('x'));
    }

    #[test]
    fn scrub_text_preserves_tags_and_script_bodies() {
        let input = r#"<div class="headline" id="h1">Meituan warns on margins</div><script>var x = 1;</script>"#;
        let out = scrub_text(input);
        assert!(out.contains(r#"<div class="headline" id="h1">"#));
        assert!(out.contains("<script>var x = 1;</script>"));
        assert!(!out.contains("Meituan warns on margins"));
    }

    #[test]
    fn scrub_text_is_deterministic() {
        let input = "<p>Some real sentence here.</p>";
        assert_eq!(scrub_text(input), scrub_text(input));
    }

    #[test]
    fn scrub_text_preserves_whitespace_only_nodes() {
        let input = "<div>\n  <span>Hi</span>\n</div>";
        let out = scrub_text(input);
        assert!(out.starts_with("<div>\n  <span>"));
    }

    #[test]
    fn scrub_media_replaces_img_src_and_srcset() {
        let input = r#"<img src="https://cdn.example.com/photo.jpg" srcset="a.jpg 1x, b.jpg 2x">"#;
        let out = scrub_media(input);
        assert!(!out.contains("cdn.example.com"));
        assert!(out.contains("data:image/svg+xml"));
    }

    #[test]
    fn obfuscate_runs_all_three_passes() {
        let input = r#"<div>Email me at a@b.com</div><img src="http://x.test/p.png">"#;
        let out = obfuscate(input);
        assert!(!out.contains("a@b.com"));
        assert!(!out.contains("x.test/p.png"));
        assert!(out.contains("<div>"));
    }
}
