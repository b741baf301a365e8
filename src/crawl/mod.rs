//! Bounded breadth-first crawl with response-size shaping.
//!
//! Grounded on `examples/original_source/app/mcp_server.py`'s
//! `_handle_get_content` multi-page path: BFS frontier, first-seen-order
//! slicing to `max_pages_per_level`, and "remove deepest pages, then
//! truncate the last page's text" shaping when the response would exceed
//! its byte budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::antidetect::AntiDetectionState;
use crate::extract::{ContentExtractor, Heading, ImageLink, PageLink};
use crate::fetch::{FetchEngine, FetchFailureKind};
use crate::robots::RobotsCache;

pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 3;
pub const MIN_PAGES_PER_LEVEL: u32 = 1;
pub const MAX_PAGES_PER_LEVEL: u32 = 20;
pub const MIN_TRUNCATED_PAGE_CHARS: usize = 2000;

const NOISE_LINE_MARKERS: &[&str] = &[
    "advertisement",
    "subscribe",
    "share this article",
    "sign up for our newsletter",
    "follow us on",
];

pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

pub fn clamp_max_pages_per_level(max_pages: u32) -> u32 {
    max_pages.clamp(MIN_PAGES_PER_LEVEL, MAX_PAGES_PER_LEVEL)
}

pub fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub depth: u32,
    pub max_pages_per_level: u32,
    pub selector: Option<String>,
    pub include_links: bool,
    pub include_images: bool,
    pub include_meta: bool,
    pub filter_noise: bool,
    pub check_robots: bool,
    pub timeout: Option<Duration>,
    pub antidetect: AntiDetectionState,
    pub rotate_user_agent: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            max_pages_per_level: 10,
            selector: None,
            include_links: true,
            include_images: true,
            include_meta: true,
            filter_noise: false,
            check_robots: true,
            timeout: None,
            antidetect: AntiDetectionState::default(),
            rotate_user_agent: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headings: Option<Vec<Heading>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<PageLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, String>>,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub depth: u32,
    pub error_code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CrawlSummary {
    pub total_pages: usize,
    pub total_text_length: usize,
    pub pages_by_depth: HashMap<u32, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    #[serde(flatten)]
    pub root: CrawledPage,
    pub pages: Vec<CrawledPage>,
    pub summary: CrawlSummary,
    pub failures: Vec<PageFailure>,
    pub truncated: bool,
    pub original_chars: Option<usize>,
    pub returned_chars: Option<usize>,
    pub pages_removed_for_limit: Option<usize>,
    pub pages_truncated_for_limit: Option<usize>,
}

/// Returned when the root page itself could not be fetched; the crawl
/// result is then nothing but this failure.
#[derive(Debug, Clone, Serialize)]
pub struct RootFetchFailure {
    pub url: String,
    pub error_code: &'static str,
    pub message: String,
}

pub struct Crawler {
    fetcher: Arc<FetchEngine>,
    robots: Arc<RobotsCache>,
}

impl Crawler {
    pub fn new(fetcher: Arc<FetchEngine>, robots: Arc<RobotsCache>) -> Self {
        Self { fetcher, robots }
    }

    pub async fn crawl(&self, start_url: &str, options: &CrawlOptions) -> Result<CrawlResult, RootFetchFailure> {
        let depth = clamp_depth(options.depth);
        let max_pages = clamp_max_pages_per_level(options.max_pages_per_level);

        let base_host = Url::parse(start_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![start_url.to_string()];
        let mut pages: Vec<CrawledPage> = Vec::new();
        let mut failures: Vec<PageFailure> = Vec::new();
        let mut pages_by_depth: HashMap<u32, usize> = HashMap::new();
        let mut root: Option<CrawledPage> = None;

        for level in 1..=depth {
            if frontier.is_empty() {
                break;
            }

            let mut next_candidates: Vec<String> = Vec::new();
            let mut seen_candidates: HashSet<String> = HashSet::new();

            for url in std::mem::take(&mut frontier) {
                let key = normalize(&url);
                if visited.contains(&key) {
                    continue;
                }
                visited.insert(key);

                let expand = level < depth;
                match self.fetch_single_page(&url, level, options, expand).await {
                    Ok((page, raw_links)) => {
                        if level == 1 && root.is_none() {
                            root = Some(page.clone());
                        }
                        *pages_by_depth.entry(level).or_insert(0) += 1;
                        pages.push(page);

                        if expand {
                            for link in raw_links {
                                if link.external {
                                    continue;
                                }
                                let Ok(link_url) = Url::parse(&link.url) else { continue };
                                if link_url.host_str().unwrap_or("") != base_host {
                                    continue;
                                }
                                let norm = normalize(&link.url);
                                if visited.contains(&norm) || !seen_candidates.insert(norm) {
                                    continue;
                                }
                                next_candidates.push(link.url);
                            }
                        }
                    }
                    Err(failure) => {
                        if level == 1 {
                            return Err(RootFetchFailure {
                                url: failure.url,
                                error_code: failure.error_code,
                                message: failure.message,
                            });
                        }
                        failures.push(failure);
                    }
                }
            }

            next_candidates.truncate(max_pages as usize);
            frontier = next_candidates;
        }

        let Some(root) = root else {
            return Err(RootFetchFailure {
                url: start_url.to_string(),
                error_code: "FETCH_ERROR",
                message: "no root page produced".to_string(),
            });
        };

        let total_text_length = pages.iter().map(|p| p.text.chars().count()).sum();
        let summary = CrawlSummary {
            total_pages: pages.len(),
            total_text_length,
            pages_by_depth,
        };

        Ok(CrawlResult {
            root,
            pages,
            summary,
            failures,
            truncated: false,
            original_chars: None,
            returned_chars: None,
            pages_removed_for_limit: None,
            pages_truncated_for_limit: None,
        })
    }

    async fn fetch_single_page(
        &self,
        url: &str,
        depth: u32,
        options: &CrawlOptions,
        need_links_for_frontier: bool,
    ) -> Result<(CrawledPage, Vec<PageLink>), PageFailure> {
        let parsed = Url::parse(url).map_err(|e| PageFailure {
            url: url.to_string(),
            depth,
            error_code: "INVALID_URL",
            message: e.to_string(),
        })?;

        if options.check_robots && !self.robots.is_allowed(&parsed).await {
            return Err(PageFailure {
                url: url.to_string(),
                depth,
                error_code: "ROBOTS_BLOCKED",
                message: "robots.txt disallows this path".to_string(),
            });
        }

        let result = self
            .fetcher
            .fetch(url, &options.antidetect, options.rotate_user_agent, &[], options.timeout)
            .await;

        if !result.success() {
            let kind = FetchFailureKind::classify(&result).unwrap_or(FetchFailureKind::FetchError);
            return Err(PageFailure {
                url: url.to_string(),
                depth,
                error_code: kind.as_code(),
                message: result.error.unwrap_or_else(|| format!("HTTP {}", result.status)),
            });
        }

        let extractor = ContentExtractor::new();
        let want_links = options.include_links || need_links_for_frontier;
        let extracted = extractor
            .extract(
                &result.body,
                &result.final_url,
                options.selector.as_deref(),
                want_links,
                options.include_images,
                options.include_meta,
            )
            .map_err(|e| PageFailure {
                url: url.to_string(),
                depth,
                error_code: e.error_code(),
                message: e.to_string(),
            })?;

        let raw_links = extracted.links.clone();
        let text = if options.filter_noise {
            strip_noise_lines(&extracted.text)
        } else {
            extracted.text
        };

        let page = CrawledPage {
            url: extracted.url,
            title: extracted.title,
            text,
            language: extracted.language,
            headings: if extracted.headings.is_empty() { None } else { Some(extracted.headings) },
            links: if options.include_links { Some(raw_links.clone()) } else { None },
            images: if extracted.images.is_empty() { None } else { Some(extracted.images) },
            meta: if extracted.meta.is_empty() { None } else { Some(extracted.meta) },
            depth,
        };

        Ok((page, raw_links))
    }
}

fn strip_noise_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let lower = line.trim().to_ascii_lowercase();
            !NOISE_LINE_MARKERS.iter().any(|marker| lower == *marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shrinks a crawl result to fit within `byte_budget` serialized bytes:
/// deepest pages are dropped first, then the last remaining page's text is
/// truncated at a sentence or newline boundary, never below
/// `MIN_TRUNCATED_PAGE_CHARS` characters (at which point the page is
/// dropped entirely instead).
pub fn shape_to_budget(result: &mut CrawlResult, byte_budget: usize) {
    let original_chars: usize = result.root.text.chars().count() + result.pages.iter().map(|p| p.text.chars().count()).sum::<usize>();

    if serialized_len(result) <= byte_budget {
        return;
    }

    let mut pages_removed = 0usize;
    while serialized_len(result) > byte_budget && !result.pages.is_empty() {
        let deepest_depth = result.pages.iter().map(|p| p.depth).max().unwrap_or(0);
        if let Some(pos) = result.pages.iter().rposition(|p| p.depth == deepest_depth) {
            result.pages.remove(pos);
            pages_removed += 1;
        } else {
            break;
        }
    }

    let mut pages_truncated = 0usize;
    if serialized_len(result) > byte_budget {
        let overshoot = serialized_len(result).saturating_sub(byte_budget);
        let target_page = result.pages.last_mut().unwrap_or(&mut result.root);
        let current_chars = target_page.text.chars().count();
        let target_chars = current_chars.saturating_sub(overshoot).max(MIN_TRUNCATED_PAGE_CHARS);

        if target_chars >= current_chars || target_chars < MIN_TRUNCATED_PAGE_CHARS {
            if !result.pages.is_empty() {
                result.pages.pop();
                pages_removed += 1;
            }
        } else {
            target_page.text = truncate_at_boundary(&target_page.text, target_chars);
            pages_truncated += 1;
        }
    }

    let returned_chars = result.root.text.chars().count() + result.pages.iter().map(|p| p.text.chars().count()).sum::<usize>();

    result.truncated = true;
    result.original_chars = Some(original_chars);
    result.returned_chars = Some(returned_chars);
    result.pages_removed_for_limit = Some(pages_removed);
    result.pages_truncated_for_limit = Some(pages_truncated);
}

fn serialized_len(result: &CrawlResult) -> usize {
    serde_json::to_vec(result).map(|v| v.len()).unwrap_or(usize::MAX)
}

fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    let boundary = truncated
        .rfind(". ")
        .or_else(|| truncated.rfind('\n'))
        .map(|idx| idx + 1)
        .unwrap_or(truncated.len());
    truncated[..boundary.min(truncated.len())].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_and_max_pages_clamp_to_bounds() {
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(10), 3);
        assert_eq!(clamp_max_pages_per_level(0), 1);
        assert_eq!(clamp_max_pages_per_level(100), 20);
    }

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize("https://example.com/a/"), "https://example.com/a");
        assert_eq!(normalize("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn noise_lines_are_stripped() {
        let text = "Real content\nAdvertisement\nMore content\nSubscribe\n";
        let stripped = strip_noise_lines(text);
        assert!(!stripped.to_ascii_lowercase().contains("advertisement"));
        assert!(stripped.contains("Real content"));
    }

    #[test]
    fn truncate_at_boundary_prefers_sentence_end() {
        let text = "First sentence. Second sentence. Third sentence that runs long.";
        let truncated = truncate_at_boundary(text, 30);
        assert!(truncated.ends_with('.'));
    }
}
