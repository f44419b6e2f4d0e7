//! Recursive same-site crawler.
//!
//! Breadth-first traversal from a seed URL, bounded by depth and page
//! budget. A single page failure is logged and skipped; the crawl only
//! fails when the seed is malformed or no page yields any content.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::html;
use crate::core::errors::PipelineError;

const USER_AGENT: &str = concat!("corpora-backend/", env!("CARGO_PKG_VERSION"));

fn default_max_depth() -> usize {
    2
}

fn default_max_pages() -> usize {
    50
}

fn default_exclude_dirs() -> Vec<String> {
    ["/admin", "/login", "/register", "/api-docs", "/docs/api"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_same_domain() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

/// Crawl configuration, deserializable from a request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlOptions {
    pub max_depth: usize,
    pub max_pages: usize,
    pub exclude_dirs: Vec<String>,
    pub same_domain_only: bool,
    pub timeout_secs: u64,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            exclude_dirs: default_exclude_dirs(),
            same_domain_only: default_same_domain(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One successfully crawled page.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub title: String,
    pub text: String,
}

pub struct Crawler {
    client: reqwest::Client,
}

impl Crawler {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Fetch(err.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch one page and convert it to text. Used for single-page ingestion.
    pub async fn fetch_page_text(&self, url: &Url) -> Result<String, PipelineError> {
        let html = self.fetch(url).await?;
        Ok(html::html_to_text(&html))
    }

    /// Breadth-first crawl from `seed` under `options`.
    pub async fn crawl(
        &self,
        seed: &str,
        options: &CrawlOptions,
    ) -> Result<Vec<CrawledPage>, PipelineError> {
        let seed_url = parse_seed(seed)?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Url, usize)> = VecDeque::new();
        let mut pages: Vec<CrawledPage> = Vec::new();

        visited.insert(normalized(&seed_url));
        queue.push_back((seed_url.clone(), 0));

        while let Some((url, depth)) = queue.pop_front() {
            if pages.len() >= options.max_pages {
                break;
            }

            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(err) => {
                    tracing::warn!(%url, "skipping page: {err}");
                    continue;
                }
            };

            let (text, links) = convert_page(&html, &url);
            if !text.trim().is_empty() {
                pages.push(CrawledPage {
                    url: url.to_string(),
                    title: title_from_url(&url),
                    text,
                });
            } else {
                tracing::debug!(%url, "page produced no text");
            }

            if depth < options.max_depth {
                for link in links {
                    if !eligible(&seed_url, &link, options) {
                        continue;
                    }
                    if visited.insert(normalized(&link)) {
                        queue.push_back((link, depth + 1));
                    }
                }
            }
        }

        if pages.is_empty() {
            return Err(PipelineError::NoContentExtracted(seed.to_string()));
        }

        tracing::info!(seed, pages = pages.len(), "crawl finished");
        Ok(pages)
    }

    async fn fetch(&self, url: &Url) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| PipelineError::Fetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|err| PipelineError::Fetch(err.to_string()))
    }
}

/// HTML parsing is not `Send`; keep it inside a sync helper so the parsed
/// document never lives across an await point.
fn convert_page(html: &str, base: &Url) -> (String, Vec<Url>) {
    (html::html_to_text(html), html::extract_links(html, base))
}

fn parse_seed(seed: &str) -> Result<Url, PipelineError> {
    let url =
        Url::parse(seed).map_err(|err| PipelineError::InvalidUrl(format!("{seed}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::InvalidUrl(format!(
            "{seed}: unsupported scheme"
        )));
    }
    if url.host_str().is_none() {
        return Err(PipelineError::InvalidUrl(format!("{seed}: missing host")));
    }
    Ok(url)
}

fn normalized(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    let trimmed = url.to_string();
    trimmed.trim_end_matches('/').to_string()
}

fn eligible(seed: &Url, candidate: &Url, options: &CrawlOptions) -> bool {
    if !matches!(candidate.scheme(), "http" | "https") {
        return false;
    }
    if options.same_domain_only && candidate.host_str() != seed.host_str() {
        return false;
    }
    let path = candidate.path();
    !options
        .exclude_dirs
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

/// Derive a page title from its URL.
///
/// Root path becomes "{host} - Home"; otherwise the last path segment with
/// separators replaced, extension stripped, and words capitalized.
pub fn title_from_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or("site");

    let segment = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .last();

    match segment {
        None => format!("{host} - Home"),
        Some(segment) => {
            let stem = segment.rsplit_once('.').map(|(s, _)| s).unwrap_or(segment);
            let words: Vec<String> = stem
                .split(['-', '_'])
                .filter(|w| !w.is_empty())
                .map(capitalize)
                .collect();
            if words.is_empty() {
                format!("{host} - Home")
            } else {
                format!("{host} - {}", words.join(" "))
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
