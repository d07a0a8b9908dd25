// Candidate paper feeds. Fetch failures degrade to an empty batch.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::FeedSection;
use crate::types::PaperStub;

/// A source of candidate papers.
#[async_trait::async_trait]
pub trait PaperFeed: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch the current candidates. Never fails; an unreachable feed yields
    /// an empty list.
    async fn fetch(&self) -> Vec<PaperStub>;
}

// ── Hugging Face daily papers ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DailyItem {
    #[serde(default)]
    paper: Option<DailyPaper>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyPaper {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<DailyAuthor>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published_at: String,
}

#[derive(Debug, Deserialize)]
struct DailyAuthor {
    #[serde(default)]
    name: String,
}

/// Join author names for display, eliding past `max`.
pub fn format_authors<'a>(names: impl IntoIterator<Item = &'a str>, max: usize) -> String {
    let names: Vec<&str> = names.into_iter().collect();
    let mut out = names.iter().take(max).copied().collect::<Vec<_>>().join(", ");
    if names.len() > max {
        out.push_str(", et al.");
    }
    out
}

/// Parse the Hugging Face `daily_papers` payload. Items without an id are dropped.
pub fn parse_daily_papers(json: &str, max_authors: usize) -> Result<Vec<PaperStub>, serde_json::Error> {
    let items: Vec<DailyItem> = serde_json::from_str(json)?;
    Ok(items
        .into_iter()
        .filter_map(|item| item.paper)
        .filter(|p| !p.id.trim().is_empty())
        .map(|p| {
            let id = p.id.trim().to_string();
            PaperStub {
                authors: format_authors(p.authors.iter().map(|a| a.name.as_str()), max_authors),
                source_url: format!("https://arxiv.org/abs/{id}"),
                external_id: id,
                title: p.title,
                abstract_text: p.summary,
                published: p.published_at,
            }
        })
        .collect())
}

/// Feed backed by the Hugging Face daily papers API.
#[derive(Debug)]
pub struct HuggingFaceFeed {
    client: reqwest::Client,
    url: String,
    max_authors: usize,
}

impl HuggingFaceFeed {
    pub fn new(url: impl Into<String>, timeout: Duration, max_authors: usize) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: crate::http::client(timeout)?,
            url: url.into(),
            max_authors,
        })
    }

    pub fn from_config(section: &FeedSection) -> Result<Self, reqwest::Error> {
        Self::new(
            section.url.clone(),
            Duration::from_secs(section.timeout_secs),
            section.max_authors,
        )
    }

    async fn fetch_body(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl PaperFeed for HuggingFaceFeed {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn fetch(&self) -> Vec<PaperStub> {
        let body = match self.fetch_body().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Feed fetch failed");
                return Vec::new();
            }
        };
        match parse_daily_papers(&body, self.max_authors) {
            Ok(papers) => {
                info!(count = papers.len(), "Fetched candidates from Hugging Face");
                papers
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Feed payload malformed");
                Vec::new()
            }
        }
    }
}

// ── Static feed ─────────────────────────────────────────────────────

/// In-memory feed returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    papers: Vec<PaperStub>,
}

impl StaticFeed {
    pub fn new(papers: Vec<PaperStub>) -> Self {
        Self { papers }
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl PaperFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Vec<PaperStub> {
        self.papers.clone()
    }
}
