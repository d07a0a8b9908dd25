// Integration test utilities and fixtures for Sift.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use sift_core::error::{ProviderError, Result};
use sift_core::ingest::ingest;
use sift_core::llm::{GenerateRequest, Generation, LlmProvider};
use sift_core::store::PaperStore;
use sift_core::store::sqlite::SqliteStore;
use sift_core::types::{NewPaper, Paper, PaperId, PaperStub, StoreStats, SummaryUpdate};

/// Shared handle to a provider's call count, readable after the provider
/// has been boxed into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Scripted provider ───────────────────────────────────────────────

/// One scripted provider response.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// An HTTP status the adapter treats as retryable.
    Transient(u16),
    /// An HTTP status the adapter gives up on immediately.
    Fatal(u16),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Answers from a script in order; the last reply repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Reply>>,
    calls: CallCount,
}

impl ScriptedProvider {
    pub fn new(model: &str, script: Vec<Reply>) -> Self {
        assert!(!script.is_empty(), "script needs at least one reply");
        Self {
            model: model.to_string(),
            script: Mutex::new(script.into()),
            calls: CallCount::default(),
        }
    }

    /// A provider that always returns `text`.
    pub fn always(model: &str, text: &str) -> Self {
        Self::new(model, vec![Reply::text(text)])
    }

    /// A provider that always fails with a non-retryable status.
    pub fn failing(model: &str, status: u16) -> Self {
        Self::new(model, vec![Reply::Fatal(status)])
    }

    pub fn calls(&self) -> CallCount {
        self.calls.clone()
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _request: &GenerateRequest) -> std::result::Result<Generation, ProviderError> {
        self.calls.bump();
        let reply = {
            let mut script = self.script.lock().expect("script mutex poisoned");
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };
        match reply {
            Some(Reply::Text(text)) => Ok(Generation {
                text,
                tokens: Some(500),
                model: self.model.clone(),
            }),
            Some(Reply::Transient(status) | Reply::Fatal(status)) => Err(ProviderError::Api {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(ProviderError::Parse("empty script".to_string())),
        }
    }
}

// ── Keyword classifier ──────────────────────────────────────────────

/// Topic words that make the keyword classifier answer YES.
pub const REASONING_KEYWORDS: &[&str] = &["reasoning", "chain-of-thought", "planning", "agent"];

/// A classifier that answers from the title and abstract in the prompt:
/// YES when any of its keywords appears there, NO otherwise.
#[derive(Debug)]
pub struct KeywordClassifier {
    model: String,
    keywords: Vec<String>,
    calls: CallCount,
}

impl KeywordClassifier {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            keywords: REASONING_KEYWORDS.iter().map(|k| (*k).to_string()).collect(),
            calls: CallCount::default(),
        }
    }

    pub fn calls(&self) -> CallCount {
        self.calls.clone()
    }

    fn paper_text(prompt: &str) -> String {
        prompt
            .lines()
            .filter_map(|l| {
                l.strip_prefix("Title:")
                    .or_else(|| l.strip_prefix("Abstract:"))
            })
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> std::result::Result<Generation, ProviderError> {
        self.calls.bump();
        let text = Self::paper_text(&request.prompt);
        let hit = self.keywords.iter().find(|k| text.contains(k.as_str()));
        let answer = match hit {
            Some(k) => format!("**RELEVANT:** YES\nREASON: Mentions {k}."),
            None => "RELEVANT: NO\nREASON: Primarily about systems, not reasoning.".to_string(),
        };
        Ok(Generation {
            text: answer,
            tokens: Some(40),
            model: self.model.clone(),
        })
    }
}

// ── Store fixtures ──────────────────────────────────────────────────

/// Delegates to an inner store and counts outcome writes.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    writes: CallCount,
}

impl<S: PaperStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: CallCount::default(),
        }
    }

    /// Number of `save_summary` and `mark_skipped` calls seen.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

#[async_trait::async_trait]
impl<S: PaperStore> PaperStore for CountingStore<S> {
    async fn contains_external_id(&self, external_id: &str) -> Result<bool> {
        self.inner.contains_external_id(external_id).await
    }

    async fn insert_paper(&self, paper: &NewPaper) -> Result<PaperId> {
        self.inner.insert_paper(paper).await
    }

    async fn get_paper(&self, id: PaperId) -> Result<Option<Paper>> {
        self.inner.get_paper(id).await
    }

    async fn get_papers(&self, ids: &[PaperId]) -> Result<Vec<Paper>> {
        self.inner.get_papers(ids).await
    }

    async fn pending_papers(&self, limit: u32) -> Result<Vec<Paper>> {
        self.inner.pending_papers(limit).await
    }

    async fn recent_papers(&self, limit: u32) -> Result<Vec<Paper>> {
        self.inner.recent_papers(limit).await
    }

    async fn save_summary(&self, id: PaperId, update: &SummaryUpdate) -> Result<()> {
        self.writes.bump();
        self.inner.save_summary(id, update).await
    }

    async fn mark_skipped(&self, id: PaperId, reason: &str) -> Result<()> {
        self.writes.bump();
        self.inner.mark_skipped(id, reason).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

/// A candidate paper as a feed would return it.
pub fn stub(external_id: &str, title: &str, abstract_text: &str) -> PaperStub {
    PaperStub {
        external_id: external_id.to_string(),
        title: title.to_string(),
        authors: "A. Researcher, B. Researcher".to_string(),
        abstract_text: abstract_text.to_string(),
        source_url: format!("https://arxiv.org/abs/{external_id}"),
        published: "2025-01-15T00:00:00.000Z".to_string(),
    }
}

/// The relevant paper used across scenarios.
pub fn reasoning_paper() -> PaperStub {
    stub(
        "2501.00001",
        "Chain-of-Thought Improves Planning",
        "We show that multi-step reasoning traces improve planning in language models.",
    )
}

/// The irrelevant paper used across scenarios.
pub fn systems_paper() -> PaperStub {
    stub(
        "2501.00002",
        "Efficient Kernels",
        "We study low-level GPU kernel scheduling for dense matrix workloads.",
    )
}

/// An in-memory store holding `papers`, ingested in order.
pub async fn seeded_store(papers: &[PaperStub]) -> (SqliteStore, Vec<PaperId>) {
    let store = SqliteStore::in_memory().expect("in-memory store");
    let stats = ingest(&store, papers, "huggingface", Utc::now()).await;
    assert_eq!(stats.failed, 0, "seeding should not fail");
    let mut ids: Vec<PaperId> = store
        .recent_papers(u32::MAX)
        .await
        .expect("list seeded papers")
        .into_iter()
        .map(|p| p.id)
        .collect();
    ids.reverse();
    (store, ids)
}

/// A well-formed summary document with a TLDR and an excitement section.
pub fn summary_markdown(tldr: &str, score: u8) -> String {
    format!(
        "# TLDR\n{tldr}\n\n## Problem\n- A gap.\n\n## Method\n- An approach.\n\n\
         ## Key Results\n- A result.\n\n## Limitations\n- A caveat.\n\n\
         ## Why It Matters\n- A reason.\n\n## Notable Quotes\n- \"A quote.\"\n\n\
         ## Excitement Score\nScore: {score}/10\n\
         Breakdown: Novelty:2, Impact:3, Results:1, Access:1\nReasoning: Solid and useful.\n"
    )
}
