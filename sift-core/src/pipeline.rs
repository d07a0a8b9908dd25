// Pipeline orchestrator: select → triage → summarize → persist, one paper at a time.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{CostSection, SiftConfig};
use crate::llm::providers::{
    fallback_triage_from_config, primary_triage_from_config, provider_from_config,
};
use crate::llm::retry::{RetryPolicy, RetryingProvider};
use crate::progress::ProgressReporter;
use crate::store::PaperStore;
use crate::summarize::{PaperFields, Summarizer};
use crate::triage::{NO_REASON, Triager};
use crate::types::{ExcitementScore, Paper, PaperId, SummaryState, SummaryUpdate};

/// Which papers a run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exactly these papers, in this order.
    Ids(Vec<PaperId>),
    /// Papers chosen from the store by batch size: pending ones, or the most
    /// recent ones when forced.
    Auto,
}

/// What happened to one paper during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaperOutcome {
    /// A genuine summary already existed and the run was not forced.
    AlreadyDone,
    /// Triage judged the paper irrelevant; the skip sentinel was stored.
    Skipped { reason: String },
    /// A summary was produced and persisted.
    Summarized {
        digest: String,
        score: ExcitementScore,
    },
    /// The summarizer failed; the record was not touched.
    SummaryFailed { error: String },
    /// The outcome could not be written to the store.
    StoreFailed { error: String },
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub selected: u64,
    /// Requested ids that were not found in the store.
    pub missing: Vec<PaperId>,
    pub already_done: u64,
    /// Papers for which a classifier returned a verdict.
    pub triaged: u64,
    pub triage_failures: u64,
    pub skipped_irrelevant: u64,
    pub summarized: u64,
    pub summary_failures: u64,
    pub store_failures: u64,
    pub triage_tokens: u64,
    pub summary_tokens: u64,
    pub estimated_cost_usd: f64,
    #[serde(skip)]
    pub duration: Duration,
}

impl RunStats {
    /// Share of triaged papers that went on to be summarized, in percent.
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> Option<f64> {
        (self.triaged > 0).then(|| self.summarized as f64 / self.triaged as f64 * 100.0)
    }

    fn record(&mut self, outcome: &PaperOutcome) {
        match outcome {
            PaperOutcome::AlreadyDone => self.already_done += 1,
            PaperOutcome::Skipped { .. } => self.skipped_irrelevant += 1,
            PaperOutcome::Summarized { .. } => self.summarized += 1,
            PaperOutcome::SummaryFailed { .. } => self.summary_failures += 1,
            PaperOutcome::StoreFailed { .. } => self.store_failures += 1,
        }
    }
}

/// Rough spend for a run under the configured rates.
pub fn estimate_cost(triage_tokens: u64, summarized: u64, cost: &CostSection) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let (tokens, summaries) = (triage_tokens as f64, summarized as f64);
    tokens / 1_000_000.0 * cost.triage_usd_per_million + summaries * cost.summary_usd_each
}

/// Orchestrates triage and summarization over a selection of stored papers.
#[derive(Debug)]
pub struct SiftPipeline {
    triager: Triager,
    summarizer: Summarizer,
    batch_size: u32,
    cost: CostSection,
}

impl SiftPipeline {
    pub fn new(triager: Triager, summarizer: Summarizer) -> Self {
        Self {
            triager,
            summarizer,
            batch_size: 10,
            cost: CostSection::default(),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_cost(mut self, cost: CostSection) -> Self {
        self.cost = cost;
        self
    }

    /// Build providers from configuration. The summarization provider is
    /// wrapped in retry; an unconfigured primary classifier leaves triage on
    /// the fallback alone.
    pub fn from_config(config: &SiftConfig) -> crate::error::Result<Self> {
        let policy = RetryPolicy::from(&config.retry);
        let summary_provider = RetryingProvider::new(provider_from_config(config)?, policy);
        let summarizer = Summarizer::new(Box::new(summary_provider)).with_sampling(
            config.provider.temperature,
            config.provider.max_output_tokens,
        );

        let fallback = fallback_triage_from_config(config)?;
        let triager = match primary_triage_from_config(config) {
            Ok(primary) => Triager::new(primary, fallback),
            Err(e) => {
                info!(reason = %e, "Primary triage classifier not configured");
                Triager::fallback_only(e.to_string(), fallback)
            }
        }
        .with_primary_billing(config.triage.bill_primary_tokens);

        Ok(Self::new(triager, summarizer)
            .with_batch_size(config.pipeline.batch_size)
            .with_cost(config.cost.clone()))
    }

    async fn select(
        &self,
        store: &dyn PaperStore,
        selection: &Selection,
        force: bool,
        stats: &mut RunStats,
    ) -> crate::error::Result<Vec<Paper>> {
        match selection {
            Selection::Ids(ids) => {
                let mut seen = HashSet::new();
                let ids: Vec<PaperId> =
                    ids.iter().copied().filter(|id| seen.insert(*id)).collect();
                let papers = store.get_papers(&ids).await?;
                stats.missing = ids
                    .iter()
                    .filter(|id| !papers.iter().any(|p| p.id == **id))
                    .copied()
                    .collect();
                Ok(papers)
            }
            Selection::Auto if force => store.recent_papers(self.batch_size).await,
            Selection::Auto => store.pending_papers(self.batch_size).await,
        }
    }

    /// Run the pipeline over the selected papers.
    ///
    /// Only selection errors are returned; every per-paper failure is
    /// recorded in the stats and the run moves on.
    #[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4(), force = force))]
    pub async fn run(
        &self,
        store: &dyn PaperStore,
        selection: &Selection,
        force: bool,
        progress: &dyn ProgressReporter,
    ) -> crate::error::Result<RunStats> {
        let start = Instant::now();
        let mut stats = RunStats::default();

        let papers = self.select(store, selection, force, &mut stats).await?;
        stats.selected = papers.len() as u64;
        for id in &stats.missing {
            warn!(%id, "Requested paper not found");
        }
        info!(papers = papers.len(), "Processing selected papers");

        progress.start(stats.selected);
        for paper in &papers {
            progress.paper_started(paper);
            let outcome = self.process(store, paper, force, &mut stats).await;
            stats.record(&outcome);
            progress.paper_finished(paper, &outcome);
        }
        progress.finish();

        stats.estimated_cost_usd = estimate_cost(stats.triage_tokens, stats.summarized, &self.cost);
        stats.duration = start.elapsed();
        info!(
            summarized = stats.summarized,
            skipped = stats.skipped_irrelevant,
            failures = stats.summary_failures + stats.store_failures,
            "Run complete"
        );
        Ok(stats)
    }

    async fn process(
        &self,
        store: &dyn PaperStore,
        paper: &Paper,
        force: bool,
        stats: &mut RunStats,
    ) -> PaperOutcome {
        let id = paper.id;
        if paper.summary_state() == SummaryState::Genuine && !force {
            debug!(%id, "Already summarized");
            return PaperOutcome::AlreadyDone;
        }

        match self.triager.triage(&paper.title, &paper.abstract_text).await {
            Ok(verdict) => {
                stats.triaged += 1;
                stats.triage_tokens += verdict.tokens;
                if !verdict.relevant {
                    let reason = if verdict.reason.trim().is_empty() {
                        NO_REASON.to_string()
                    } else {
                        verdict.reason
                    };
                    info!(%id, reason = %reason, "Not relevant");
                    return match store.mark_skipped(id, &reason).await {
                        Ok(()) => PaperOutcome::Skipped { reason },
                        Err(e) => {
                            warn!(%id, error = %e, "Failed to store skip");
                            PaperOutcome::StoreFailed {
                                error: e.to_string(),
                            }
                        }
                    };
                }
                debug!(%id, model = %verdict.model_used, reason = %verdict.reason, "Relevant");
            }
            Err(e) => {
                stats.triage_failures += 1;
                warn!(%id, error = %e, "Triage failed, summarizing anyway");
            }
        }

        let document = match self.summarizer.summarize(&PaperFields::from(paper)).await {
            Ok(document) => document,
            Err(e) => {
                warn!(%id, error = %e, "Summary failed");
                return PaperOutcome::SummaryFailed {
                    error: e.to_string(),
                };
            }
        };
        stats.summary_tokens += document.tokens.unwrap_or(0);

        let score = document
            .excitement
            .as_ref()
            .map_or(ExcitementScore::UNSCORED, |e| e.score);
        let update = SummaryUpdate {
            summary_md: document.markdown,
            digest: document.digest,
            model_used: document.model_used,
            tokens: document.tokens,
            summarized_at: Utc::now(),
            excitement: document.excitement,
        };
        match store.save_summary(id, &update).await {
            Ok(()) => {
                info!(%id, chars = update.summary_md.len(), score = score.value(), "Summarized");
                PaperOutcome::Summarized {
                    digest: update.digest,
                    score,
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "Failed to store summary");
                PaperOutcome::StoreFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}
