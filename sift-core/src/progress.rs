//! Progress reporting for pipeline runs.
//!
//! The CLI uses `IndicatifReporter` for a per-paper progress bar.
//! Library callers can use `NoopReporter` or provide their own implementation.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pipeline::PaperOutcome;
use crate::types::Paper;

/// Observer for a pipeline run over a batch of papers.
pub trait ProgressReporter: Send + Sync {
    /// A run over `total` selected papers is starting.
    fn start(&self, total: u64);

    /// Processing of `paper` has begun.
    fn paper_started(&self, paper: &Paper);

    /// Processing of `paper` has finished with `outcome`.
    fn paper_finished(&self, paper: &Paper, outcome: &PaperOutcome);

    /// The run is over.
    fn finish(&self);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _total: u64) {}
    fn paper_started(&self, _paper: &Paper) {}
    fn paper_finished(&self, _paper: &Paper, _outcome: &PaperOutcome) {}
    fn finish(&self) {}
}

const TITLE_WIDTH: usize = 50;

fn short_title(title: &str) -> String {
    match title.char_indices().nth(TITLE_WIDTH) {
        Some((idx, _)) => format!("{}...", &title[..idx]),
        None => title.to_string(),
    }
}

/// Reporter backed by an `indicatif` progress bar on stderr.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// A reporter that tracks position without drawing.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_message("papers");
    }

    fn paper_started(&self, paper: &Paper) {
        self.bar
            .set_message(format!("{}: {}", paper.id, short_title(&paper.title)));
    }

    fn paper_finished(&self, paper: &Paper, outcome: &PaperOutcome) {
        match outcome {
            PaperOutcome::SummaryFailed { error } | PaperOutcome::StoreFailed { error } => {
                self.bar.println(format!("  {}: failed: {error}", paper.id));
            }
            PaperOutcome::Skipped { reason } => {
                self.bar
                    .println(format!("  {}: skipped: {}", paper.id, short_title(reason)));
            }
            PaperOutcome::AlreadyDone | PaperOutcome::Summarized { .. } => {}
        }
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExcitementScore, PaperId};

    fn paper(title: &str) -> Paper {
        Paper {
            id: PaperId(1),
            external_id: "2401.00001".into(),
            title: title.into(),
            authors: String::new(),
            published: String::new(),
            source_url: String::new(),
            abstract_text: String::new(),
            category: None,
            notes: String::new(),
            date_added: None,
            summary_md: None,
            digest: None,
            excitement_score: ExcitementScore::UNSCORED,
            score_breakdown: crate::types::ScoreBreakdown::default(),
            excitement_reasoning: String::new(),
            model_used: None,
            summary_tokens: None,
            last_summarized_at: None,
            last_scored_at: None,
        }
    }

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        let p = paper("A");
        reporter.start(1);
        reporter.paper_started(&p);
        reporter.paper_finished(&p, &PaperOutcome::AlreadyDone);
        reporter.finish();
    }

    #[test]
    fn indicatif_reporter_counts_finished_papers() {
        let reporter = IndicatifReporter::hidden();
        let p = paper("Chain-of-Thought Improves Planning");
        reporter.start(2);
        reporter.paper_started(&p);
        reporter.paper_finished(&p, &PaperOutcome::AlreadyDone);
        reporter.paper_finished(
            &p,
            &PaperOutcome::SummaryFailed {
                error: "HTTP 500".into(),
            },
        );
        assert_eq!(reporter.position(), 2);
        reporter.finish();
    }

    #[test]
    fn long_titles_are_shortened() {
        let long = "é".repeat(80);
        let short = short_title(&long);
        assert_eq!(short.chars().count(), TITLE_WIDTH + 3);
        assert_eq!(short_title("Short"), "Short");
    }
}
