//! Relevance triage: a cheap first-pass YES/NO classifier that gates summarization.
//!
//! The primary classifier runs first. If it is unavailable (no credentials at
//! setup) or fails at runtime, the fallback classifier is tried exactly once.
//! [`Triager::attempt`] exposes which path produced the verdict so each
//! branch can be exercised directly.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::{GenerateRequest, LlmProvider};

/// Reason recorded when the classifier output has no `REASON:` line.
pub const NO_REASON: &str = "No reason provided";

const PRIMARY_TEMPERATURE: f64 = 0.1;
const PRIMARY_MAX_TOKENS: u32 = 200;
const FALLBACK_TEMPERATURE: f64 = 0.1;
const FALLBACK_MAX_TOKENS: u32 = 100;
const FALLBACK_SYSTEM: &str = "You are a research paper filter.";

/// The classifier's decision for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageVerdict {
    pub relevant: bool,
    pub reason: String,
    pub model_used: String,
    /// Billable tokens; zero when unknown or free.
    pub tokens: u64,
}

/// Which path of the two-step classification produced the result.
#[derive(Debug)]
pub enum TriageAttempt {
    /// The primary classifier answered.
    Primary(TriageVerdict),
    /// The primary was unavailable or failed; the fallback answered.
    Fallback {
        verdict: TriageVerdict,
        primary_error: ProviderError,
    },
    /// Neither classifier produced a verdict.
    BothFailed {
        primary_error: ProviderError,
        fallback_error: ProviderError,
    },
}

impl TriageAttempt {
    /// Collapse into the verdict, or the fallback's error when both failed.
    pub fn into_result(self) -> Result<TriageVerdict, ProviderError> {
        match self {
            Self::Primary(verdict) | Self::Fallback { verdict, .. } => Ok(verdict),
            Self::BothFailed { fallback_error, .. } => Err(fallback_error),
        }
    }

    pub fn used_fallback(&self) -> bool {
        !matches!(self, Self::Primary(_))
    }
}

/// Two-step relevance classifier.
#[derive(Debug)]
pub struct Triager {
    /// `Err` records why the primary classifier could not be set up.
    primary: Result<Box<dyn LlmProvider>, String>,
    fallback: Box<dyn LlmProvider>,
    bill_primary_tokens: bool,
}

impl Triager {
    pub fn new(primary: Box<dyn LlmProvider>, fallback: Box<dyn LlmProvider>) -> Self {
        Self {
            primary: Ok(primary),
            fallback,
            bill_primary_tokens: false,
        }
    }

    /// A triager whose primary classifier is known to be unavailable.
    pub fn fallback_only(reason: impl Into<String>, fallback: Box<dyn LlmProvider>) -> Self {
        Self {
            primary: Err(reason.into()),
            fallback,
            bill_primary_tokens: false,
        }
    }

    #[must_use]
    pub fn with_primary_billing(mut self, bill: bool) -> Self {
        self.bill_primary_tokens = bill;
        self
    }

    /// Classify a paper, falling back once if the primary path fails.
    pub async fn attempt(&self, title: &str, abstract_text: &str) -> TriageAttempt {
        let primary_error = match self.run_primary(title, abstract_text).await {
            Ok(verdict) => return TriageAttempt::Primary(verdict),
            Err(e) => e,
        };

        warn!(error = %primary_error, "Primary triage unavailable, falling back");

        match self.run_fallback(title, abstract_text).await {
            Ok(verdict) => TriageAttempt::Fallback {
                verdict,
                primary_error,
            },
            Err(fallback_error) => TriageAttempt::BothFailed {
                primary_error,
                fallback_error,
            },
        }
    }

    /// Classify a paper; an error means both classifiers failed.
    pub async fn triage(
        &self,
        title: &str,
        abstract_text: &str,
    ) -> Result<TriageVerdict, ProviderError> {
        self.attempt(title, abstract_text).await.into_result()
    }

    async fn run_primary(
        &self,
        title: &str,
        abstract_text: &str,
    ) -> Result<TriageVerdict, ProviderError> {
        let provider = self
            .primary
            .as_ref()
            .map_err(|reason| ProviderError::Config(reason.clone()))?;

        let request = GenerateRequest::new(primary_prompt(title, abstract_text))
            .with_temperature(PRIMARY_TEMPERATURE)
            .with_max_output_tokens(PRIMARY_MAX_TOKENS);
        let generation = provider.generate(&request).await?;
        debug!(model = provider.model_id(), "Primary triage responded");

        let (relevant, reason) = parse_verdict(&generation.text);
        let tokens = if self.bill_primary_tokens {
            generation.tokens.unwrap_or(0)
        } else {
            0
        };
        Ok(TriageVerdict {
            relevant,
            reason: reason.unwrap_or_else(|| NO_REASON.to_string()),
            model_used: provider.model_id().to_string(),
            tokens,
        })
    }

    async fn run_fallback(
        &self,
        title: &str,
        abstract_text: &str,
    ) -> Result<TriageVerdict, ProviderError> {
        let request = GenerateRequest::new(fallback_prompt(title, abstract_text))
            .with_system(FALLBACK_SYSTEM)
            .with_temperature(FALLBACK_TEMPERATURE)
            .with_max_output_tokens(FALLBACK_MAX_TOKENS);
        let generation = self.fallback.generate(&request).await?;

        let (relevant, reason) = parse_verdict(&generation.text);
        Ok(TriageVerdict {
            relevant,
            reason: reason.unwrap_or_else(|| generation.text.trim().to_string()),
            model_used: format!("{} (fallback)", self.fallback.model_id()),
            tokens: generation.tokens.unwrap_or(0),
        })
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

pub fn primary_prompt(title: &str, abstract_text: &str) -> String {
    format!(
        "You are filtering AI research papers for a reasoning-focused research hub.

Determine if this paper is relevant to AI reasoning, agents, planning, or problem-solving.

Title: {title}

Abstract: {abstract_text}

Output ONLY in this format:
RELEVANT: YES or NO
REASON: <one sentence explaining why>

Mark YES if the paper directly involves:
- Reasoning capabilities in AI systems
- Agent planning or decision-making
- Problem-solving approaches
- Chain-of-thought or multi-step reasoning
- Benchmark evaluation of reasoning

Mark NO if it's primarily about:
- Pure computer vision without reasoning
- Low-level optimization
- Hardware/systems
- Domain-specific applications without reasoning focus

Be slightly permissive: answer YES when uncertainty is high (papers can be down-scored later)."
    )
}

pub fn fallback_prompt(title: &str, abstract_text: &str) -> String {
    format!(
        "Determine if this paper is relevant to AI reasoning.

Title: {title}
Abstract: {abstract_text}

Output: RELEVANT: YES or NO
REASON: <one sentence>

Be slightly permissive: answer YES when uncertainty is high."
    )
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Strip markdown emphasis and list markers a model may wrap a line in.
fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches(['-', '*', '>', ' '])
        .replace("**", "")
        .replace('`', "")
        .trim()
        .to_string()
}

/// Value after a `LABEL:` prefix, matched case-insensitively.
fn labeled_value(line: &str, label: &str) -> Option<String> {
    let cleaned = clean_line(line);
    let (head, rest) = cleaned.split_once(':')?;
    head.trim()
        .eq_ignore_ascii_case(label)
        .then(|| rest.trim().to_string())
}

/// Parse the classifier's `RELEVANT:` and `REASON:` lines.
///
/// Returns `(relevant, reason)`. A missing or unreadable verdict counts as
/// relevant; a missing reason is `None`. Tolerates case variation and text
/// trailing the verdict word or the reason.
pub fn parse_verdict(text: &str) -> (bool, Option<String>) {
    let mut verdict = None;
    let mut reason = None;

    for line in text.lines() {
        if verdict.is_none() {
            if let Some(value) = labeled_value(line, "relevant") {
                let word: String = value
                    .chars()
                    .take_while(char::is_ascii_alphabetic)
                    .collect::<String>()
                    .to_ascii_uppercase();
                verdict = match word.as_str() {
                    "YES" => Some(true),
                    "NO" => Some(false),
                    _ => None,
                };
                continue;
            }
        }
        if reason.is_none() {
            if let Some(value) = labeled_value(line, "reason") {
                if !value.is_empty() {
                    reason = Some(value);
                }
            }
        }
    }

    (verdict.unwrap_or(true), reason)
}
