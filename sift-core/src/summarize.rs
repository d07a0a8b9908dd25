// Summarizer: renders the structured summary prompt, calls the provider,
// and extracts the digest and excitement score from the returned markdown.

use tracing::debug;

use crate::error::ProviderError;
use crate::llm::{GenerateRequest, LlmProvider};
use crate::types::{Excitement, ExcitementScore, Paper, ScoreBreakdown};

/// Maximum digest length, in characters.
pub const DIGEST_MAX_CHARS: usize = 280;

/// Lines after a TLDR heading searched for its body.
const TLDR_LOOKAHEAD: usize = 5;

const SUMMARY_SYSTEM: &str = "You are a precise research summarizer.";

const SUMMARY_TEMPLATE: &str = "\
You are a research summarizer for ML practitioners, engineers, and students who understand AI/ML fundamentals.

Output only valid Markdown in this exact structure:

# TLDR
<2-4 clear sentences capturing the main contribution and key finding. Be specific and concrete. ~50-80 words>

## Problem
<One bullet: what gap or question does this address?>

## Method
<2-3 bullets: the key ideas and approach, including scope/scale where relevant>

## Key Results
<3-5 bullets: the most important findings - be specific with numbers and comparisons where available>

## Limitations
<1-3 bullets: scope constraints, caveats, or open questions - focus on what the paper explicitly acknowledges>

## Why It Matters
<2-3 bullets: practical implications or why researchers should care - be specific, not generic>

## Notable Quotes
<3 quotes from the abstract that capture key insights>

## Excitement Score
Score: <integer 1-10>/10
Breakdown: Novelty:<0-3>, Impact:<0-4>, Results:<0-2>, Access:<0-1>
Reasoning: <one sentence justifying the score>

Guidelines:
- Be precise and concrete - include specific numbers, scales, and comparisons
- Use technical terms naturally but explain complex concepts clearly
- Focus on insights, not just descriptions
- Don't oversell or add hype not present in the source

---

Title: {title}
Authors: {authors}
ArXiv ID/URL: {url}

Abstract:
{abstract}

Optional context:
{notes}";

/// The paper fields the summary prompt needs.
#[derive(Debug, Clone, Copy)]
pub struct PaperFields<'a> {
    pub title: &'a str,
    pub authors: &'a str,
    pub url: &'a str,
    pub abstract_text: &'a str,
    pub notes: &'a str,
}

impl<'a> From<&'a Paper> for PaperFields<'a> {
    fn from(paper: &'a Paper) -> Self {
        Self {
            title: &paper.title,
            authors: &paper.authors,
            url: &paper.source_url,
            abstract_text: &paper.abstract_text,
            notes: &paper.notes,
        }
    }
}

/// A produced summary, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDocument {
    pub markdown: String,
    pub digest: String,
    pub model_used: String,
    pub tokens: Option<u64>,
    pub excitement: Option<Excitement>,
}

/// Render the summary prompt for a paper.
pub fn render_prompt(fields: &PaperFields<'_>) -> String {
    // Substitute user-supplied fields last so braces inside an abstract are
    // never mistaken for placeholders.
    let mut out = String::with_capacity(SUMMARY_TEMPLATE.len() + fields.abstract_text.len());
    let mut rest = SUMMARY_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            out.push_str(after);
            rest = "";
            break;
        };
        let value = match &after[1..end] {
            "title" => Some(fields.title),
            "authors" => Some(fields.authors),
            "url" => Some(fields.url),
            "abstract" => Some(fields.abstract_text),
            "notes" => Some(fields.notes),
            _ => None,
        };
        match value {
            Some(v) => out.push_str(v),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Produces structured summaries through a provider.
#[derive(Debug)]
pub struct Summarizer {
    provider: Box<dyn LlmProvider>,
    temperature: f64,
    max_output_tokens: u32,
}

impl Summarizer {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            temperature: 0.2,
            max_output_tokens: 2000,
        }
    }

    #[must_use]
    pub fn with_sampling(mut self, temperature: f64, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub async fn summarize(
        &self,
        fields: &PaperFields<'_>,
    ) -> Result<SummaryDocument, ProviderError> {
        let request = GenerateRequest::new(render_prompt(fields))
            .with_system(SUMMARY_SYSTEM)
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens);

        let generation = self.provider.generate(&request).await?;
        let markdown = generation.text.trim().to_string();
        if markdown.is_empty() {
            return Err(ProviderError::Parse("empty summary response".to_string()));
        }
        debug!(chars = markdown.len(), model = %generation.model, "Summary generated");

        Ok(SummaryDocument {
            digest: extract_digest(&markdown),
            excitement: parse_excitement(&markdown),
            markdown,
            model_used: generation.model,
            tokens: generation.tokens,
        })
    }
}

// ── Extraction ──────────────────────────────────────────────────────

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn is_tldr_heading(line: &str) -> bool {
    let low = line.to_lowercase().replace(';', "");
    low.starts_with("# tldr") || low.starts_with("## tldr")
}

/// Extract the short digest from a summary document.
///
/// Total and deterministic: the first non-blank line following a `# TLDR`
/// or `## TLDR` heading (case-insensitive), else the first non-blank line of
/// the document, truncated to [`DIGEST_MAX_CHARS`]; blank input yields `""`.
pub fn extract_digest(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().map(str::trim).collect();

    for (i, line) in lines.iter().enumerate() {
        if !is_tldr_heading(line) {
            continue;
        }
        if let Some(body) = lines
            .iter()
            .skip(i + 1)
            .take(TLDR_LOOKAHEAD)
            .find(|l| !l.is_empty())
        {
            return truncate_chars(body, DIGEST_MAX_CHARS);
        }
    }

    lines
        .iter()
        .find(|l| !l.is_empty())
        .map(|l| truncate_chars(l, DIGEST_MAX_CHARS))
        .unwrap_or_default()
}

fn field_after<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim().trim_start_matches(['-', '*', ' ']);
    let (head, rest) = line.split_once(':')?;
    head.trim_matches(['*', ' '])
        .eq_ignore_ascii_case(label)
        .then(|| rest.trim_matches(['*', ' ']))
}

/// Parse the `## Excitement Score` section, if the model produced one.
///
/// Never fails: an explicit score is clamped into `1..=10`; without one, a
/// non-empty breakdown's total is used; otherwise `None`.
pub fn parse_excitement(markdown: &str) -> Option<Excitement> {
    let mut in_section = false;
    let mut score = None;
    let mut breakdown = ScoreBreakdown::default();
    let mut reasoning = String::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            in_section = trimmed
                .trim_start_matches('#')
                .trim()
                .to_lowercase()
                .starts_with("excitement");
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(value) = field_after(trimmed, "score") {
            let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
            score = digits.parse::<i64>().ok();
        } else if let Some(value) = field_after(trimmed, "breakdown") {
            breakdown = ScoreBreakdown::parse(value);
        } else if let Some(value) = field_after(trimmed, "reasoning") {
            reasoning = value.to_string();
        }
    }

    let score = match score {
        Some(s) => ExcitementScore::scored(s),
        None if !breakdown.is_empty() => ExcitementScore::scored(i64::from(breakdown.total())),
        None => return None,
    };

    Some(Excitement {
        score,
        breakdown,
        reasoning,
    })
}
