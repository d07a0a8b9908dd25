use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Typed ID wrappers ──────────────────────────────────────────────

/// Internal store identifier of a paper row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaperId(pub i64);

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PaperId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ── Summary state ──────────────────────────────────────────────────

/// Marker stored in place of a summary for papers judged not relevant.
pub const SKIP_SENTINEL: &str = "[Skipped - Not relevant to reasoning]";

/// Substring identifying any skip marker, including legacy variants.
const SKIP_MARKER: &str = "[Skipped";

/// What the stored summary column currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryState {
    /// No summary yet (NULL or blank).
    Missing,
    /// The skip sentinel written by triage.
    Skipped,
    /// A summary produced by the summarizer.
    Genuine,
}

impl SummaryState {
    pub fn of(summary: Option<&str>) -> Self {
        match summary.map(str::trim) {
            None | Some("") => Self::Missing,
            Some(s) if s.contains(SKIP_MARKER) => Self::Skipped,
            Some(_) => Self::Genuine,
        }
    }
}

// ── Score breakdown ────────────────────────────────────────────────

/// A labeled sub-score dimension of the excitement score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Novelty,
    Impact,
    Results,
    Access,
}

impl Dimension {
    /// All dimensions in display order. Their maxima sum to 10.
    pub const ALL: [Self; 4] = [Self::Novelty, Self::Impact, Self::Results, Self::Access];

    pub fn label(self) -> &'static str {
        match self {
            Self::Novelty => "Novelty",
            Self::Impact => "Impact",
            Self::Results => "Results",
            Self::Access => "Access",
        }
    }

    pub fn max(self) -> u8 {
        match self {
            Self::Novelty => 3,
            Self::Impact => 4,
            Self::Results => 2,
            Self::Access => 1,
        }
    }

    /// Case-insensitive label lookup.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(label))
    }
}

/// Per-dimension sub-scores. Values are clamped to each dimension's maximum
/// on insertion, so a breakdown can never display above its cap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    values: Vec<(Dimension, u8)>,
}

impl ScoreBreakdown {
    /// Set a dimension's value, clamping to its maximum.
    pub fn set(&mut self, dim: Dimension, value: u8) {
        let value = value.min(dim.max());
        if let Some(slot) = self.values.iter_mut().find(|(d, _)| *d == dim) {
            slot.1 = value;
        } else {
            self.values.push((dim, value));
            self.values.sort_by_key(|(d, _)| *d);
        }
    }

    pub fn get(&self, dim: Dimension) -> Option<u8> {
        self.values
            .iter()
            .find(|(d, _)| *d == dim)
            .map(|(_, v)| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all present sub-scores.
    pub fn total(&self) -> u8 {
        self.values.iter().map(|(_, v)| *v).sum()
    }

    /// Parse the stored `"Novelty:2, Impact:3"` form.
    ///
    /// Unknown labels and non-numeric values are dropped; negative or
    /// oversized values are clamped into `0..=max`.
    pub fn parse(raw: &str) -> Self {
        let mut breakdown = Self::default();
        for part in raw.split([',', '|', ';']) {
            let Some((label, value)) = part.split_once(':') else {
                continue;
            };
            let Some(dim) = Dimension::from_label(label) else {
                continue;
            };
            let digits: String = value
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '-')
                .collect();
            let Ok(n) = digits.parse::<i64>() else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let clamped = n.clamp(0, i64::from(dim.max())) as u8;
            breakdown.set(dim, clamped);
        }
        breakdown
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (dim, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{value}", dim.label())?;
        }
        Ok(())
    }
}

/// Overall excitement score: 0 means unscored, otherwise `1..=10`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExcitementScore(u8);

impl ExcitementScore {
    pub const UNSCORED: Self = Self(0);

    /// A scored value clamped into `1..=10`.
    pub fn scored(value: i64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(value.clamp(1, 10) as u8)
    }

    /// Interpret a raw stored value; anything outside `1..=10` is unscored.
    pub fn from_stored(value: i64) -> Self {
        if (1..=10).contains(&value) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Self(value as u8)
        } else {
            Self::UNSCORED
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_scored(self) -> bool {
        self.0 > 0
    }
}

/// A parsed excitement assessment attached to a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excitement {
    pub score: ExcitementScore,
    pub breakdown: ScoreBreakdown,
    pub reasoning: String,
}

// ── Paper records ──────────────────────────────────────────────────

/// A candidate paper as returned by a feed, before ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperStub {
    pub external_id: String,
    pub title: String,
    /// Display string; at most five names then `", et al."`.
    pub authors: String,
    pub abstract_text: String,
    pub source_url: String,
    pub published: String,
}

/// A row to insert into the store. Processing fields start unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaper {
    /// Normalized external identifier.
    pub external_id: String,
    pub title: String,
    pub authors: String,
    pub published: String,
    pub abstract_text: String,
    pub source_url: String,
    pub category: Option<String>,
    pub notes: String,
    pub date_added: DateTime<Utc>,
}

/// A stored paper with its processing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub external_id: String,
    pub title: String,
    pub authors: String,
    pub published: String,
    pub source_url: String,
    pub abstract_text: String,
    pub category: Option<String>,
    pub notes: String,
    pub date_added: Option<DateTime<Utc>>,

    pub summary_md: Option<String>,
    pub digest: Option<String>,
    pub excitement_score: ExcitementScore,
    pub score_breakdown: ScoreBreakdown,
    pub excitement_reasoning: String,
    pub model_used: Option<String>,
    pub summary_tokens: Option<u64>,
    pub last_summarized_at: Option<DateTime<Utc>>,
    pub last_scored_at: Option<DateTime<Utc>>,
}

impl Paper {
    pub fn summary_state(&self) -> SummaryState {
        SummaryState::of(self.summary_md.as_deref())
    }

    /// Whether the record still needs a summary or digest.
    pub fn needs_processing(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());
        blank(&self.summary_md) || blank(&self.digest)
    }
}

/// Fields written atomically after a successful summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpdate {
    pub summary_md: String,
    pub digest: String,
    pub model_used: String,
    pub tokens: Option<u64>,
    pub summarized_at: DateTime<Utc>,
    pub excitement: Option<Excitement>,
}

/// Row counts about the store, for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_papers: u64,
    pub summarized: u64,
    pub skipped: u64,
    pub pending: u64,
    pub scored: u64,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_state_detection() {
        assert_eq!(SummaryState::of(None), SummaryState::Missing);
        assert_eq!(SummaryState::of(Some("   ")), SummaryState::Missing);
        assert_eq!(SummaryState::of(Some(SKIP_SENTINEL)), SummaryState::Skipped);
        assert_eq!(
            SummaryState::of(Some("# TLDR\nA genuine summary.")),
            SummaryState::Genuine
        );
    }

    #[test]
    fn breakdown_clamps_to_dimension_max() {
        let b = ScoreBreakdown::parse("Novelty:5, Impact:4, Results:9, Access:1");
        assert_eq!(b.get(Dimension::Novelty), Some(3));
        assert_eq!(b.get(Dimension::Impact), Some(4));
        assert_eq!(b.get(Dimension::Results), Some(2));
        assert_eq!(b.get(Dimension::Access), Some(1));
        assert_eq!(b.total(), 10);
        for dim in Dimension::ALL {
            assert!(b.get(dim).unwrap() <= dim.max());
        }
    }

    #[test]
    fn breakdown_parse_is_lenient() {
        let b = ScoreBreakdown::parse("novelty: 2/3 | Hype:7 ; access:-4, Impact:lots");
        assert_eq!(b.get(Dimension::Novelty), Some(2));
        assert_eq!(b.get(Dimension::Access), Some(0));
        assert_eq!(b.get(Dimension::Impact), None);
        assert_eq!(b.to_string(), "Novelty:2, Access:0");
        assert!(ScoreBreakdown::parse("").is_empty());
    }

    #[test]
    fn breakdown_set_clamps_directly() {
        let mut b = ScoreBreakdown::default();
        b.set(Dimension::Access, 200);
        b.set(Dimension::Novelty, 1);
        assert_eq!(b.to_string(), "Novelty:1, Access:1");
    }

    #[test]
    fn excitement_score_bounds() {
        assert_eq!(ExcitementScore::scored(0).value(), 1);
        assert_eq!(ExcitementScore::scored(42).value(), 10);
        assert_eq!(ExcitementScore::from_stored(0), ExcitementScore::UNSCORED);
        assert_eq!(ExcitementScore::from_stored(11), ExcitementScore::UNSCORED);
        assert_eq!(ExcitementScore::from_stored(7).value(), 7);
        assert!(!ExcitementScore::default().is_scored());
    }
}
