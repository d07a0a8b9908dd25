use crate::types::{NewPaper, Paper, PaperId, StoreStats, SummaryUpdate};

/// The paper store abstraction. Ingestion and the pipeline read and write
/// through this trait; every write is a single atomically-committed statement.
#[async_trait::async_trait]
pub trait PaperStore: Send + Sync {
    // ── Ingestion ──────────────────────────────────────────────────

    /// Whether a paper with this (normalized) external id exists.
    async fn contains_external_id(&self, external_id: &str) -> crate::error::Result<bool>;

    /// Insert a new paper. Fails on a duplicate external id.
    async fn insert_paper(&self, paper: &NewPaper) -> crate::error::Result<PaperId>;

    // ── Selection ──────────────────────────────────────────────────

    /// Get a paper by its internal ID.
    async fn get_paper(&self, id: PaperId) -> crate::error::Result<Option<Paper>>;

    /// Get papers by ID, in the order given; unknown IDs are omitted.
    async fn get_papers(&self, ids: &[PaperId]) -> crate::error::Result<Vec<Paper>>;

    /// Papers missing a summary or digest, most recently added first.
    async fn pending_papers(&self, limit: u32) -> crate::error::Result<Vec<Paper>>;

    /// The most recently added papers regardless of summary state.
    async fn recent_papers(&self, limit: u32) -> crate::error::Result<Vec<Paper>>;

    // ── Outcomes ───────────────────────────────────────────────────

    /// Replace a paper's summary fields in one statement.
    async fn save_summary(&self, id: PaperId, update: &SummaryUpdate) -> crate::error::Result<()>;

    /// Store the skip sentinel with the triage reason as the digest.
    async fn mark_skipped(&self, id: PaperId, reason: &str) -> crate::error::Result<()>;

    // ── Metrics ────────────────────────────────────────────────────

    /// Get summary statistics about the store.
    async fn stats(&self) -> crate::error::Result<StoreStats>;
}
