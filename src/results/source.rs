use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::Match;
use crate::db::Database;

/// Anything that can report finished fixtures with final scores.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Finished matches this source knows about.
    async fn fetch_finished(&self) -> Result<Vec<Match>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Reads finished matches written into the store by the feed ingestion endpoint that still
/// have pending picks.
pub struct StoredResults {
    db: Database,
}

impl StoredResults {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultSource for StoredResults {
    async fn fetch_finished(&self) -> Result<Vec<Match>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.list_finished_with_pending_picks()).await?
    }

    fn name(&self) -> &str {
        "stored-results"
    }
}
