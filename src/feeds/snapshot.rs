//! Snapshot feed: quotes captured earlier and saved as a JSON array of
//! `BookQuote` records. Used for offline runs and replays.

use anyhow::Result;
use async_trait::async_trait;

use super::OddsFeed;
use crate::storage::read_records;
use crate::types::BookQuote;

pub struct SnapshotFeed {
    path: String,
}

impl SnapshotFeed {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl OddsFeed for SnapshotFeed {
    async fn fetch_quotes(&self) -> Result<Vec<BookQuote>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_records::<BookQuote>(&path)).await?
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}
