//! Odds feeds.
//!
//! Defines the `OddsFeed` trait and provides implementations for:
//! - Odds-API.io: live sportsbook player-prop odds over HTTP
//! - Snapshot: a JSON file of previously captured quotes
//!
//! `CachedFeed` wraps any feed with a TTL cache and a daily request budget.
//! `fetch_all` only hands well-formed quotes to the engine.

pub mod cache;
pub mod odds_api_io;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::types::BookQuote;

/// Source of sportsbook player-prop quotes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Fetch every quote currently offered by this source.
    async fn fetch_quotes(&self) -> Result<Vec<BookQuote>>;

    /// Feed name for logging.
    fn name(&self) -> &'static str;
}

/// Why a quote cannot be priced, if it cannot.
pub fn quote_defect(quote: &BookQuote) -> Option<&'static str> {
    if quote.book.trim().is_empty() {
        Some("missing book")
    } else if quote.player.trim().is_empty() {
        Some("missing player")
    } else if !quote.line.is_finite() {
        Some("non-finite line")
    } else if !quote.price.is_finite() {
        Some("non-finite price")
    } else if quote.price.abs() < 100.0 {
        // American prices live at or beyond ±100; this also catches 0.
        Some("price inside (-100, 100)")
    } else {
        None
    }
}

/// Drop quotes the engine cannot price, logging each one.
pub fn retain_well_formed(feed: &str, quotes: Vec<BookQuote>) -> Vec<BookQuote> {
    quotes
        .into_iter()
        .filter(|q| match quote_defect(q) {
            Some(reason) => {
                warn!(
                    feed,
                    book = %q.book,
                    player = %q.player,
                    stat = %q.stat,
                    line = q.line,
                    price = q.price,
                    reason,
                    "Dropping malformed quote"
                );
                false
            }
            None => true,
        })
        .collect()
}

/// Fetch from every feed concurrently and merge the results.
///
/// A failing feed is logged and contributes nothing; the others still count.
/// Malformed quotes are dropped individually.
pub async fn fetch_all(feeds: &[Box<dyn OddsFeed>]) -> Vec<BookQuote> {
    let results = join_all(feeds.iter().map(|feed| feed.fetch_quotes())).await;

    let mut quotes = Vec::new();
    for (feed, result) in feeds.iter().zip(results) {
        match result {
            Ok(batch) => {
                let fetched = batch.len();
                let mut batch = retain_well_formed(feed.name(), batch);
                info!(
                    feed = feed.name(),
                    quotes = batch.len(),
                    dropped = fetched - batch.len(),
                    "Feed fetched"
                );
                quotes.append(&mut batch);
            }
            Err(e) => {
                warn!(feed = feed.name(), error = %e, "Feed failed, skipping");
            }
        }
    }
    quotes
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
