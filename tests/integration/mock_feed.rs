//! Mock odds feed for integration testing.
//!
//! Provides a deterministic `OddsFeed` implementation that serves a fixed
//! quote board from memory, counts fetches and can be forced to fail.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use propedge::feeds::OddsFeed;
use propedge::odds::prob_to_american;
use propedge::types::{BookQuote, PickOffer, Platform, Side};

/// Book margin added to each side when pricing a fair probability.
pub const VIG: f64 = 0.02;

/// A mock odds feed for deterministic testing.
pub struct MockFeed {
    name: &'static str,
    quotes: Arc<Mutex<Vec<BookQuote>>>,
    fetches: Arc<Mutex<u32>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockFeed {
    pub fn new(name: &'static str, quotes: Vec<BookQuote>) -> Self {
        Self {
            name,
            quotes: Arc::new(Mutex::new(quotes)),
            fetches: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// A feed that always fails.
    pub fn failing(name: &'static str, msg: &str) -> Self {
        let feed = Self::new(name, Vec::new());
        feed.set_error(msg);
        feed
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fetch_count(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl OddsFeed for MockFeed {
    async fn fetch_quotes(&self) -> Result<Vec<BookQuote>> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(self.quotes.lock().unwrap().clone())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Board builders
// ---------------------------------------------------------------------------

pub fn board_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 19, 0, 0).unwrap()
}

pub fn quote(book: &str, player: &str, stat: &str, line: f64, side: Side, price: f64, event: &str) -> BookQuote {
    BookQuote {
        book: book.to_string(),
        player: player.to_string(),
        stat: stat.to_string(),
        line,
        side,
        price,
        event_id: Some(event.to_string()),
        timestamp: board_time(),
    }
}

/// Over and under quotes from one book pricing `fair_over` with `VIG` on
/// each side.
pub fn priced_pair(book: &str, player: &str, stat: &str, line: f64, fair_over: f64, event: &str) -> Vec<BookQuote> {
    let over = prob_to_american(fair_over + VIG).unwrap();
    let under = prob_to_american(1.0 - fair_over + VIG).unwrap();
    vec![
        quote(book, player, stat, line, Side::Over, over, event),
        quote(book, player, stat, line, Side::Under, under, event),
    ]
}

pub fn offer(platform: Platform, player: &str, stat: &str, line: f64, event: &str) -> PickOffer {
    PickOffer {
        platform,
        player: player.to_string(),
        stat: stat.to_string(),
        line,
        event_id: Some(event.to_string()),
        team: None,
    }
}

/// One slate row: player, stat, line, fair over probability, event.
pub type SlateRow = (&'static str, &'static str, f64, f64, &'static str);

/// Four strong overs on four different games, plus a coin flip.
pub const SLATE: &[SlateRow] = &[
    ("Jalen Brunson", "points", 26.5, 0.66, "nyk-bos"),
    ("Nikola Jokic", "assists", 9.5, 0.64, "den-lal"),
    ("Tyrese Haliburton", "assists", 10.5, 0.63, "ind-mil"),
    ("Devin Booker", "points", 27.5, 0.62, "phx-dal"),
    ("Anthony Edwards", "threes", 3.5, 0.50, "min-okc"),
];

/// Every slate prop quoted by three sharp books.
pub fn slate_quotes() -> Vec<BookQuote> {
    let mut quotes = Vec::new();
    for &(player, stat, line, fair, event) in SLATE {
        for book in ["circa", "fanduel", "pinnacle"] {
            quotes.extend(priced_pair(book, player, stat, line, fair, event));
        }
    }
    quotes
}

pub fn slate_offers(platform: Platform) -> Vec<PickOffer> {
    SLATE
        .iter()
        .map(|&(player, stat, line, _, event)| offer(platform, player, stat, line, event))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_feed_serves_board() {
        let feed = MockFeed::new("mock", slate_quotes());
        let quotes = feed.fetch_quotes().await.unwrap();
        assert_eq!(quotes.len(), SLATE.len() * 3 * 2);
        assert_eq!(feed.fetch_count(), 1);
        assert_eq!(feed.name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_feed_forced_error() {
        let feed = MockFeed::failing("down", "HTTP 503");
        let err = feed.fetch_quotes().await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(feed.fetch_count(), 1);
    }

    #[test]
    fn test_priced_pair_carries_vig() {
        let pair = priced_pair("fanduel", "A", "points", 20.5, 0.60, "e1");
        let over = propedge::odds::american_to_prob(pair[0].price).unwrap();
        let under = propedge::odds::american_to_prob(pair[1].price).unwrap();
        assert!((over + under - 1.04).abs() < 1e-9);
    }
}
