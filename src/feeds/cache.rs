//! Feed caching and request limiting.
//!
//! Odds providers bill per request, so a live feed is wrapped in a short TTL
//! cache and a daily request budget. Both are plain values owned by the
//! wrapper; nothing here is process-global.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::OddsFeed;
use crate::types::BookQuote;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    quotes: Vec<BookQuote>,
    fetched_at: DateTime<Utc>,
}

/// Last successful fetch with a time-to-live.
pub struct QuoteCache {
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Cached quotes if they are younger than the TTL.
    pub fn get(&self, now: DateTime<Utc>) -> Option<&[BookQuote]> {
        self.entry
            .as_ref()
            .filter(|e| now - e.fetched_at < self.ttl)
            .map(|e| e.quotes.as_slice())
    }

    /// Cached quotes regardless of age.
    pub fn stale(&self) -> Option<&[BookQuote]> {
        self.entry.as_ref().map(|e| e.quotes.as_slice())
    }

    pub fn put(&mut self, quotes: Vec<BookQuote>, now: DateTime<Utc>) {
        self.entry = Some(CacheEntry {
            quotes,
            fetched_at: now,
        });
    }

    pub fn reset(&mut self) {
        self.entry = None;
    }
}

// ---------------------------------------------------------------------------
// Request budget
// ---------------------------------------------------------------------------

/// Requests allowed per UTC day.
pub struct RequestBudget {
    max_per_day: u32,
    day: Option<NaiveDate>,
    used: u32,
}

impl RequestBudget {
    pub fn new(max_per_day: u32) -> Self {
        Self {
            max_per_day,
            day: None,
            used: 0,
        }
    }

    /// Claim one request. Returns false once today's budget is spent.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.used = 0;
        }
        if self.used >= self.max_per_day {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn reset(&mut self) {
        self.day = None;
        self.used = 0;
    }
}

// ---------------------------------------------------------------------------
// Cached feed
// ---------------------------------------------------------------------------

struct CacheState {
    cache: QuoteCache,
    budget: RequestBudget,
}

/// Any feed behind a TTL cache and a daily request budget.
///
/// Serves stale quotes when the budget is spent or the inner feed fails.
pub struct CachedFeed<F> {
    inner: F,
    state: Mutex<CacheState>,
}

impl<F: OddsFeed> CachedFeed<F> {
    pub fn new(inner: F, ttl: Duration, max_requests_per_day: u32) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState {
                cache: QuoteCache::new(ttl),
                budget: RequestBudget::new(max_requests_per_day),
            }),
        }
    }

    /// Drop cached quotes and restore the request budget.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.cache.reset();
        state.budget.reset();
    }

    async fn fetch_at(&self, now: DateTime<Utc>) -> Result<Vec<BookQuote>> {
        let mut state = self.state.lock().await;

        if let Some(quotes) = state.cache.get(now) {
            debug!(feed = self.inner.name(), quotes = quotes.len(), "Serving cached quotes");
            return Ok(quotes.to_vec());
        }

        if !state.budget.try_acquire(now) {
            warn!(
                feed = self.inner.name(),
                used = state.budget.used(),
                "Daily request budget exhausted, serving stale quotes"
            );
            return Ok(state.cache.stale().map(<[BookQuote]>::to_vec).unwrap_or_default());
        }

        match self.inner.fetch_quotes().await {
            Ok(quotes) => {
                state.cache.put(quotes.clone(), now);
                Ok(quotes)
            }
            Err(e) => match state.cache.stale() {
                Some(stale) => {
                    warn!(feed = self.inner.name(), error = %e, "Fetch failed, serving stale quotes");
                    Ok(stale.to_vec())
                }
                None => Err(e),
            },
        }
    }
}

#[async_trait]
impl<F: OddsFeed> OddsFeed for CachedFeed<F> {
    async fn fetch_quotes(&self) -> Result<Vec<BookQuote>> {
        self.fetch_at(Utc::now()).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
