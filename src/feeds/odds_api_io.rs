//! Odds-API.io player-prop feed.
//!
//! Pulls NBA player-prop odds from every US sportsbook the API carries and
//! flattens them into `BookQuote`s.
//!
//! Endpoint: GET https://{host}/v4/sports/{sport}/odds
//! Auth: `apiKey` query parameter.
//! Billing: one request per call regardless of market count, so callers
//! should wrap this feed in `CachedFeed`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::OddsFeed;
use crate::types::{BookQuote, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_HOST: &str = "api.the-odds-api.com";
pub const DEFAULT_SPORT: &str = "basketball_nba";
const FEED_NAME: &str = "odds_api_io";

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

/// Player-prop markets requested by default, alternates included.
pub const DEFAULT_MARKETS: &[&str] = &[
    "player_points",
    "player_rebounds",
    "player_assists",
    "player_threes",
    "player_blocks",
    "player_steals",
    "player_turnovers",
    "player_points_rebounds",
    "player_points_assists",
    "player_rebounds_assists",
    "player_points_rebounds_assists",
    "player_points_alt",
    "player_rebounds_alt",
    "player_assists_alt",
    "player_threes_alt",
    "player_blocks_alt",
    "player_steals_alt",
    "player_turnovers_alt",
];

/// Stat category for a market key. Alternate-line markets share their
/// base market's stat.
pub fn stat_for_market(market: &str) -> Option<&'static str> {
    let base = market.trim().strip_suffix("_alt").unwrap_or(market.trim());
    let stat = match base {
        "player_points" => "points",
        "player_rebounds" => "rebounds",
        "player_assists" => "assists",
        "player_threes" => "threes",
        "player_blocks" => "blocks",
        "player_steals" => "steals",
        "player_turnovers" => "turnovers",
        "player_points_rebounds" => "pr",
        "player_points_assists" => "pa",
        "player_rebounds_assists" => "ra",
        "player_points_rebounds_assists" => "pra",
        _ => return None,
    };
    Some(stat)
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// The API returns a bare array; some proxies wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventsResponse {
    List(Vec<ApiEvent>),
    Wrapped {
        #[serde(alias = "events")]
        data: Vec<ApiEvent>,
    },
}

impl EventsResponse {
    fn into_events(self) -> Vec<ApiEvent> {
        match self {
            EventsResponse::List(events) | EventsResponse::Wrapped { data: events } => events,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: String,
    #[serde(default)]
    bookmakers: Vec<ApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct ApiBookmaker {
    key: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    markets: Vec<ApiMarket>,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    key: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    outcomes: Vec<ApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct ApiOutcome {
    /// "Over" / "Under".
    name: String,
    /// Player name.
    #[serde(default)]
    description: Option<String>,
    /// The line.
    #[serde(default)]
    point: Option<f64>,
    /// American odds.
    price: f64,
}

fn parse_side(raw: &str) -> Option<Side> {
    if let Ok(side) = raw.parse::<Side>() {
        return Some(side);
    }
    let lower = raw.to_lowercase();
    if lower.contains("over") {
        Some(Side::Over)
    } else if lower.contains("under") {
        Some(Side::Under)
    } else {
        None
    }
}

fn clean_player(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten an Odds-API.io odds response into quotes.
///
/// Outcomes with an unknown market, unreadable side, missing player or line,
/// or a zero price are skipped.
pub fn parse_events(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<BookQuote>> {
    let response: EventsResponse =
        serde_json::from_str(body).context("Failed to parse Odds-API.io response")?;
    let events = response.into_events();

    let mut quotes = Vec::new();
    let mut skipped = 0usize;
    for event in &events {
        for bookmaker in &event.bookmakers {
            let book = bookmaker.key.trim().to_lowercase();
            if book.is_empty() {
                continue;
            }
            for market in &bookmaker.markets {
                let Some(stat) = stat_for_market(&market.key) else {
                    continue;
                };
                let timestamp = market
                    .last_update
                    .or(bookmaker.last_update)
                    .unwrap_or(fetched_at);
                for outcome in &market.outcomes {
                    let side = parse_side(&outcome.name);
                    let player = outcome.description.as_deref().map(clean_player);
                    let (Some(side), Some(player), Some(line)) = (side, player, outcome.point)
                    else {
                        skipped += 1;
                        continue;
                    };
                    if player.is_empty() || outcome.price == 0.0 || !outcome.price.is_finite() {
                        skipped += 1;
                        continue;
                    }
                    quotes.push(BookQuote {
                        book: book.clone(),
                        player,
                        stat: stat.to_string(),
                        line,
                        side,
                        price: outcome.price,
                        event_id: Some(event.id.clone()),
                        timestamp,
                    });
                }
            }
        }
    }

    debug!(events = events.len(), quotes = quotes.len(), skipped, "Odds-API.io response parsed");
    Ok(quotes)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Odds-API.io HTTP client.
pub struct OddsApiIoClient {
    http: Client,
    api_key: SecretString,
    host: String,
    sport: String,
    markets: Vec<String>,
}

impl OddsApiIoClient {
    pub fn new(
        api_key: SecretString,
        host: Option<String>,
        sport: Option<String>,
        markets: Option<Vec<String>>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("PROPEDGE/0.1.0")
            .build()
            .context("Failed to build Odds-API.io HTTP client")?;

        Ok(Self {
            http,
            api_key,
            host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            sport: sport.unwrap_or_else(|| DEFAULT_SPORT.to_string()),
            markets: markets
                .unwrap_or_else(|| DEFAULT_MARKETS.iter().map(|m| m.to_string()).collect()),
        })
    }

    /// Request URL including the API key. Never log this.
    fn odds_url(&self) -> String {
        format!(
            "https://{}/v4/sports/{}/odds?apiKey={}&regions=us&oddsFormat=american&markets={}",
            self.host,
            urlencoding::encode(&self.sport),
            urlencoding::encode(self.api_key.expose_secret()),
            urlencoding::encode(&self.markets.join(",")),
        )
    }

    /// GET the odds endpoint with retry + backoff. Returns the raw body.
    async fn get_odds(&self) -> Result<String> {
        let url = self.odds_url();
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Odds-API.io request");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            match self.http.get(&url).header("Accept", "application/json").send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if let Some(remaining) = response
                            .headers()
                            .get("x-requests-remaining")
                            .and_then(|v| v.to_str().ok())
                        {
                            debug!(remaining, "Odds-API.io quota");
                        }
                        return response
                            .text()
                            .await
                            .context("Failed to read Odds-API.io response body");
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, "Retryable Odds-API.io error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }
                    anyhow::bail!("Odds-API.io API error {status}: {error_text}");
                }
                Err(e) => {
                    // reqwest errors carry the URL; strip it so the key stays out of logs.
                    let e = e.without_url();
                    warn!(attempt, error = %e, "Odds-API.io request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "Odds-API.io failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl OddsFeed for OddsApiIoClient {
    async fn fetch_quotes(&self) -> Result<Vec<BookQuote>> {
        let fetched_at = Utc::now();
        let body = self.get_odds().await?;
        let quotes = parse_events(&body, fetched_at)?;
        info!(
            sport = %self.sport,
            markets = self.markets.len(),
            quotes = quotes.len(),
            "Odds-API.io quotes fetched"
        );
        Ok(quotes)
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
