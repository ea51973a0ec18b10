//! PROPEDGE: player-prop odds consensus and EV/Kelly sizing engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! fetches one materialized quote snapshot from every configured feed,
//! runs the recommendation pipeline and writes the run report.
//!
//! Usage: `propedge [config.toml]`

use anyhow::Result;
use rust_decimal::prelude::ToPrimitive;
use secrecy::SecretString;
use tracing::{info, warn};

use propedge::config::AppConfig;
use propedge::feeds::cache::CachedFeed;
use propedge::feeds::odds_api_io::OddsApiIoClient;
use propedge::feeds::snapshot::SnapshotFeed;
use propedge::feeds::{self, OddsFeed};
use propedge::storage::{self, RunReport};
use propedge::strategy::Recommendations;
use propedge::types::PickOffer;

const BANNER: &str = r#"
 ____  ____   ___  ____  _____ ____   ____ _____
|  _ \|  _ \ / _ \|  _ \| ____|  _ \ / ___| ____|
| |_) | |_) | | | | |_) |  _| | | | | |  _|  _|
|  __/|  _ <| |_| |  __/| |___| |_| | |_| | |___
|_|   |_| \_\\___/|_|   |_____|____/ \____|_____|

  Player-prop consensus · card EV · Kelly sizing
  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    // stdout carries the report; the banner goes to stderr
    eprintln!("{BANNER}");
    info!(
        config = %config_path,
        bankroll = format!("${:.2}", cfg.bankroll.amount.to_f64().unwrap_or(0.0)),
        kelly_multiplier = cfg.kelly.multiplier,
        daily_risk = format!("{:.1}%", cfg.risk.max_daily_risk_pct * 100.0),
        "PROPEDGE starting up"
    );

    // -- Snapshot ----------------------------------------------------------

    let feeds = build_feeds(&cfg)?;
    if feeds.is_empty() {
        warn!("No odds feeds configured, nothing to price");
    }
    let quotes = feeds::fetch_all(&feeds).await;
    info!(quotes = quotes.len(), feeds = feeds.len(), "Quote snapshot materialized");

    let offers: Vec<PickOffer> = match cfg.feeds.offers_path.as_deref() {
        Some(path) => storage::read_records(path)?,
        None => {
            warn!("No offers file configured, cards will not be built");
            Vec::new()
        }
    };

    // -- Recommend ---------------------------------------------------------

    let recommender = cfg.recommender()?;
    let recommendations = recommender.recommend(&quotes, &offers, cfg.bankroll.amount)?;
    log_recommendations(&recommendations);

    let report = RunReport::new(cfg.bankroll.amount, recommendations);
    println!("{}", serde_json::to_string_pretty(&report)?);
    storage::save_report(&report, cfg.storage.report_path.as_deref())?;

    Ok(())
}

/// Instantiate every enabled feed.
fn build_feeds(cfg: &AppConfig) -> Result<Vec<Box<dyn OddsFeed>>> {
    let mut feeds: Vec<Box<dyn OddsFeed>> = Vec::new();

    if let Some(path) = cfg.feeds.snapshot_path.as_deref() {
        info!(path, "Using quote snapshot");
        feeds.push(Box::new(SnapshotFeed::new(path)));
    }

    let live = &cfg.feeds.odds_api_io;
    if live.enabled {
        match AppConfig::resolve_env(&live.api_key_env) {
            Ok(key) => {
                let client = OddsApiIoClient::new(
                    SecretString::new(key),
                    live.host.clone(),
                    live.sport.clone(),
                    live.markets.clone(),
                )?;
                feeds.push(Box::new(CachedFeed::new(
                    client,
                    chrono::Duration::seconds(live.cache_ttl_secs),
                    live.max_requests_per_day,
                )));
                info!(
                    ttl_secs = live.cache_ttl_secs,
                    max_requests_per_day = live.max_requests_per_day,
                    "Odds-API.io feed enabled"
                );
            }
            Err(e) => {
                warn!(error = %e, "Odds-API.io enabled but no API key, skipping live feed");
            }
        }
    }

    Ok(feeds)
}

/// Log a human-readable summary of a recommendation pass.
fn log_recommendations(recs: &Recommendations) {
    for result in recs.cards.iter().chain(&recs.singles) {
        info!(
            id = %result.id,
            ev = format!("{:+.2}%", result.expected_value * 100.0),
            kelly = format!("{:.2}%", result.kelly_fraction * 100.0),
            stake = format!("${:.2}", result.recommended_stake.to_f64().unwrap_or(0.0)),
            confidence = %result.confidence,
            "Recommendation"
        );
    }
    info!(
        props = recs.consensus_props,
        insufficient = recs.insufficient_props,
        cards = recs.cards.len(),
        singles = recs.singles.len(),
        requested = format!("${:.2}", recs.allocation.requested_total.to_f64().unwrap_or(0.0)),
        staked = format!("${:.2}", recs.total_staked().to_f64().unwrap_or(0.0)),
        scaled = recs.allocation.scaling_applied,
        "Run complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("propedge=info"));

    let json_logging = std::env::var("PROPEDGE_LOG_JSON").is_ok();

    // Logs go to stderr so stdout stays machine-readable.
    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
