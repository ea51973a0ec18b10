//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section is optional and falls back to the engine defaults. Secrets (API
//! keys) are referenced by env-var name in the config and resolved at
//! runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use tracing::info;

use crate::odds::consensus::{self, BookWeights, ConsensusEngine};
use crate::payouts::catalog::PayoutCatalog;
use crate::payouts::{PayoutKind, PayoutStructure};
use crate::strategy::builder::{self, CardBuilder};
use crate::strategy::kelly::{self, KellyMethod, KellySizer};
use crate::strategy::risk;
use crate::strategy::single::SingleBetConfig;
use crate::strategy::{MatchConfig, Recommender};
use crate::types::{Platform, PropResult};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bankroll: BankrollConfig,
    pub kelly: KellyConfig,
    pub risk: RiskConfig,
    pub consensus: ConsensusConfig,
    pub builder: BuilderConfig,
    pub matching: MatchingConfig,
    pub singles: SinglesConfig,
    pub feeds: FeedsConfig,
    pub storage: StorageConfig,
    /// Extra or replacement payout structures.
    pub payouts: Vec<PayoutOverride>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BankrollConfig {
    pub amount: Decimal,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self { amount: dec!(1000) }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KellyConfig {
    pub multiplier: f64,
    pub max_fraction: f64,
    pub min_stake: Decimal,
    /// Fractional Kelly floor; anything below is not bet.
    pub min_fraction: f64,
    pub card_method: KellyMethod,
}

impl Default for KellyConfig {
    fn default() -> Self {
        let engine = kelly::KellyConfig::default();
        Self {
            multiplier: engine.multiplier,
            max_fraction: engine.max_fraction,
            min_stake: engine.min_stake,
            min_fraction: engine.min_fraction,
            card_method: engine.card_method,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub max_daily_risk_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_risk_pct: risk::RiskConfig::default().max_daily_risk_pct,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_books: usize,
    pub mad_multiplier: f64,
    /// Weight for books not listed in `book_weights`.
    pub default_weight: f64,
    pub book_weights: HashMap<String, f64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_books: 2,
            mad_multiplier: 3.0,
            default_weight: 0.3,
            book_weights: HashMap::from([
                ("fanduel".to_string(), 1.0),
                ("pinnacle".to_string(), 0.7),
                ("circa".to_string(), 0.7),
            ]),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BuilderConfig {
    pub min_leg_edge: f64,
    pub max_pool_size: usize,
    pub max_legs_per_event: usize,
    pub max_legs_per_team: usize,
    pub max_attempts: usize,
    pub max_cards_per_structure: usize,
    pub max_cards_per_player: usize,
    /// Structure ids to build. Empty means all.
    pub structures: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        let engine = builder::BuilderConfig::default();
        Self {
            min_leg_edge: engine.min_leg_edge,
            max_pool_size: engine.max_pool_size,
            max_legs_per_event: engine.max_legs_per_event,
            max_legs_per_team: engine.max_legs_per_team,
            max_attempts: engine.max_attempts,
            max_cards_per_structure: engine.max_cards_per_structure,
            max_cards_per_player: engine.max_cards_per_player,
            structures: Vec::new(),
        }
    }
}

/// How fantasy offers are joined to consensus props.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest gap between an offer's line and the book line it borrows.
    pub max_line_diff: f64,
    /// Props whose fair price on either side is beyond this are skipped.
    pub max_juice: Option<f64>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let engine = MatchConfig::default();
        Self {
            max_line_diff: engine.max_line_diff,
            max_juice: engine.max_juice,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SinglesConfig {
    pub enabled: bool,
    pub min_edge: f64,
}

impl Default for SinglesConfig {
    fn default() -> Self {
        let engine = SingleBetConfig::default();
        Self {
            enabled: engine.enabled,
            min_edge: engine.min_edge,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FeedsConfig {
    /// JSON array of quotes to load instead of (or alongside) live feeds.
    pub snapshot_path: Option<String>,
    /// JSON array of fantasy-platform offers.
    pub offers_path: Option<String>,
    pub odds_api_io: OddsApiIoConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsApiIoConfig {
    pub enabled: bool,
    pub api_key_env: String,
    pub host: Option<String>,
    pub sport: Option<String>,
    pub markets: Option<Vec<String>>,
    pub cache_ttl_secs: i64,
    pub max_requests_per_day: u32,
}

impl Default for OddsApiIoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: "ODDS_API_IO_KEY".to_string(),
            host: None,
            sport: None,
            markets: None,
            cache_ttl_secs: 60,
            max_requests_per_day: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Where each run's report is written. Defaults to `propedge_report.json`.
    pub report_path: Option<String>,
}

/// A payout structure declared in config. Replaces a built-in with the same id.
#[derive(Debug, Deserialize, Clone)]
pub struct PayoutOverride {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub platform: Platform,
    pub kind: PayoutKind,
    pub legs: usize,
    /// (hits, multiplier) pairs.
    pub tiers: Vec<(usize, f64)>,
    #[serde(default)]
    pub breakeven_reference: Option<f64>,
    #[serde(default)]
    pub min_card_ev: Option<f64>,
}

impl PayoutOverride {
    pub fn to_structure(&self) -> PropResult<PayoutStructure> {
        let mut structure = PayoutStructure::new(
            self.id.clone(),
            self.platform,
            self.kind,
            self.legs,
            self.tiers.iter().copied().collect(),
        )?;
        if let Some(name) = &self.name {
            structure = structure.with_name(name.clone());
        }
        if let Some(reference) = self.breakeven_reference {
            structure = structure.with_reference(reference);
        }
        if let Some(min_ev) = self.min_card_ev {
            structure = structure.with_min_card_ev(min_ev);
        }
        Ok(structure)
    }
}

fn in_unit_interval(x: f64) -> bool {
    x > 0.0 && x <= 1.0
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bankroll.amount <= Decimal::ZERO {
            anyhow::bail!("bankroll.amount must be positive, got {}", self.bankroll.amount);
        }
        if !in_unit_interval(self.kelly.multiplier) {
            anyhow::bail!("kelly.multiplier must be in (0, 1], got {}", self.kelly.multiplier);
        }
        if !in_unit_interval(self.kelly.max_fraction) {
            anyhow::bail!("kelly.max_fraction must be in (0, 1], got {}", self.kelly.max_fraction);
        }
        if !(self.kelly.min_fraction >= 0.0 && self.kelly.min_fraction < 1.0) {
            anyhow::bail!("kelly.min_fraction must be in [0, 1), got {}", self.kelly.min_fraction);
        }
        if self.kelly.min_stake < Decimal::ZERO {
            anyhow::bail!("kelly.min_stake must not be negative, got {}", self.kelly.min_stake);
        }
        if !in_unit_interval(self.risk.max_daily_risk_pct) {
            anyhow::bail!(
                "risk.max_daily_risk_pct must be in (0, 1], got {}",
                self.risk.max_daily_risk_pct
            );
        }
        if self.consensus.min_books < 2 {
            anyhow::bail!("consensus.min_books must be at least 2, got {}", self.consensus.min_books);
        }
        if !(self.consensus.mad_multiplier > 0.0) {
            anyhow::bail!(
                "consensus.mad_multiplier must be positive, got {}",
                self.consensus.mad_multiplier
            );
        }
        if !(self.consensus.default_weight >= 0.0) {
            anyhow::bail!(
                "consensus.default_weight must not be negative, got {}",
                self.consensus.default_weight
            );
        }
        for (book, weight) in &self.consensus.book_weights {
            if !(*weight >= 0.0) || !weight.is_finite() {
                anyhow::bail!("consensus.book_weights.{book} must not be negative, got {weight}");
            }
        }
        if self.builder.max_pool_size == 0 || self.builder.max_cards_per_player == 0 {
            anyhow::bail!("builder.max_pool_size and builder.max_cards_per_player must be at least 1");
        }
        if self.builder.max_legs_per_event == 0 || self.builder.max_legs_per_team == 0 {
            anyhow::bail!("builder.max_legs_per_event and builder.max_legs_per_team must be at least 1");
        }
        if !(self.matching.max_line_diff >= 0.0) || !self.matching.max_line_diff.is_finite() {
            anyhow::bail!(
                "matching.max_line_diff must not be negative, got {}",
                self.matching.max_line_diff
            );
        }
        if let Some(juice) = self.matching.max_juice {
            if !(juice >= 100.0) {
                anyhow::bail!("matching.max_juice must be at least 100, got {juice}");
            }
        }
        if !self.singles.min_edge.is_finite() {
            anyhow::bail!("singles.min_edge must be finite");
        }
        if self.feeds.odds_api_io.cache_ttl_secs < 0 {
            anyhow::bail!("feeds.odds_api_io.cache_ttl_secs must not be negative");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name).with_context(|| format!("Environment variable not set: {env_name}"))
    }

    // -- Engine configs ---------------------------------------------------

    pub fn kelly_config(&self) -> kelly::KellyConfig {
        kelly::KellyConfig {
            multiplier: self.kelly.multiplier,
            max_fraction: self.kelly.max_fraction,
            min_stake: self.kelly.min_stake,
            min_fraction: self.kelly.min_fraction,
            card_method: self.kelly.card_method,
        }
    }

    pub fn risk_config(&self) -> risk::RiskConfig {
        risk::RiskConfig {
            max_daily_risk_pct: self.risk.max_daily_risk_pct,
        }
    }

    pub fn consensus_config(&self) -> consensus::ConsensusConfig {
        consensus::ConsensusConfig {
            min_books: self.consensus.min_books,
            mad_multiplier: self.consensus.mad_multiplier,
            weights: BookWeights::new(
                self.consensus.book_weights.clone(),
                self.consensus.default_weight,
            ),
        }
    }

    pub fn builder_config(&self) -> builder::BuilderConfig {
        builder::BuilderConfig {
            min_leg_edge: self.builder.min_leg_edge,
            max_pool_size: self.builder.max_pool_size,
            max_legs_per_event: self.builder.max_legs_per_event,
            max_legs_per_team: self.builder.max_legs_per_team,
            max_attempts: self.builder.max_attempts,
            max_cards_per_structure: self.builder.max_cards_per_structure,
            max_cards_per_player: self.builder.max_cards_per_player,
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            max_line_diff: self.matching.max_line_diff,
            max_juice: self.matching.max_juice,
        }
    }

    pub fn singles_config(&self) -> SingleBetConfig {
        SingleBetConfig {
            enabled: self.singles.enabled,
            min_edge: self.singles.min_edge,
        }
    }

    /// Built-in payout tables with any configured overrides applied.
    pub fn payout_catalog(&self) -> PropResult<PayoutCatalog> {
        let mut catalog = PayoutCatalog::builtin()?;
        for entry in &self.payouts {
            let replaced = catalog.insert(entry.to_structure()?);
            info!(
                structure = %entry.id,
                replaced = replaced.is_some(),
                "Payout structure loaded from config"
            );
        }
        Ok(catalog)
    }

    /// Wire every engine component from this configuration.
    pub fn recommender(&self) -> PropResult<Recommender> {
        Ok(Recommender::new(
            ConsensusEngine::new(self.consensus_config()),
            self.payout_catalog()?,
            CardBuilder::new(self.builder_config()),
            KellySizer::new(self.kelly_config()),
            self.risk_config(),
            self.singles_config(),
        )
        .with_structures(self.builder.structures.clone())
        .with_matching(self.match_config()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
