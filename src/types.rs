//! Shared types for the PROPEDGE engine.
//!
//! These types form the data model used across all modules. Quotes come in
//! from feeds, consensus props and cards flow through the strategy layer,
//! and `EvResult`s come out the other end.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Side of a two-way player prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    #[serde(alias = "over", alias = "OVER")]
    Over,
    #[serde(alias = "under", alias = "UNDER")]
    Under,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Over => Side::Under,
            Side::Under => Side::Over,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Over => write!(f, "OVER"),
            Side::Under => write!(f, "UNDER"),
        }
    }
}

/// Parse a side label as feeds spell it ("Over", "o", "UNDER", ...).
impl std::str::FromStr for Side {
    type Err = PropEdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "over" | "o" => Ok(Side::Over),
            "under" | "u" => Ok(Side::Under),
            other => Err(PropEdgeError::UnknownSide(other.to_string())),
        }
    }
}

/// Fantasy contest platform offering fixed-payout cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    PrizePicks,
    Underdog,
}

impl Platform {
    pub const ALL: &'static [Platform] = &[Platform::PrizePicks, Platform::Underdog];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::PrizePicks => write!(f, "PrizePicks"),
            Platform::Underdog => write!(f, "Underdog"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = PropEdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prizepicks" | "pp" => Ok(Platform::PrizePicks),
            "underdog" | "ud" => Ok(Platform::Underdog),
            other => Err(PropEdgeError::Config(format!("Unknown platform: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Quotes & prop keys
// ---------------------------------------------------------------------------

/// One side of a player prop as quoted by a single sportsbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookQuote {
    pub book: String,
    pub player: String,
    /// Stat category: "points", "rebounds", "pra", ...
    pub stat: String,
    pub line: f64,
    pub side: Side,
    /// American odds, e.g. -115 or +105.
    pub price: f64,
    #[serde(default)]
    pub event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BookQuote {
    pub fn prop_key(&self) -> PropKey {
        PropKey::new(&self.player, &self.stat, self.line)
    }
}

impl fmt::Display for BookQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} ({:+})",
            self.book, self.player, self.stat, self.side, self.line, self.price,
        )
    }
}

/// Grouping key for a distinct prop: normalized player, stat and line.
///
/// The line is held in thousandths so that keys are hashable and ordered
/// without comparing floats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropKey {
    pub player: String,
    pub stat: String,
    pub line_milli: i64,
}

impl PropKey {
    pub fn new(player: &str, stat: &str, line: f64) -> Self {
        Self {
            player: normalize_name(player),
            stat: normalize_name(stat),
            line_milli: (line * 1000.0).round() as i64,
        }
    }

    pub fn line(&self) -> f64 {
        self.line_milli as f64 / 1000.0
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.player, self.stat, self.line())
    }
}

/// Lowercase and collapse internal whitespace.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Devigged over/under probabilities from one book's matched quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityPair {
    pub book: String,
    pub over_price: f64,
    pub under_price: f64,
    pub over: f64,
    pub under: f64,
    #[serde(default)]
    pub event_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Fair probabilities for one prop, aggregated across at least two books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusProp {
    pub player: String,
    pub stat: String,
    pub line: f64,
    #[serde(default)]
    pub event_id: Option<String>,
    pub fair_over: f64,
    pub fair_under: f64,
    pub book_count: usize,
    /// Contributing books after outlier filtering, sorted.
    pub books: Vec<String>,
}

impl ConsensusProp {
    pub fn key(&self) -> PropKey {
        PropKey::new(&self.player, &self.stat, self.line)
    }

    /// Fair probability of the given side.
    pub fn prob(&self, side: Side) -> f64 {
        match side {
            Side::Over => self.fair_over,
            Side::Under => self.fair_under,
        }
    }

    /// The side with the higher fair probability (over on a tie).
    pub fn favored_side(&self) -> Side {
        if self.fair_under > self.fair_over {
            Side::Under
        } else {
            Side::Over
        }
    }
}

impl fmt::Display for ConsensusProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (O {:.1}% / U {:.1}% | {} books)",
            self.player,
            self.stat,
            self.line,
            self.fair_over * 100.0,
            self.fair_under * 100.0,
            self.book_count,
        )
    }
}

/// Result of aggregating one prop's quotes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusOutcome {
    Consensus(ConsensusProp),
    /// Fewer than the required number of books quoted both sides, or the
    /// surviving books carry no weight.
    InsufficientData { key: PropKey, paired_books: usize },
}

impl ConsensusOutcome {
    pub fn into_prop(self) -> Option<ConsensusProp> {
        match self {
            ConsensusOutcome::Consensus(prop) => Some(prop),
            ConsensusOutcome::InsufficientData { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Offers, legs & cards
// ---------------------------------------------------------------------------

/// A fantasy platform line that can become a card leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickOffer {
    pub platform: Platform,
    pub player: String,
    pub stat: String,
    pub line: f64,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

impl PickOffer {
    pub fn prop_key(&self) -> PropKey {
        PropKey::new(&self.player, &self.stat, self.line)
    }
}

/// A consensus prop plus the chosen side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub prop: ConsensusProp,
    pub side: Side,
    /// The player's team, when the offer carries it.
    #[serde(default)]
    pub team: Option<String>,
}

impl Leg {
    pub fn new(prop: ConsensusProp, side: Side) -> Self {
        Self {
            prop,
            side,
            team: None,
        }
    }

    pub fn with_team(mut self, team: Option<String>) -> Self {
        self.team = team;
        self
    }

    pub fn team_key(&self) -> Option<String> {
        self.team
            .as_deref()
            .map(normalize_name)
            .filter(|t| !t.is_empty())
    }

    pub fn true_prob(&self) -> f64 {
        self.prop.prob(self.side)
    }

    pub fn player_key(&self) -> String {
        normalize_name(&self.prop.player)
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({:.1}%)",
            self.prop.player,
            self.prop.stat,
            self.side,
            self.prop.line,
            self.true_prob() * 100.0,
        )
    }
}

/// A candidate multi-leg card for a specific payout structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardCandidate {
    pub structure_id: String,
    pub legs: Vec<Leg>,
}

impl CardCandidate {
    pub fn new(structure_id: impl Into<String>, legs: Vec<Leg>) -> Self {
        Self {
            structure_id: structure_id.into(),
            legs,
        }
    }

    pub fn leg_probs(&self) -> Vec<f64> {
        self.legs.iter().map(Leg::true_prob).collect()
    }

    /// Stable identifier: structure plus each leg's key and side.
    pub fn id(&self) -> String {
        let legs: Vec<String> = self
            .legs
            .iter()
            .map(|l| format!("{}:{}", l.prop.key(), l.side))
            .collect();
        format!("{}[{}]", self.structure_id, legs.join(","))
    }
}

// ---------------------------------------------------------------------------
// EV results
// ---------------------------------------------------------------------------

/// Where the true probability behind an EV result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Confidence {
    /// Multi-book consensus.
    Consensus { books: usize },
    /// One book's devigged price. Lower confidence.
    SingleBook { book: String },
}

impl Confidence {
    pub fn is_low(&self) -> bool {
        matches!(self, Confidence::SingleBook { .. })
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Consensus { books } => write!(f, "consensus({books})"),
            Confidence::SingleBook { book } => write!(f, "single-book({book}, low)"),
        }
    }
}

/// What an `EvResult` prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Wager {
    Card {
        structure_id: String,
        legs: Vec<Leg>,
    },
    Single {
        book: String,
        player: String,
        stat: String,
        line: f64,
        side: Side,
        price: f64,
    },
}

/// Priced and sized opportunity: a fantasy card or a sportsbook single.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvResult {
    pub id: String,
    pub wager: Wager,
    /// Expected profit per unit staked.
    pub expected_value: f64,
    /// Singles: true minus implied probability. Cards: equal to EV.
    pub edge: f64,
    /// Singles: side probability. Cards: average leg probability.
    pub true_probability: f64,
    /// Singles: price-implied probability. Cards: structure break-even leg rate.
    pub implied_probability: f64,
    /// Unscaled Kelly fraction f*.
    pub full_kelly: f64,
    /// After multiplier and max-fraction clamp.
    pub kelly_fraction: f64,
    pub recommended_stake: Decimal,
    pub confidence: Confidence,
}

impl EvResult {
    /// Ranking score used when competing for the daily risk budget.
    pub fn score(&self) -> f64 {
        self.expected_value * self.kelly_fraction
    }

    pub fn is_card(&self) -> bool {
        matches!(self.wager, Wager::Card { .. })
    }
}

impl fmt::Display for EvResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | EV {:+.2}% | Kelly {:.2}% | stake ${} | {}",
            self.id,
            self.expected_value * 100.0,
            self.kelly_fraction * 100.0,
            self.recommended_stake,
            self.confidence,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the core engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropEdgeError {
    #[error("Invalid American odds: {0}")]
    InvalidOdds(f64),

    #[error("Invalid probability for {context}: {value}")]
    InvalidProbability { context: String, value: f64 },

    #[error("Invalid payout structure {id}: {reason}")]
    InvalidStructure { id: String, reason: String },

    #[error("Structure {structure} needs {expected} legs, got {actual}")]
    LegCountMismatch {
        structure: String,
        expected: usize,
        actual: usize,
    },

    #[error("Break-even rate unsolvable for {0}")]
    BreakevenUnsolvable(String),

    #[error("Invalid bankroll or cap: {0}")]
    InvalidBankroll(String),

    #[error("Quotes span more than one prop: {first} and {second}")]
    MixedProps { first: String, second: String },

    #[error("Unknown side: {0}")]
    UnknownSide(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type PropResult<T> = Result<T, PropEdgeError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
