//! Multi-book consensus.
//!
//! Pairs each book's over/under quotes, devigs them, drops outlier books by
//! median absolute deviation and takes a weighted mean of what is left.
//! Output depends only on the set of quotes, never on their order.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::{american_to_prob, devig};
use crate::types::{
    BookQuote, ConsensusOutcome, ConsensusProp, PropEdgeError, PropKey, PropResult,
    ProbabilityPair, Side,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-book weights for the consensus mean. Lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct BookWeights {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl BookWeights {
    pub fn new(weights: HashMap<String, f64>, default_weight: f64) -> Self {
        let weights = weights
            .into_iter()
            .map(|(book, w)| (book.trim().to_lowercase(), w))
            .collect();
        Self {
            weights,
            default_weight,
        }
    }

    pub fn weight(&self, book: &str) -> f64 {
        self.weights
            .get(&book.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default_weight)
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }
}

impl Default for BookWeights {
    fn default() -> Self {
        let weights = HashMap::from([
            ("fanduel".to_string(), 1.0),
            ("pinnacle".to_string(), 0.7),
            ("circa".to_string(), 0.7),
        ]);
        Self::new(weights, 0.3)
    }
}

/// Consensus engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    /// Minimum paired books for a prop to get a consensus.
    pub min_books: usize,
    /// Books further than this many MADs from the median are outliers.
    pub mad_multiplier: f64,
    pub weights: BookWeights,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_books: 2,
            mad_multiplier: 3.0,
            weights: BookWeights::default(),
        }
    }
}

/// Output of a full aggregation pass over a materialized quote set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusBatch {
    pub props: Vec<ConsensusProp>,
    /// Props dropped for lack of data, with their paired book count.
    pub insufficient: Vec<(PropKey, usize)>,
}

impl ConsensusBatch {
    pub fn find(&self, key: &PropKey) -> Option<&ConsensusProp> {
        self.props.iter().find(|p| &p.key() == key)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Consensus for the quotes of a single prop.
    ///
    /// All quotes must share one (player, stat, line) key.
    pub fn consensus_for(&self, quotes: &[BookQuote]) -> PropResult<ConsensusOutcome> {
        let Some(first) = quotes.first() else {
            return Ok(ConsensusOutcome::InsufficientData {
                key: PropKey::default(),
                paired_books: 0,
            });
        };
        let key = first.prop_key();
        if let Some(other) = quotes.iter().find(|q| q.prop_key() != key) {
            return Err(PropEdgeError::MixedProps {
                first: key.to_string(),
                second: other.prop_key().to_string(),
            });
        }
        let refs: Vec<&BookQuote> = quotes.iter().collect();
        self.aggregate(key, &refs)
    }

    /// Group quotes by prop and aggregate each group, in key order.
    pub fn consensus_all(&self, quotes: &[BookQuote]) -> PropResult<ConsensusBatch> {
        let mut groups: BTreeMap<PropKey, Vec<&BookQuote>> = BTreeMap::new();
        for quote in quotes {
            groups.entry(quote.prop_key()).or_default().push(quote);
        }

        let mut batch = ConsensusBatch::default();
        for (key, group) in groups {
            match self.aggregate(key, &group)? {
                ConsensusOutcome::Consensus(prop) => batch.props.push(prop),
                ConsensusOutcome::InsufficientData { key, paired_books } => {
                    batch.insufficient.push((key, paired_books))
                }
            }
        }

        info!(
            quotes = quotes.len(),
            props = batch.props.len(),
            insufficient = batch.insufficient.len(),
            "Consensus pass complete"
        );
        Ok(batch)
    }

    /// Match over and under quotes per book and devig each pair.
    ///
    /// Books are keyed case-insensitively and returned in name order. When a
    /// book quotes a side twice the latest timestamp wins, then the lower price.
    pub fn pair_quotes(&self, quotes: &[&BookQuote]) -> PropResult<Vec<ProbabilityPair>> {
        let mut books: BTreeMap<String, (Option<&BookQuote>, Option<&BookQuote>)> =
            BTreeMap::new();

        for &quote in quotes {
            let slot = books.entry(quote.book.trim().to_lowercase()).or_default();
            let current = match quote.side {
                Side::Over => &mut slot.0,
                Side::Under => &mut slot.1,
            };
            let replace = match current {
                None => true,
                Some(existing) => {
                    quote.timestamp > existing.timestamp
                        || (quote.timestamp == existing.timestamp && quote.price < existing.price)
                }
            };
            if replace {
                *current = Some(quote);
            }
        }

        let mut pairs = Vec::with_capacity(books.len());
        for (book, sides) in books {
            let (Some(over), Some(under)) = sides else {
                debug!(book = %book, "Discarding unmatched quote");
                continue;
            };
            let (fair_over, fair_under) =
                devig(american_to_prob(over.price)?, american_to_prob(under.price)?)?;
            pairs.push(ProbabilityPair {
                book,
                over_price: over.price,
                under_price: under.price,
                over: fair_over,
                under: fair_under,
                event_id: over.event_id.clone().or_else(|| under.event_id.clone()),
            });
        }
        Ok(pairs)
    }

    fn aggregate(&self, key: PropKey, quotes: &[&BookQuote]) -> PropResult<ConsensusOutcome> {
        let pairs = self.pair_quotes(quotes)?;
        if pairs.len() < self.config.min_books {
            debug!(prop = %key, paired = pairs.len(), "Insufficient books for consensus");
            return Ok(ConsensusOutcome::InsufficientData {
                key,
                paired_books: pairs.len(),
            });
        }

        let overs: Vec<f64> = pairs.iter().map(|p| p.over).collect();
        let med = median(&overs);
        let deviations: Vec<f64> = overs.iter().map(|o| (o - med).abs()).collect();
        let mad = median(&deviations);

        let mut kept: Vec<&ProbabilityPair> = if mad > 0.0 {
            let limit = self.config.mad_multiplier * mad;
            pairs.iter().filter(|p| (p.over - med).abs() <= limit).collect()
        } else {
            pairs.iter().collect()
        };

        if kept.len() < self.config.min_books {
            debug!(
                prop = %key,
                kept = kept.len(),
                "Outlier filter too aggressive, reverting to all books"
            );
            kept = pairs.iter().collect();
        } else if kept.len() < pairs.len() {
            debug!(
                prop = %key,
                median = format!("{:.4}", med),
                mad = format!("{:.4}", mad),
                removed = pairs.len() - kept.len(),
                "Outlier books removed"
            );
        }

        let (weighted, total_weight) = kept.iter().fold((0.0, 0.0), |(sum, total), pair| {
            let w = self.config.weights.weight(&pair.book);
            (sum + w * pair.over, total + w)
        });
        if total_weight <= 0.0 {
            debug!(prop = %key, "Contributing books carry no weight");
            return Ok(ConsensusOutcome::InsufficientData {
                key,
                paired_books: pairs.len(),
            });
        }

        let (fair_over, fair_under) = exact_pair((weighted / total_weight).clamp(0.0, 1.0));

        let player = quotes
            .iter()
            .filter(|q| q.book.trim().to_lowercase() == kept[0].book)
            .map(|q| q.player.trim().to_string())
            .min()
            .unwrap_or_else(|| key.player.clone());
        let stat = key.stat.clone();

        let prop = ConsensusProp {
            player,
            stat,
            line: key.line(),
            event_id: kept.iter().find_map(|p| p.event_id.clone()),
            fair_over,
            fair_under,
            book_count: kept.len(),
            books: kept.iter().map(|p| p.book.clone()).collect(),
        };

        debug!(
            prop = %key,
            fair_over = format!("{:.2}%", fair_over * 100.0),
            books = prop.book_count,
            "Consensus computed"
        );
        Ok(ConsensusOutcome::Consensus(prop))
    }
}

/// Split a probability into (p, 1 − p) so the two sum to exactly 1.0.
fn exact_pair(p: f64) -> (f64, f64) {
    if p >= 0.5 {
        (p, 1.0 - p)
    } else {
        let q = 1.0 - p;
        (1.0 - q, q)
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
