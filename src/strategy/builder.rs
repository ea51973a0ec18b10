//! Card construction.
//!
//! Turns a pool of priced legs into the best cards for one payout structure.
//! The EV engine assumes independent legs, so combinations that share a
//! player or pile into one game are never evaluated.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::card::{evaluate_probs, CardEvaluation};
use crate::payouts::PayoutStructure;
use crate::types::{CardCandidate, Leg, PropEdgeError, PropResult};

/// Card builder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Required margin of a leg's probability over the structure's break-even.
    pub min_leg_edge: f64,
    /// Best legs kept for enumeration.
    pub max_pool_size: usize,
    /// Legs allowed from one event on a single card.
    pub max_legs_per_event: usize,
    /// Legs allowed from one team on a single card.
    pub max_legs_per_team: usize,
    /// Evaluated combinations per structure before giving up.
    pub max_attempts: usize,
    pub max_cards_per_structure: usize,
    /// Accepted cards any one player may appear on.
    pub max_cards_per_player: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            min_leg_edge: 0.0,
            max_pool_size: 16,
            max_legs_per_event: 2,
            max_legs_per_team: 2,
            max_attempts: 20_000,
            max_cards_per_structure: 10,
            max_cards_per_player: 3,
        }
    }
}

/// A card that cleared its structure's EV floor.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCard {
    pub card: CardCandidate,
    pub evaluation: CardEvaluation,
}

pub struct CardBuilder {
    config: BuilderConfig,
}

impl CardBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Whether a set of legs breaks the independence assumption.
    pub fn is_correlated(&self, legs: &[&Leg]) -> bool {
        let mut players: HashMap<String, usize> = HashMap::new();
        let mut events: HashMap<&str, usize> = HashMap::new();
        let mut teams: HashMap<String, usize> = HashMap::new();
        for leg in legs {
            let seen = players.entry(leg.player_key()).or_default();
            *seen += 1;
            if *seen > 1 {
                return true;
            }
            if let Some(event) = leg.prop.event_id.as_deref() {
                let count = events.entry(event).or_default();
                *count += 1;
                if *count > self.config.max_legs_per_event {
                    return true;
                }
            }
            if let Some(team) = leg.team_key() {
                let count = teams.entry(team).or_default();
                *count += 1;
                if *count > self.config.max_legs_per_team {
                    return true;
                }
            }
        }
        false
    }

    /// Best cards for `structure` from `legs`, highest EV first.
    pub fn build(&self, structure: &PayoutStructure, legs: &[Leg]) -> PropResult<Vec<BuiltCard>> {
        let size = structure.leg_count();
        let breakeven = match structure.breakeven_leg_win_rate() {
            Ok(rate) => rate,
            Err(PropEdgeError::BreakevenUnsolvable(id)) => {
                warn!(structure = %id, "No solvable break-even, skipping structure");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let pool = self.leg_pool(legs, breakeven + self.config.min_leg_edge);
        if pool.len() < size {
            debug!(
                structure = structure.id(),
                pool = pool.len(),
                needed = size,
                "Not enough qualifying legs"
            );
            return Ok(Vec::new());
        }

        let mut candidates: Vec<BuiltCard> = Vec::new();
        let mut attempts = 0usize;
        let mut idx: Vec<usize> = (0..size).collect();
        loop {
            let chosen: Vec<&Leg> = idx.iter().map(|&i| pool[i]).collect();
            if !self.is_correlated(&chosen) {
                attempts += 1;
                let probs: Vec<f64> = chosen.iter().map(|l| l.true_prob()).collect();
                let evaluation = evaluate_probs(structure, &probs)?;
                if evaluation.expected_value >= structure.min_card_ev() {
                    candidates.push(BuiltCard {
                        card: CardCandidate::new(
                            structure.id(),
                            chosen.iter().map(|&l| l.clone()).collect(),
                        ),
                        evaluation,
                    });
                }
                if attempts >= self.config.max_attempts {
                    debug!(structure = structure.id(), attempts, "Attempt budget exhausted");
                    break;
                }
            }
            if !next_combination(&mut idx, pool.len()) {
                break;
            }
        }

        candidates.sort_by(|a, b| {
            b.evaluation
                .expected_value
                .partial_cmp(&a.evaluation.expected_value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.card.id().cmp(&b.card.id()))
        });

        let mut exposure: HashMap<String, usize> = HashMap::new();
        let mut accepted = Vec::new();
        for built in candidates {
            if accepted.len() >= self.config.max_cards_per_structure {
                break;
            }
            let over_exposed = built.card.legs.iter().any(|l| {
                exposure.get(&l.player_key()).copied().unwrap_or(0) >= self.config.max_cards_per_player
            });
            if over_exposed {
                continue;
            }
            for leg in &built.card.legs {
                *exposure.entry(leg.player_key()).or_default() += 1;
            }
            accepted.push(built);
        }

        info!(
            structure = structure.id(),
            pool = pool.len(),
            attempts,
            accepted = accepted.len(),
            "Cards built"
        );
        Ok(accepted)
    }

    /// Qualifying legs, best first, one per prop and side.
    fn leg_pool<'a>(&self, legs: &'a [Leg], min_prob: f64) -> Vec<&'a Leg> {
        let mut pool: Vec<&Leg> = legs.iter().filter(|l| l.true_prob() >= min_prob).collect();
        pool.sort_by(|a, b| {
            b.true_prob()
                .partial_cmp(&a.true_prob())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.prop.key().cmp(&b.prop.key()))
                .then_with(|| a.side.cmp(&b.side))
        });
        pool.dedup_by(|a, b| a.prop.key() == b.prop.key() && a.side == b.side);
        pool.truncate(self.config.max_pool_size);
        pool
    }
}

/// Advance `idx` to the next k-combination of 0..n in lexicographic order.
fn next_combination(idx: &mut [usize], n: usize) -> bool {
    let k = idx.len();
    for i in (0..k).rev() {
        if idx[i] < n - k + i {
            idx[i] += 1;
            for j in i + 1..k {
                idx[j] = idx[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
