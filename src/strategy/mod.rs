//! Strategy engine: cards, singles, Kelly sizing and the daily risk cap.

pub mod builder;
pub mod card;
pub mod kelly;
pub mod risk;
pub mod single;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::odds::consensus::ConsensusEngine;
use crate::odds::prob_to_american;
use crate::payouts::catalog::PayoutCatalog;
use crate::types::{
    ConsensusProp, EvResult, Leg, PickOffer, Platform, PropEdgeError, PropKey, PropResult,
    BookQuote,
};
use builder::CardBuilder;
use kelly::KellySizer;
use risk::{RiskConfig, StakeAllocation};
use single::SingleBetConfig;

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every decision made (or skipped) during a recommendation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecisionRecord {
    /// Recommended with its final stake.
    Selected { id: String, stake: Decimal },
    /// Recommended, but the daily cap cut the stake.
    Scaled {
        id: String,
        requested: Decimal,
        allocated: Decimal,
    },
    /// Positive EV but Kelly sizing produced no stake.
    KellyRejected {
        id: String,
        expected_value: f64,
        kelly_fraction: f64,
    },
    /// Fewer than the required books quoted both sides.
    InsufficientData { prop: String, paired_books: usize },
    /// Fantasy offer with no consensus prop behind it.
    UnmatchedOffer { platform: Platform, prop: String },
}

/// Everything a recommendation pass produced, ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub cards: Vec<EvResult>,
    pub singles: Vec<EvResult>,
    pub allocation: StakeAllocation,
    pub decisions: Vec<DecisionRecord>,
    pub consensus_props: usize,
    pub insufficient_props: usize,
}

impl Recommendations {
    pub fn total_staked(&self) -> Decimal {
        self.allocation.allocated_total
    }
}

// ---------------------------------------------------------------------------
// Offer matching
// ---------------------------------------------------------------------------

/// Rules for joining a fantasy offer to a consensus prop.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Largest gap between the offer's line and the book line it borrows.
    pub max_line_diff: f64,
    /// Skip props whose fair American price on either side is beyond this.
    pub max_juice: Option<f64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_line_diff: 0.75,
            max_juice: Some(200.0),
        }
    }
}

impl MatchConfig {
    fn within_juice(&self, prop: &ConsensusProp) -> bool {
        let Some(max) = self.max_juice else {
            return true;
        };
        [prop.fair_over, prop.fair_under]
            .iter()
            .all(|&p| prob_to_american(p).is_some_and(|price| price.abs() <= max))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipelines consensus → card building and single scanning → Kelly sizing →
/// daily risk cap.
pub struct Recommender {
    consensus: ConsensusEngine,
    catalog: PayoutCatalog,
    builder: CardBuilder,
    kelly: KellySizer,
    risk: RiskConfig,
    singles: SingleBetConfig,
    matching: MatchConfig,
    /// Structure ids to build; empty means every structure in the catalog.
    structures: Vec<String>,
}

impl Recommender {
    pub fn new(
        consensus: ConsensusEngine,
        catalog: PayoutCatalog,
        builder: CardBuilder,
        kelly: KellySizer,
        risk: RiskConfig,
        singles: SingleBetConfig,
    ) -> Self {
        Self {
            consensus,
            catalog,
            builder,
            kelly,
            risk,
            singles,
            matching: MatchConfig::default(),
            structures: Vec::new(),
        }
    }

    pub fn with_matching(mut self, matching: MatchConfig) -> Self {
        self.matching = matching;
        self
    }

    /// Restrict card building to these structure ids.
    pub fn with_structures(mut self, structures: Vec<String>) -> Self {
        self.structures = structures;
        self
    }

    pub fn catalog(&self) -> &PayoutCatalog {
        &self.catalog
    }

    /// Run the full pipeline over one materialized snapshot.
    ///
    /// Steps:
    /// 1. Aggregate quotes into consensus props.
    /// 2. Match fantasy offers to props; each leg takes the favored side.
    /// 3. Build and size cards per structure, and scan singles.
    /// 4. Rank everything by EV × Kelly fraction.
    /// 5. Apply the daily risk cap across the ranked batch.
    pub fn recommend(
        &self,
        quotes: &[BookQuote],
        offers: &[PickOffer],
        bankroll: Decimal,
    ) -> PropResult<Recommendations> {
        if bankroll < Decimal::ZERO {
            return Err(PropEdgeError::InvalidBankroll(format!("bankroll {bankroll} is negative")));
        }
        let mut decisions: Vec<DecisionRecord> = Vec::new();

        // Step 1 – consensus
        let batch = self.consensus.consensus_all(quotes)?;
        for (key, paired_books) in &batch.insufficient {
            decisions.push(DecisionRecord::InsufficientData {
                prop: key.to_string(),
                paired_books: *paired_books,
            });
        }

        // Step 2 – legs per platform
        let legs = self.match_offers(&batch.props, offers, &mut decisions);

        // Step 3 – cards and singles
        let mut priced: Vec<EvResult> = Vec::new();
        for (platform, platform_legs) in &legs {
            for structure in self.catalog.for_platform(*platform) {
                if !self.structures.is_empty() && !self.structures.iter().any(|s| s == structure.id()) {
                    continue;
                }
                for built in self.builder.build(structure, platform_legs)? {
                    priced.push(card::price_card(structure, &built.card, &self.kelly, bankroll)?);
                }
            }
        }
        priced.extend(single::scan_singles(
            &batch.props,
            quotes,
            &self.singles,
            &self.kelly,
            bankroll,
        )?);

        let mut staked: Vec<EvResult> = Vec::new();
        for result in priced {
            if result.recommended_stake > Decimal::ZERO {
                staked.push(result);
            } else {
                debug!(id = %result.id, "Kelly rejected (no stake)");
                decisions.push(DecisionRecord::KellyRejected {
                    id: result.id.clone(),
                    expected_value: result.expected_value,
                    kelly_fraction: result.kelly_fraction,
                });
            }
        }

        // Step 4 – rank by EV × Kelly fraction; higher score claims budget first
        staked.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        // Step 5 – daily cap
        let cap = self.risk.daily_cap(bankroll)?;
        let allocation = risk::recommended_stakes(&staked, bankroll, cap)?;
        for (result, &stake) in staked.iter_mut().zip(&allocation.stakes) {
            if stake < result.recommended_stake {
                decisions.push(DecisionRecord::Scaled {
                    id: result.id.clone(),
                    requested: result.recommended_stake,
                    allocated: stake,
                });
            } else {
                decisions.push(DecisionRecord::Selected {
                    id: result.id.clone(),
                    stake,
                });
            }
            result.recommended_stake = stake;
        }

        let (cards, singles): (Vec<EvResult>, Vec<EvResult>) =
            staked.into_iter().partition(EvResult::is_card);

        info!(
            props = batch.props.len(),
            insufficient = batch.insufficient.len(),
            cards = cards.len(),
            singles = singles.len(),
            staked = format!("${:.2}", allocation.allocated_total.to_f64().unwrap_or(0.0)),
            scaled = allocation.scaling_applied,
            "Recommendation pass complete"
        );

        Ok(Recommendations {
            cards,
            singles,
            allocation,
            decisions,
            consensus_props: batch.props.len(),
            insufficient_props: batch.insufficient.len(),
        })
    }

    /// Join each offer to the nearest consensus line for the same player and
    /// stat. The leg keeps the offer's line and borrows the book probability.
    fn match_offers(
        &self,
        props: &[ConsensusProp],
        offers: &[PickOffer],
        decisions: &mut Vec<DecisionRecord>,
    ) -> BTreeMap<Platform, Vec<Leg>> {
        let mut by_player: HashMap<(String, String), Vec<(PropKey, &ConsensusProp)>> =
            HashMap::new();
        for prop in props {
            let key = prop.key();
            by_player
                .entry((key.player.clone(), key.stat.clone()))
                .or_default()
                .push((key, prop));
        }
        let tolerance = (self.matching.max_line_diff * 1000.0).round() as i64;

        let mut seen: HashSet<(Platform, PropKey)> = HashSet::new();
        let mut legs: BTreeMap<Platform, Vec<Leg>> = BTreeMap::new();

        for offer in offers {
            let key = offer.prop_key();
            if !seen.insert((offer.platform, key.clone())) {
                continue;
            }
            let nearest = by_player
                .get(&(key.player.clone(), key.stat.clone()))
                .into_iter()
                .flatten()
                .filter(|(candidate, _)| (candidate.line_milli - key.line_milli).abs() <= tolerance)
                .filter(|(_, prop)| self.matching.within_juice(prop))
                .min_by_key(|(candidate, _)| {
                    ((candidate.line_milli - key.line_milli).abs(), candidate.line_milli)
                });

            match nearest {
                Some((book_key, prop)) => {
                    let mut prop = (*prop).clone();
                    if book_key.line_milli != key.line_milli {
                        debug!(
                            prop = %key,
                            book_line = prop.line,
                            "Offer matched to nearby book line"
                        );
                        prop.line = offer.line;
                    }
                    if prop.event_id.is_none() {
                        prop.event_id = offer.event_id.clone();
                    }
                    let side = prop.favored_side();
                    legs.entry(offer.platform)
                        .or_default()
                        .push(Leg::new(prop, side).with_team(offer.team.clone()));
                }
                None => {
                    debug!(platform = %offer.platform, prop = %key, "Offer has no consensus");
                    decisions.push(DecisionRecord::UnmatchedOffer {
                        platform: offer.platform,
                        prop: key.to_string(),
                    });
                }
            }
        }
        legs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
