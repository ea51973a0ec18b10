//! Contest payout structures.
//!
//! A structure maps hit counts to payout multipliers for a fixed number of
//! legs. All-or-nothing ("Power"/"Standard") structures pay only a clean
//! sweep; tiered ("Flex") structures also pay partial hits.

pub mod catalog;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::strategy::card::hit_distribution;
use crate::types::{Platform, PropEdgeError, PropResult};

/// Bisection stops once the bracket is narrower than this.
const BREAKEVEN_TOLERANCE: f64 = 1e-12;
const BREAKEVEN_MAX_ITERATIONS: usize = 200;

/// Payout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    AllOrNothing,
    Tiered,
}

/// Immutable payout ladder for one contest entry type.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutStructure {
    id: String,
    name: String,
    platform: Platform,
    kind: PayoutKind,
    leg_count: usize,
    payouts: BTreeMap<usize, f64>,
    breakeven_reference: Option<f64>,
    min_card_ev: f64,
}

impl PayoutStructure {
    /// Validate and build a structure.
    pub fn new(
        id: impl Into<String>,
        platform: Platform,
        kind: PayoutKind,
        leg_count: usize,
        payouts: BTreeMap<usize, f64>,
    ) -> PropResult<Self> {
        let id = id.into();
        let invalid = |reason: String| PropEdgeError::InvalidStructure {
            id: id.clone(),
            reason,
        };

        if leg_count == 0 {
            return Err(invalid("leg count must be at least 1".into()));
        }
        if payouts.is_empty() {
            return Err(invalid("no payout tiers".into()));
        }
        for (&hits, &multiplier) in &payouts {
            if hits > leg_count {
                return Err(invalid(format!("tier {hits} exceeds leg count {leg_count}")));
            }
            if !multiplier.is_finite() || multiplier < 0.0 {
                return Err(invalid(format!("tier {hits} has invalid multiplier {multiplier}")));
            }
        }
        if kind == PayoutKind::AllOrNothing
            && (payouts.len() != 1 || !payouts.contains_key(&leg_count))
        {
            return Err(invalid("all-or-nothing pays only on a full sweep".into()));
        }

        Ok(Self {
            name: id.clone(),
            id,
            platform,
            kind,
            leg_count,
            payouts,
            breakeven_reference: None,
            min_card_ev: default_min_card_ev(leg_count),
        })
    }

    /// All-or-nothing structure paying `multiplier` on a sweep.
    pub fn power(
        id: impl Into<String>,
        platform: Platform,
        leg_count: usize,
        multiplier: f64,
    ) -> PropResult<Self> {
        Self::new(
            id,
            platform,
            PayoutKind::AllOrNothing,
            leg_count,
            BTreeMap::from([(leg_count, multiplier)]),
        )
    }

    /// Tiered structure from (hits, multiplier) pairs.
    pub fn flex(
        id: impl Into<String>,
        platform: Platform,
        leg_count: usize,
        tiers: &[(usize, f64)],
    ) -> PropResult<Self> {
        Self::new(
            id,
            platform,
            PayoutKind::Tiered,
            leg_count,
            tiers.iter().copied().collect(),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a published break-even leg rate for cross-checking.
    pub fn with_reference(mut self, breakeven: f64) -> Self {
        self.breakeven_reference = Some(breakeven);
        self
    }

    pub fn with_min_card_ev(mut self, min_card_ev: f64) -> Self {
        self.min_card_ev = min_card_ev;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn kind(&self) -> PayoutKind {
        self.kind
    }

    pub fn leg_count(&self) -> usize {
        self.leg_count
    }

    pub fn payouts(&self) -> &BTreeMap<usize, f64> {
        &self.payouts
    }

    pub fn breakeven_reference(&self) -> Option<f64> {
        self.breakeven_reference
    }

    /// Minimum card EV worth recommending on this structure.
    pub fn min_card_ev(&self) -> f64 {
        self.min_card_ev
    }

    /// Multiplier for exactly `hits` correct legs; 0 when the tier is absent.
    pub fn payout_for(&self, hits: usize) -> f64 {
        self.payouts.get(&hits).copied().unwrap_or(0.0)
    }

    /// Largest multiplier on the ladder.
    pub fn max_multiplier(&self) -> f64 {
        self.payouts.values().copied().fold(0.0, f64::max)
    }

    /// Expected total return per unit staked when every leg hits with `p`.
    pub fn expected_payout_at(&self, p: f64) -> PropResult<f64> {
        let dist = hit_distribution(&vec![p; self.leg_count])?;
        Ok(dist
            .iter()
            .enumerate()
            .map(|(hits, prob)| prob * self.payout_for(hits))
            .sum())
    }

    /// Uniform per-leg win rate at which the expected return is exactly 1.
    pub fn breakeven_leg_win_rate(&self) -> PropResult<f64> {
        match self.kind {
            PayoutKind::AllOrNothing => {
                let multiplier = self.payout_for(self.leg_count);
                if multiplier <= 1.0 {
                    return Err(PropEdgeError::BreakevenUnsolvable(self.id.clone()));
                }
                Ok((1.0 / multiplier).powf(1.0 / self.leg_count as f64))
            }
            PayoutKind::Tiered => self.solve_breakeven(),
        }
    }

    fn solve_breakeven(&self) -> PropResult<f64> {
        let at_zero = self.payout_for(0) - 1.0;
        let at_one = self.payout_for(self.leg_count) - 1.0;
        if at_zero >= 0.0 || at_one <= 0.0 {
            return Err(PropEdgeError::BreakevenUnsolvable(self.id.clone()));
        }

        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        for _ in 0..BREAKEVEN_MAX_ITERATIONS {
            if hi - lo < BREAKEVEN_TOLERANCE {
                break;
            }
            let mid = (lo + hi) / 2.0;
            if self.expected_payout_at(mid)? < 1.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok((lo + hi) / 2.0)
    }
}

/// Bigger cards swing harder, so they must clear a higher EV bar.
fn default_min_card_ev(leg_count: usize) -> f64 {
    match leg_count {
        0..=2 => 0.008,
        3 => 0.015,
        4 => 0.02,
        5 => 0.025,
        6 => 0.03,
        7 => 0.04,
        _ => 0.05,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
