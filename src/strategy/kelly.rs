//! Kelly criterion stake sizing.
//!
//! Computes stakes using fractional Kelly with a configurable multiplier and
//! a hard cap on the fraction of bankroll committed to any one wager.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::card::CardEvaluation;
use crate::payouts::PayoutStructure;
use crate::types::{PropEdgeError, PropResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How a multi-leg card's full Kelly fraction is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KellyMethod {
    /// Treat the card as a binary bet paying the top multiplier: f* = EV/b.
    Binary,
    /// Mean over variance of the net return across every hit count.
    MeanVariance,
}

/// Kelly sizing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly). Lower = more conservative.
    pub multiplier: f64,
    /// Maximum stake as a fraction of bankroll.
    pub max_fraction: f64,
    /// Stakes below this are not worth placing.
    pub min_stake: Decimal,
    /// Fractional Kelly below this is treated as no bet.
    pub min_fraction: f64,
    pub card_method: KellyMethod,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25,   // Quarter-Kelly: conservative
            max_fraction: 0.05, // Max 5% of bankroll per wager
            min_stake: dec!(1),
            min_fraction: 0.001, // 0.1% of bankroll
            card_method: KellyMethod::Binary,
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly math
// ---------------------------------------------------------------------------

/// Full Kelly fraction for a bet with expected value `ev` per unit and net
/// odds `b`. Equivalent to (p·b − q)/b. Zero when there is no edge.
pub fn full_kelly(ev: f64, net_odds: f64) -> f64 {
    if !(ev > 0.0) || !(net_odds > 0.0) {
        return 0.0;
    }
    ev / net_odds
}

/// Mean-variance approximation of Kelly, μ/σ².
pub fn mean_variance_kelly(mean: f64, variance: f64) -> f64 {
    if !(mean > 0.0) || !(variance > 0.0) {
        return 0.0;
    }
    mean / variance
}

/// Sized stake recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KellySizing {
    /// Raw Kelly fraction f*.
    pub full_kelly: f64,
    /// After multiplier and cap.
    pub fraction: f64,
    pub stake: Decimal,
    /// Whether the max-fraction cap bound.
    pub capped: bool,
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

pub struct KellySizer {
    config: KellyConfig,
}

impl KellySizer {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Access the Kelly configuration.
    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Apply the multiplier and cap to a full Kelly fraction and convert it
    /// to a stake, rounded down to cents.
    pub fn size(&self, full: f64, bankroll: Decimal) -> PropResult<KellySizing> {
        if bankroll < Decimal::ZERO {
            return Err(PropEdgeError::InvalidBankroll(format!("bankroll {bankroll} is negative")));
        }
        let full = if full.is_finite() { full.max(0.0) } else { 0.0 };

        let fractional = full * self.config.multiplier;
        let capped = fractional > self.config.max_fraction;
        let fraction = fractional.min(self.config.max_fraction).max(0.0);

        let fraction_dec = Decimal::from_f64(fraction).ok_or_else(|| {
            PropEdgeError::InvalidProbability {
                context: "kelly fraction".to_string(),
                value: fraction,
            }
        })?;
        let mut stake = (bankroll * fraction_dec).round_dp_with_strategy(2, RoundingStrategy::ToZero);

        if fraction < self.config.min_fraction {
            if fraction > 0.0 {
                debug!(
                    fraction = format!("{:.4}%", fraction * 100.0),
                    min = format!("{:.4}%", self.config.min_fraction * 100.0),
                    "Kelly fraction below floor"
                );
            }
            stake = Decimal::ZERO;
        } else if stake < self.config.min_stake {
            if stake > Decimal::ZERO {
                debug!(
                    stake = %stake,
                    min = %self.config.min_stake,
                    "Stake below minimum size"
                );
            }
            stake = Decimal::ZERO;
        }

        Ok(KellySizing {
            full_kelly: full,
            fraction,
            stake,
            capped,
        })
    }

    /// Size a single bet with expected value `ev` at net odds `net_odds`.
    pub fn size_single(&self, ev: f64, net_odds: f64, bankroll: Decimal) -> PropResult<KellySizing> {
        self.size(full_kelly(ev, net_odds), bankroll)
    }

    /// Size a card according to the configured card method.
    pub fn size_card(
        &self,
        structure: &PayoutStructure,
        evaluation: &CardEvaluation,
        bankroll: Decimal,
    ) -> PropResult<KellySizing> {
        let full = match self.config.card_method {
            KellyMethod::Binary => {
                full_kelly(evaluation.expected_value, structure.max_multiplier() - 1.0)
            }
            KellyMethod::MeanVariance => {
                mean_variance_kelly(evaluation.expected_value, evaluation.variance)
            }
        };
        let sizing = self.size(full, bankroll)?;

        debug!(
            structure = structure.id(),
            raw_kelly = format!("{:.2}%", full * 100.0),
            fractional = format!("{:.2}%", sizing.fraction * 100.0),
            stake = format!("${:.2}", sizing.stake.to_f64().unwrap_or(0.0)),
            capped = sizing.capped,
            "Card sized"
        );
        Ok(sizing)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::card::evaluate_probs;
    use crate::types::Platform;

    fn make_sizer(multiplier: f64, max_fraction: f64) -> KellySizer {
        KellySizer::new(KellyConfig {
            multiplier,
            max_fraction,
            ..KellyConfig::default()
        })
    }

    #[test]
    fn test_full_kelly_matches_textbook() {
        // p = 0.6 at even money: f* = (0.6·1 − 0.4)/1 = 0.2
        let ev = 0.6 * 1.0 - 0.4;
        assert!((full_kelly(ev, 1.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_no_edge_no_bet() {
        assert_eq!(full_kelly(0.0, 1.0), 0.0);
        assert_eq!(full_kelly(-0.05, 1.0), 0.0);
        assert_eq!(full_kelly(0.05, 0.0), 0.0);
        assert_eq!(full_kelly(f64::NAN, 1.0), 0.0);
        assert_eq!(mean_variance_kelly(-0.1, 1.0), 0.0);
        assert_eq!(mean_variance_kelly(0.1, 0.0), 0.0);
    }

    #[test]
    fn test_quarter_kelly_stake() {
        let sizer = make_sizer(0.25, 0.5);
        let sizing = sizer.size_single(0.2, 1.0, dec!(1000)).unwrap();
        assert!((sizing.full_kelly - 0.2).abs() < 1e-12);
        assert!((sizing.fraction - 0.05).abs() < 1e-12);
        assert_eq!(sizing.stake, dec!(50));
        assert!(!sizing.capped);
    }

    #[test]
    fn test_heavy_favorite_clamped_to_max_fraction() {
        let sizer = KellySizer::new(KellyConfig::default());
        // p = 0.99 at 1.05:1 net odds.
        let ev = 0.99 * 1.05 - 0.01;
        let sizing = sizer.size_single(ev, 1.05, dec!(1000)).unwrap();
        assert!(sizing.full_kelly > 0.9);
        assert_eq!(sizing.fraction, 0.05);
        assert!(sizing.capped);
        assert!(sizing.stake <= dec!(50));
        assert!(sizing.stake > dec!(49.98));
    }

    #[test]
    fn test_quarter_kelly_is_conservative() {
        let quarter = make_sizer(0.25, 0.5);
        let half = make_sizer(0.5, 0.5);
        let q = quarter.size_single(0.1, 1.0, dec!(1000)).unwrap();
        let h = half.size_single(0.1, 1.0, dec!(1000)).unwrap();
        assert!(q.stake < h.stake, "quarter {} should be less than half {}", q.stake, h.stake);
    }

    #[test]
    fn test_stake_below_minimum_is_zero() {
        let sizer = KellySizer::new(KellyConfig {
            min_stake: dec!(5),
            ..KellyConfig::default()
        });
        // 0.25 · 0.05 = 1.25% of $100 = $1.25
        let sizing = sizer.size_single(0.05, 1.0, dec!(100)).unwrap();
        assert!(sizing.fraction > 0.0);
        assert_eq!(sizing.stake, Decimal::ZERO);
    }

    #[test]
    fn test_fraction_below_floor_is_zero() {
        let sizer = KellySizer::new(KellyConfig {
            min_fraction: 0.01,
            ..KellyConfig::default()
        });
        // 0.25 · 0.02 = 0.5% of $100k would be $500, but under the 1% floor.
        let sizing = sizer.size_single(0.02, 1.0, dec!(100000)).unwrap();
        assert!((sizing.fraction - 0.005).abs() < 1e-12);
        assert_eq!(sizing.stake, Decimal::ZERO);

        let above = sizer.size_single(0.08, 1.0, dec!(100000)).unwrap();
        assert_eq!(above.stake, dec!(2000));
    }

    #[test]
    fn test_stake_rounds_down_to_cents() {
        let sizer = make_sizer(1.0, 1.0);
        let sizing = sizer.size(0.012345, dec!(1000)).unwrap();
        assert_eq!(sizing.stake, dec!(12.34));
    }

    #[test]
    fn test_negative_bankroll_rejected() {
        let sizer = KellySizer::new(KellyConfig::default());
        assert!(matches!(
            sizer.size(0.1, dec!(-1)),
            Err(PropEdgeError::InvalidBankroll(_))
        ));
        let zero = sizer.size(0.1, Decimal::ZERO).unwrap();
        assert_eq!(zero.stake, Decimal::ZERO);
    }

    #[test]
    fn test_card_methods_differ() {
        let structure =
            PayoutStructure::flex("PP_3F", Platform::PrizePicks, 3, &[(3, 3.0), (2, 1.0)]).unwrap();
        let eval = evaluate_probs(&structure, &[0.65, 0.62, 0.60]).unwrap();

        let binary = make_sizer(1.0, 1.0).size_card(&structure, &eval, dec!(1000)).unwrap();
        assert!((binary.full_kelly - 0.0825).abs() < 1e-12);

        let mv = KellySizer::new(KellyConfig {
            multiplier: 1.0,
            max_fraction: 1.0,
            card_method: KellyMethod::MeanVariance,
            ..KellyConfig::default()
        })
        .size_card(&structure, &eval, dec!(1000))
        .unwrap();
        // 0.165 / 1.258575
        assert!((mv.full_kelly - 0.131100649544).abs() < 1e-9);
        assert!(mv.stake > binary.stake);
    }

    #[test]
    fn test_kelly_config_default() {
        let config = KellyConfig::default();
        assert_eq!(config.multiplier, 0.25);
        assert_eq!(config.max_fraction, 0.05);
        assert_eq!(config.min_stake, dec!(1));
        assert_eq!(config.min_fraction, 0.001);
        assert_eq!(config.card_method, KellyMethod::Binary);
    }
}
