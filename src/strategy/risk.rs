//! Daily risk cap.
//!
//! A batch of sized stakes may not commit more than the daily budget. When
//! it would, every stake is scaled by the same factor so relative sizing is
//! preserved.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{EvResult, PropEdgeError, PropResult};

/// Risk configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Share of bankroll that may be staked across one day's recommendations.
    pub max_daily_risk_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_risk_pct: 0.10,
        }
    }
}

impl RiskConfig {
    /// Absolute daily cap for a bankroll, rounded down to cents.
    pub fn daily_cap(&self, bankroll: Decimal) -> PropResult<Decimal> {
        if bankroll < Decimal::ZERO {
            return Err(PropEdgeError::InvalidBankroll(format!("bankroll {bankroll} is negative")));
        }
        let pct = Decimal::from_f64(self.max_daily_risk_pct)
            .filter(|p| *p >= Decimal::ZERO)
            .ok_or_else(|| {
                PropEdgeError::Config(format!(
                    "max_daily_risk_pct {} is not a valid fraction",
                    self.max_daily_risk_pct
                ))
            })?;
        Ok((bankroll * pct).round_dp_with_strategy(2, RoundingStrategy::ToZero))
    }
}

/// Stakes after the daily cap has been applied, in batch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAllocation {
    pub stakes: Vec<Decimal>,
    pub requested_total: Decimal,
    pub allocated_total: Decimal,
    pub cap: Decimal,
    /// Multiplier applied to every stake (1.0 when unscaled).
    pub scale_factor: f64,
    pub scaling_applied: bool,
}

/// Apply a daily cap to the recommended stakes of a batch.
///
/// The cap never exceeds the bankroll.
pub fn recommended_stakes(
    batch: &[EvResult],
    bankroll: Decimal,
    cap: Decimal,
) -> PropResult<StakeAllocation> {
    if bankroll < Decimal::ZERO {
        return Err(PropEdgeError::InvalidBankroll(format!("bankroll {bankroll} is negative")));
    }
    let stakes: Vec<Decimal> = batch.iter().map(|r| r.recommended_stake).collect();
    scale_stakes(&stakes, cap.min(bankroll))
}

/// Scale stakes proportionally so they sum to at most `cap`.
pub fn scale_stakes(stakes: &[Decimal], cap: Decimal) -> PropResult<StakeAllocation> {
    if cap < Decimal::ZERO {
        return Err(PropEdgeError::InvalidBankroll(format!("cap {cap} is negative")));
    }
    if let Some(bad) = stakes.iter().find(|s| **s < Decimal::ZERO) {
        return Err(PropEdgeError::InvalidBankroll(format!("stake {bad} is negative")));
    }

    let requested_total: Decimal = stakes.iter().copied().sum();
    if requested_total <= cap {
        debug!(
            total = %requested_total,
            cap = %cap,
            "Batch within daily cap"
        );
        return Ok(StakeAllocation {
            stakes: stakes.to_vec(),
            requested_total,
            allocated_total: requested_total,
            cap,
            scale_factor: 1.0,
            scaling_applied: false,
        });
    }

    let scaled: Vec<Decimal> = stakes
        .iter()
        .map(|s| (*s * cap / requested_total).round_dp_with_strategy(2, RoundingStrategy::ToZero))
        .collect();
    let allocated_total: Decimal = scaled.iter().copied().sum();
    let scale_factor = (cap / requested_total).to_f64().unwrap_or(0.0);

    info!(
        requested = format!("${:.2}", requested_total.to_f64().unwrap_or(0.0)),
        cap = format!("${:.2}", cap.to_f64().unwrap_or(0.0)),
        scale = format!("{:.4}", scale_factor),
        "Daily risk cap applied"
    );

    Ok(StakeAllocation {
        stakes: scaled,
        requested_total,
        allocated_total,
        cap,
        scale_factor,
        scaling_applied: true,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
