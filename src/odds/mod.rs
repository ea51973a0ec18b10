//! Odds math primitives.
//!
//! Conversions between American odds and implied probability, devigging of
//! a two-way market, and decimal payouts. Everything here is pure.

pub mod consensus;

use crate::types::{PropEdgeError, PropResult};

/// Implied probability of an American price.
///
/// +150 ⇒ 100/250 = 0.40, −150 ⇒ 150/250 = 0.60. A price of 0 (or any
/// non-finite value) has no meaning and is rejected.
pub fn american_to_prob(price: f64) -> PropResult<f64> {
    if !price.is_finite() || price == 0.0 {
        return Err(PropEdgeError::InvalidOdds(price));
    }
    if price > 0.0 {
        Ok(100.0 / (price + 100.0))
    } else {
        Ok(-price / (-price + 100.0))
    }
}

/// American price for a probability, or `None` outside the open interval (0,1).
pub fn prob_to_american(prob: f64) -> Option<f64> {
    if !(prob > 0.0 && prob < 1.0) {
        return None;
    }
    if prob >= 0.5 {
        Some(-(prob / (1.0 - prob)) * 100.0)
    } else {
        Some(((1.0 - prob) / prob) * 100.0)
    }
}

/// Decimal odds (total return per unit staked) for an American price.
pub fn american_to_decimal(price: f64) -> PropResult<f64> {
    if !price.is_finite() || price == 0.0 {
        return Err(PropEdgeError::InvalidOdds(price));
    }
    if price > 0.0 {
        Ok(1.0 + price / 100.0)
    } else {
        Ok(1.0 + 100.0 / -price)
    }
}

/// Remove the book's margin from a pair of implied probabilities.
///
/// The returned pair sums to exactly 1.0: the larger side is normalized and
/// the smaller one is its complement, which is exact for values in [0.5, 1].
pub fn devig(over: f64, under: f64) -> PropResult<(f64, f64)> {
    for (value, context) in [(over, "devig over"), (under, "devig under")] {
        if !value.is_finite() || value <= 0.0 {
            return Err(PropEdgeError::InvalidProbability {
                context: context.to_string(),
                value,
            });
        }
    }

    let total = over + under;
    if over >= under {
        let fair_over = over / total;
        Ok((fair_over, 1.0 - fair_over))
    } else {
        let fair_under = under / total;
        Ok((1.0 - fair_under, fair_under))
    }
}

/// Reject NaN and anything outside [0,1].
pub fn validate_probability(p: f64, context: &str) -> PropResult<f64> {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return Err(PropEdgeError::InvalidProbability {
            context: context.to_string(),
            value: p,
        });
    }
    Ok(p)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
