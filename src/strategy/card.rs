//! Card EV engine.
//!
//! Exact Poisson-binomial hit distribution for independent legs, then
//! expected value against a structure's payout ladder.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::kelly::KellySizer;
use crate::odds::validate_probability;
use crate::payouts::PayoutStructure;
use crate::types::{
    CardCandidate, Confidence, EvResult, Leg, PropEdgeError, PropResult, Wager,
};

/// P(exactly k legs hit) for k = 0..=n, by the O(n²) recurrence.
pub fn hit_distribution(probs: &[f64]) -> PropResult<Vec<f64>> {
    let mut dist = vec![0.0; probs.len() + 1];
    dist[0] = 1.0;
    for (i, &p) in probs.iter().enumerate() {
        let p = validate_probability(p, "leg")?;
        let q = 1.0 - p;
        for k in (1..=i + 1).rev() {
            dist[k] = dist[k] * q + dist[k - 1] * p;
        }
        dist[0] *= q;
    }
    Ok(dist)
}

/// Outcome of pricing one card on one structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardEvaluation {
    pub structure_id: String,
    pub hit_distribution: Vec<f64>,
    /// Expected profit per unit staked: Σ P(k)·payout(k) − 1.
    pub expected_value: f64,
    /// Probability of any non-zero payout.
    pub win_probability: f64,
    /// Probability of returning more than the stake.
    pub cash_probability: f64,
    /// Variance of the net return per unit staked.
    pub variance: f64,
    pub average_leg_probability: f64,
    /// `None` when the structure has no solvable break-even.
    pub breakeven_leg_rate: Option<f64>,
}

/// Price a card's legs against a structure.
pub fn evaluate_card(structure: &PayoutStructure, legs: &[Leg]) -> PropResult<CardEvaluation> {
    let probs: Vec<f64> = legs.iter().map(Leg::true_prob).collect();
    evaluate_probs(structure, &probs)
}

/// Same as [`evaluate_card`] on raw leg probabilities.
pub fn evaluate_probs(structure: &PayoutStructure, probs: &[f64]) -> PropResult<CardEvaluation> {
    if probs.len() != structure.leg_count() {
        return Err(PropEdgeError::LegCountMismatch {
            structure: structure.id().to_string(),
            expected: structure.leg_count(),
            actual: probs.len(),
        });
    }

    let dist = hit_distribution(probs)?;

    let mut mean_return = 0.0;
    let mut second_moment = 0.0;
    let mut win_probability = 0.0;
    let mut cash_probability = 0.0;
    for (hits, &p) in dist.iter().enumerate() {
        let multiplier = structure.payout_for(hits);
        let net = multiplier - 1.0;
        mean_return += p * net;
        second_moment += p * net * net;
        if multiplier > 0.0 {
            win_probability += p;
        }
        if multiplier > 1.0 {
            cash_probability += p;
        }
    }

    let average_leg_probability = if probs.is_empty() {
        0.0
    } else {
        probs.iter().sum::<f64>() / probs.len() as f64
    };

    Ok(CardEvaluation {
        structure_id: structure.id().to_string(),
        hit_distribution: dist,
        expected_value: mean_return,
        win_probability,
        cash_probability,
        variance: (second_moment - mean_return * mean_return).max(0.0),
        average_leg_probability,
        breakeven_leg_rate: structure.breakeven_leg_win_rate().ok(),
    })
}

/// Evaluate a card and size it into an `EvResult`.
pub fn price_card(
    structure: &PayoutStructure,
    card: &CardCandidate,
    kelly: &KellySizer,
    bankroll: Decimal,
) -> PropResult<EvResult> {
    let evaluation = evaluate_card(structure, &card.legs)?;
    let sizing = kelly.size_card(structure, &evaluation, bankroll)?;
    let books = card.legs.iter().map(|l| l.prop.book_count).min().unwrap_or(0);

    debug!(
        card = %card.id(),
        ev = format!("{:+.2}%", evaluation.expected_value * 100.0),
        win = format!("{:.1}%", evaluation.win_probability * 100.0),
        stake = %sizing.stake,
        "Card priced"
    );

    Ok(EvResult {
        id: card.id(),
        wager: Wager::Card {
            structure_id: structure.id().to_string(),
            legs: card.legs.clone(),
        },
        expected_value: evaluation.expected_value,
        edge: evaluation.expected_value,
        true_probability: evaluation.average_leg_probability,
        // No break-even means no uniform leg rate pays back the stake.
        implied_probability: evaluation.breakeven_leg_rate.unwrap_or(1.0),
        full_kelly: sizing.full_kelly,
        kelly_fraction: sizing.fraction,
        recommended_stake: sizing.stake,
        confidence: Confidence::Consensus { books },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
