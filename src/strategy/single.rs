//! Single-bet EV evaluation.
//!
//! Prices one sportsbook quote against a true probability taken either from
//! the multi-book consensus or, with lower confidence, from one book's
//! devigged line.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::kelly::KellySizer;
use crate::odds::{american_to_decimal, american_to_prob, validate_probability};
use crate::types::{
    BookQuote, Confidence, ConsensusProp, EvResult, PropKey, PropResult, ProbabilityPair, Side,
    Wager,
};

/// Where the true probability for a single bet comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilitySource {
    Consensus { probability: f64, books: usize },
    SingleBook { book: String, probability: f64 },
}

impl ProbabilitySource {
    pub fn from_consensus(prop: &ConsensusProp, side: Side) -> Self {
        ProbabilitySource::Consensus {
            probability: prop.prob(side),
            books: prop.book_count,
        }
    }

    pub fn from_single_book(pair: &ProbabilityPair, side: Side) -> Self {
        let probability = match side {
            Side::Over => pair.over,
            Side::Under => pair.under,
        };
        ProbabilitySource::SingleBook {
            book: pair.book.clone(),
            probability,
        }
    }

    pub fn probability(&self) -> f64 {
        match self {
            ProbabilitySource::Consensus { probability, .. }
            | ProbabilitySource::SingleBook { probability, .. } => *probability,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            ProbabilitySource::Consensus { books, .. } => Confidence::Consensus { books: *books },
            ProbabilitySource::SingleBook { book, .. } => {
                Confidence::SingleBook { book: book.clone() }
            }
        }
    }
}

/// Stable id for a single: book, prop and side.
pub fn single_id(quote: &BookQuote) -> String {
    format!(
        "{}:{}:{}",
        quote.book.trim().to_lowercase(),
        quote.prop_key(),
        quote.side
    )
}

/// Price one quote against a true probability and size it.
///
/// EV per unit = p·b − (1 − p), where b is the net decimal payout.
pub fn evaluate_single(
    quote: &BookQuote,
    source: &ProbabilitySource,
    kelly: &KellySizer,
    bankroll: Decimal,
) -> PropResult<EvResult> {
    let p = validate_probability(source.probability(), "single true probability")?;
    let implied = american_to_prob(quote.price)?;
    let net_odds = american_to_decimal(quote.price)? - 1.0;

    let expected_value = p * net_odds - (1.0 - p);
    let sizing = kelly.size_single(expected_value, net_odds, bankroll)?;

    if source.confidence().is_low() {
        debug!(quote = %quote, "Single priced from one book, low confidence");
    }

    Ok(EvResult {
        id: single_id(quote),
        wager: Wager::Single {
            book: quote.book.clone(),
            player: quote.player.clone(),
            stat: quote.stat.clone(),
            line: quote.line,
            side: quote.side,
            price: quote.price,
        },
        expected_value,
        edge: p - implied,
        true_probability: p,
        implied_probability: implied,
        full_kelly: sizing.full_kelly,
        kelly_fraction: sizing.fraction,
        recommended_stake: sizing.stake,
        confidence: source.confidence(),
    })
}

/// Thresholds for the single-bet scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleBetConfig {
    pub enabled: bool,
    /// Minimum true-minus-implied probability edge.
    pub min_edge: f64,
}

impl Default for SingleBetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_edge: 0.02,
        }
    }
}

/// Price every book quote of every consensus prop against the consensus.
///
/// Duplicate quotes for the same book, prop and side keep the latest one.
/// Results are returned in id order and only when they clear `min_edge`
/// with positive EV.
pub fn scan_singles(
    props: &[ConsensusProp],
    quotes: &[BookQuote],
    config: &SingleBetConfig,
    kelly: &KellySizer,
    bankroll: Decimal,
) -> PropResult<Vec<EvResult>> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    let by_key: HashMap<PropKey, &ConsensusProp> = props.iter().map(|p| (p.key(), p)).collect();

    let mut latest: BTreeMap<String, &BookQuote> = BTreeMap::new();
    for quote in quotes {
        if !by_key.contains_key(&quote.prop_key()) {
            continue;
        }
        let id = single_id(quote);
        let newer = latest.get(&id).map_or(true, |existing| {
            quote.timestamp > existing.timestamp
                || (quote.timestamp == existing.timestamp && quote.price < existing.price)
        });
        if newer {
            latest.insert(id, quote);
        }
    }

    let mut results = Vec::new();
    for quote in latest.into_values() {
        let Some(prop) = by_key.get(&quote.prop_key()) else {
            continue;
        };
        let source = ProbabilitySource::from_consensus(prop, quote.side);
        let result = evaluate_single(quote, &source, kelly, bankroll)?;
        if result.edge >= config.min_edge && result.expected_value > 0.0 {
            debug!(
                single = %result.id,
                edge = format!("{:.1}%", result.edge * 100.0),
                ev = format!("{:+.2}%", result.expected_value * 100.0),
                "Single edge found"
            );
            results.push(result);
        }
    }

    info!(
        props = props.len(),
        quotes = quotes.len(),
        singles = results.len(),
        "Single-bet scan complete"
    );
    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::kelly::KellyConfig;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn make_quote(book: &str, side: Side, price: f64) -> BookQuote {
        BookQuote {
            book: book.to_string(),
            player: "Anthony Edwards".to_string(),
            stat: "threes".to_string(),
            line: 3.5,
            side,
            price,
            event_id: Some("min-den".to_string()),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap(),
        }
    }

    fn make_prop(over: f64) -> ConsensusProp {
        ConsensusProp {
            player: "Anthony Edwards".to_string(),
            stat: "threes".to_string(),
            line: 3.5,
            event_id: Some("min-den".to_string()),
            fair_over: over,
            fair_under: 1.0 - over,
            book_count: 4,
            books: vec!["circa".into(), "draftkings".into(), "fanduel".into(), "pinnacle".into()],
        }
    }

    fn make_sizer() -> KellySizer {
        KellySizer::new(KellyConfig::default())
    }

    #[test]
    fn test_consensus_single_positive_ev() {
        let quote = make_quote("betmgm", Side::Over, 120.0);
        let source = ProbabilitySource::from_consensus(&make_prop(0.50), Side::Over);
        let result = evaluate_single(&quote, &source, &make_sizer(), dec!(1000)).unwrap();

        // 0.5·1.2 − 0.5
        assert!((result.expected_value - 0.1).abs() < 1e-12);
        assert!((result.edge - (0.5 - 100.0 / 220.0)).abs() < 1e-12);
        assert!((result.implied_probability - 100.0 / 220.0).abs() < 1e-12);
        // f* = 0.1 / 1.2, quarter of that ≈ 2.08%
        assert!((result.full_kelly - 0.1 / 1.2).abs() < 1e-12);
        assert_eq!(result.recommended_stake, dec!(20.83));
        assert_eq!(result.confidence, Confidence::Consensus { books: 4 });
        assert_eq!(result.id, "betmgm:anthony edwards|threes|3.5:OVER");
    }

    #[test]
    fn test_single_book_source_is_low_confidence() {
        let pair = ProbabilityPair {
            book: "fanduel".to_string(),
            over_price: -130.0,
            under_price: 110.0,
            over: 0.55,
            under: 0.45,
            event_id: None,
        };
        let source = ProbabilitySource::from_single_book(&pair, Side::Under);
        assert!((source.probability() - 0.45).abs() < 1e-12);

        let quote = make_quote("draftkings", Side::Under, 140.0);
        let result = evaluate_single(&quote, &source, &make_sizer(), dec!(1000)).unwrap();
        assert!(result.confidence.is_low());
        assert_eq!(
            result.confidence,
            Confidence::SingleBook { book: "fanduel".to_string() }
        );
        assert!(result.expected_value > 0.0);
    }

    #[test]
    fn test_negative_ev_single_has_no_stake() {
        let quote = make_quote("betmgm", Side::Over, -150.0);
        let source = ProbabilitySource::from_consensus(&make_prop(0.50), Side::Over);
        let result = evaluate_single(&quote, &source, &make_sizer(), dec!(1000)).unwrap();
        assert!(result.expected_value < 0.0);
        assert!(result.edge < 0.0);
        assert_eq!(result.kelly_fraction, 0.0);
        assert_eq!(result.recommended_stake, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let source = ProbabilitySource::from_consensus(&make_prop(0.50), Side::Over);
        let quote = make_quote("betmgm", Side::Over, 0.0);
        assert!(evaluate_single(&quote, &source, &make_sizer(), dec!(1000)).is_err());

        let bad = ProbabilitySource::Consensus { probability: 1.5, books: 2 };
        let quote = make_quote("betmgm", Side::Over, 110.0);
        assert!(evaluate_single(&quote, &bad, &make_sizer(), dec!(1000)).is_err());
    }

    #[test]
    fn test_scan_finds_soft_book() {
        let props = vec![make_prop(0.50)];
        let quotes = vec![
            make_quote("fanduel", Side::Over, -105.0),
            make_quote("fanduel", Side::Under, -115.0),
            make_quote("betmgm", Side::Over, 125.0),
            make_quote("betmgm", Side::Under, -160.0),
        ];
        let singles = scan_singles(&props, &quotes, &SingleBetConfig::default(), &make_sizer(), dec!(1000))
            .unwrap();
        assert_eq!(singles.len(), 1);
        assert!(singles[0].id.starts_with("betmgm:"));
        assert!(singles[0].expected_value > 0.0);
    }

    #[test]
    fn test_scan_keeps_latest_duplicate() {
        let props = vec![make_prop(0.50)];
        let mut stale = make_quote("betmgm", Side::Over, 150.0);
        stale.timestamp = stale.timestamp - Duration::minutes(30);
        let quotes = vec![stale, make_quote("betmgm", Side::Over, -110.0)];
        let singles = scan_singles(&props, &quotes, &SingleBetConfig::default(), &make_sizer(), dec!(1000))
            .unwrap();
        // The fresh -110 has no edge; the stale +150 must not be used.
        assert!(singles.is_empty());
    }

    #[test]
    fn test_scan_disabled_or_unmatched() {
        let props = vec![make_prop(0.50)];
        let quotes = vec![make_quote("betmgm", Side::Over, 200.0)];
        let off = SingleBetConfig { enabled: false, ..SingleBetConfig::default() };
        assert!(scan_singles(&props, &quotes, &off, &make_sizer(), dec!(1000)).unwrap().is_empty());

        let mut other = make_quote("betmgm", Side::Over, 200.0);
        other.line = 4.5;
        let singles = scan_singles(&props, &[other], &SingleBetConfig::default(), &make_sizer(), dec!(1000))
            .unwrap();
        assert!(singles.is_empty());
    }
}
