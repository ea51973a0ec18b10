//! Persistence layer.
//!
//! Reads flat JSON record files (quote snapshots, fantasy offers) and saves
//! each recommendation run as a JSON report.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::strategy::Recommendations;

/// Default report file path.
pub const DEFAULT_REPORT_FILE: &str = "propedge_report.json";

/// Load a JSON array of records.
pub fn read_records<T: DeserializeOwned>(path: &str) -> Result<Vec<T>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records from {path}"))?;
    let records: Vec<T> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse records from {path}"))?;
    debug!(path, records = records.len(), "Records loaded");
    Ok(records)
}

/// One recommendation run as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub bankroll: Decimal,
    pub recommendations: Recommendations,
}

impl RunReport {
    pub fn new(bankroll: Decimal, recommendations: Recommendations) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            bankroll,
            recommendations,
        }
    }
}

/// Save a run report to a JSON file.
pub fn save_report(report: &RunReport, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    let json = serde_json::to_string_pretty(report).context("Failed to serialise run report")?;

    std::fs::write(path, &json).with_context(|| format!("Failed to write report to {path}"))?;

    info!(
        path,
        run_id = %report.run_id,
        cards = report.recommendations.cards.len(),
        singles = report.recommendations.singles.len(),
        "Report saved"
    );
    Ok(())
}

/// Load a run report. Returns None if the file doesn't exist.
pub fn load_report(path: Option<&str>) -> Result<Option<RunReport>> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);

    if !Path::new(path).exists() {
        debug!(path, "No saved report found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report from {path}"))?;
    let report: RunReport = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse report from {path}"))?;

    Ok(Some(report))
}

/// Delete the report file (for testing or reset).
pub fn delete_report(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete report {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::risk::StakeAllocation;
    use crate::strategy::DecisionRecord;
    use crate::types::{BookQuote, Side};
    use rust_decimal_macros::dec;

    fn temp_path(tag: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("propedge_test_{tag}_{}.json", Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn make_recommendations() -> Recommendations {
        Recommendations {
            cards: Vec::new(),
            singles: Vec::new(),
            allocation: StakeAllocation {
                stakes: vec![dec!(25)],
                requested_total: dec!(25),
                allocated_total: dec!(25),
                cap: dec!(100),
                scale_factor: 1.0,
                scaling_applied: false,
            },
            decisions: vec![
                DecisionRecord::Selected {
                    id: "PP_2P[a|points|20.5:OVER,b|points|18.5:OVER]".to_string(),
                    stake: dec!(25),
                },
                DecisionRecord::InsufficientData {
                    prop: "c|assists|5.5".to_string(),
                    paired_books: 1,
                },
            ],
            consensus_props: 2,
            insufficient_props: 1,
        }
    }

    #[test]
    fn test_save_and_load_report() {
        let path = temp_path("report");
        let report = RunReport::new(dec!(1000), make_recommendations());
        save_report(&report, Some(&path)).unwrap();

        let loaded = load_report(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.bankroll, dec!(1000));
        assert_eq!(loaded.recommendations.decisions, report.recommendations.decisions);
        assert_eq!(loaded.recommendations.total_staked(), dec!(25));

        delete_report(Some(&path)).unwrap();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_load_missing_report() {
        let path = temp_path("missing");
        assert!(load_report(Some(&path)).unwrap().is_none());
        assert!(delete_report(Some(&path)).is_ok());
    }

    #[test]
    fn test_read_quote_records() {
        let path = temp_path("quotes");
        let json = r#"[
            {"book": "fanduel", "player": "Tyrese Haliburton", "stat": "assists",
             "line": 9.5, "side": "over", "price": -120, "timestamp": "2026-02-01T00:00:00Z"},
            {"book": "fanduel", "player": "Tyrese Haliburton", "stat": "assists",
             "line": 9.5, "side": "under", "price": 100, "event_id": "ind-mil",
             "timestamp": "2026-02-01T00:00:00Z"}
        ]"#;
        std::fs::write(&path, json).unwrap();

        let quotes: Vec<BookQuote> = read_records(&path).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].side, Side::Over);
        assert!(quotes[0].event_id.is_none());
        assert_eq!(quotes[1].event_id.as_deref(), Some("ind-mil"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_records_errors() {
        let missing = temp_path("nope");
        assert!(read_records::<BookQuote>(&missing).is_err());

        let path = temp_path("bad");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_records::<BookQuote>(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
