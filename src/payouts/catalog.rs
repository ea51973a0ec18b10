//! Built-in PrizePicks and Underdog payout tables.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{PayoutKind, PayoutStructure};
use crate::types::{Platform, PropResult};

/// Tolerance when checking published break-even rates against the solver.
pub const REFERENCE_TOLERANCE: f64 = 1e-3;

/// A published break-even rate that disagrees with the solved one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDrift {
    pub structure_id: String,
    pub reference: f64,
    pub solved: f64,
}

/// Lookup table of payout structures keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PayoutCatalog {
    structures: BTreeMap<String, PayoutStructure>,
}

impl PayoutCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both platforms' current ladders.
    pub fn builtin() -> PropResult<Self> {
        let mut catalog = Self::new();
        for structure in prizepicks()?.into_iter().chain(underdog()?) {
            catalog.insert(structure);
        }
        for drift in catalog.verify_references() {
            warn!(
                structure = %drift.structure_id,
                reference = format!("{:.4}", drift.reference),
                solved = format!("{:.4}", drift.solved),
                "Published break-even disagrees with solver"
            );
        }
        Ok(catalog)
    }

    /// Add or replace a structure, returning the one it replaced.
    pub fn insert(&mut self, structure: PayoutStructure) -> Option<PayoutStructure> {
        debug!(structure = structure.id(), "Registering payout structure");
        self.structures.insert(structure.id().to_string(), structure)
    }

    /// Structure by id. A miss is not an error.
    pub fn get(&self, id: &str) -> Option<&PayoutStructure> {
        self.structures.get(id)
    }

    pub fn for_platform(&self, platform: Platform) -> impl Iterator<Item = &PayoutStructure> {
        self.structures
            .values()
            .filter(move |s| s.platform() == platform)
    }

    pub fn find(
        &self,
        platform: Platform,
        leg_count: usize,
        kind: PayoutKind,
    ) -> Option<&PayoutStructure> {
        self.for_platform(platform)
            .find(|s| s.leg_count() == leg_count && s.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PayoutStructure> {
        self.structures.values()
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Structures whose reference rate is off by more than the tolerance,
    /// or whose break-even cannot be solved at all.
    pub fn verify_references(&self) -> Vec<ReferenceDrift> {
        self.structures
            .values()
            .filter_map(|s| {
                let reference = s.breakeven_reference()?;
                let solved = s.breakeven_leg_win_rate().unwrap_or(f64::NAN);
                if (solved - reference).abs() <= REFERENCE_TOLERANCE {
                    return None;
                }
                Some(ReferenceDrift {
                    structure_id: s.id().to_string(),
                    reference,
                    solved,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Platform tables
// ---------------------------------------------------------------------------

fn prizepicks() -> PropResult<Vec<PayoutStructure>> {
    let pp = Platform::PrizePicks;
    let power = [(2, 3.0, 0.5774), (3, 6.0, 0.5503), (4, 10.0, 0.5623), (5, 20.0, 0.5493), (6, 37.5, 0.5466)];

    let mut out = Vec::new();
    for (legs, multiplier, reference) in power {
        out.push(
            PayoutStructure::power(format!("PP_{legs}P"), pp, legs, multiplier)?
                .with_name(format!("PrizePicks {legs}-Pick Power"))
                .with_reference(reference),
        );
    }

    let flex: [(usize, &[(usize, f64)], f64); 4] = [
        (3, &[(3, 3.0), (2, 1.0)], 0.5774),
        (4, &[(4, 6.0), (3, 1.5)], 0.5503),
        (5, &[(5, 10.0), (4, 2.0), (3, 0.4)], 0.5425),
        (6, &[(6, 25.0), (5, 2.0), (4, 0.4)], 0.5421),
    ];
    for (legs, tiers, reference) in flex {
        out.push(
            PayoutStructure::flex(format!("PP_{legs}F"), pp, legs, tiers)?
                .with_name(format!("PrizePicks {legs}-Pick Flex"))
                .with_reference(reference),
        );
    }
    Ok(out)
}

fn underdog() -> PropResult<Vec<PayoutStructure>> {
    let ud = Platform::Underdog;
    let standard = [(2, 3.0, 0.5774), (3, 6.0, 0.5503), (4, 10.0, 0.5623), (5, 20.0, 0.5493), (6, 35.0, 0.5529)];

    let mut out = Vec::new();
    for (legs, multiplier, reference) in standard {
        out.push(
            PayoutStructure::power(format!("UD_{legs}P_STD"), ud, legs, multiplier)?
                .with_name(format!("Underdog {legs}-Pick Standard"))
                .with_reference(reference),
        );
    }

    let flex: [(usize, &[(usize, f64)], f64); 6] = [
        (3, &[(3, 3.0), (2, 1.0)], 0.5774),
        (4, &[(4, 6.0), (3, 1.5)], 0.5503),
        (5, &[(5, 10.0), (4, 2.5)], 0.5475),
        (6, &[(6, 25.0), (5, 2.6), (4, 0.25)], 0.5382),
        (7, &[(7, 40.0), (6, 2.75), (5, 0.5)], 0.5542),
        (8, &[(8, 80.0), (7, 3.0), (6, 1.0)], 0.5507),
    ];
    for (legs, tiers, reference) in flex {
        out.push(
            PayoutStructure::flex(format!("UD_{legs}F_FLX"), ud, legs, tiers)?
                .with_name(format!("Underdog {legs}-Pick Flex"))
                .with_reference(reference),
        );
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
