//! The movement correction state machine.
//!
//! A cell reduces mobility towards a neighbor when that neighbor's total infectious proportion
//! crosses a threshold of its [`CorrectionTable`]. To keep the multiplier from flickering when the
//! proportion hovers around a threshold, an activated correction stays in effect inside a
//! deadband: it is kept until the proportion rises above the next threshold or falls to (or below)
//! `threshold - band_width`.
//!
//! For example, with a table entry `0.4 -> [0.2, 0.1]`, once the infectious proportion goes above
//! 0.4 the factor 0.2 applies to every proportion above 0.3, not only above 0.4.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::hashing::IndexMap;

/// One row of a [`CorrectionTable`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CorrectionThreshold {
    /// Infectious proportion at which this correction starts to apply.
    pub threshold: f64,
    /// Mobility multiplier applied while the correction is in effect.
    pub factor: f64,
    /// How far below `threshold` the proportion must fall before the correction is lifted.
    pub band_width: f64,
}

/// Thresholds sorted in ascending order.
///
/// Serialized as a JSON object mapping the threshold (as a string key) to
/// `[correction_factor, band_width]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, [f64; 2]>",
    into = "IndexMap<String, [f64; 2]>"
)]
pub struct CorrectionTable {
    entries: Vec<CorrectionThreshold>,
}

impl CorrectionTable {
    /// Builds a table from unordered thresholds.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigInconsistency` for non-finite or duplicate thresholds,
    /// factors outside `[0, 1]` or negative band widths.
    pub fn new(mut entries: Vec<CorrectionThreshold>) -> Result<Self, ModelError> {
        for entry in &entries {
            if !entry.threshold.is_finite() {
                return Err(ModelError::ConfigInconsistency(format!(
                    "correction threshold {} is not finite",
                    entry.threshold
                )));
            }
            if !(0.0..=1.0).contains(&entry.factor) {
                return Err(ModelError::ConfigInconsistency(format!(
                    "correction factor {} for threshold {} is outside [0, 1]",
                    entry.factor, entry.threshold
                )));
            }
            if entry.band_width < 0.0 {
                return Err(ModelError::ConfigInconsistency(format!(
                    "negative band width {} for threshold {}",
                    entry.band_width, entry.threshold
                )));
            }
        }
        entries.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        if entries
            .windows(2)
            .any(|pair| pair[0].threshold == pair[1].threshold)
        {
            return Err(ModelError::ConfigInconsistency(
                "duplicate correction thresholds".to_string(),
            ));
        }
        Ok(CorrectionTable { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[CorrectionThreshold] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<IndexMap<String, [f64; 2]>> for CorrectionTable {
    type Error = ModelError;

    fn try_from(map: IndexMap<String, [f64; 2]>) -> Result<Self, Self::Error> {
        let entries = map
            .into_iter()
            .map(|(key, [factor, band_width])| {
                let threshold = key.trim().parse::<f64>().map_err(|_| {
                    ModelError::ConfigInconsistency(format!(
                        "correction threshold `{key}` is not a number"
                    ))
                })?;
                Ok(CorrectionThreshold {
                    threshold,
                    factor,
                    band_width,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        CorrectionTable::new(entries)
    }
}

impl From<CorrectionTable> for IndexMap<String, [f64; 2]> {
    fn from(table: CorrectionTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|entry| {
                (
                    entry.threshold.to_string(),
                    [entry.factor, entry.band_width],
                )
            })
            .collect()
    }
}

/// Deadband state for the correction one cell applies to one neighbor.
///
/// `Inactive` is represented by `in_effect == false`; the bounds and factor are then stale and
/// ignored.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HysteresisFactor {
    pub in_effect: bool,
    #[serde(rename = "lower")]
    pub lower_bound: f64,
    #[serde(rename = "upper")]
    pub upper_bound: f64,
    pub factor: f64,
}

impl Default for HysteresisFactor {
    fn default() -> Self {
        HysteresisFactor {
            in_effect: false,
            lower_bound: 0.0,
            upper_bound: 0.0,
            factor: 1.0,
        }
    }
}

impl HysteresisFactor {
    /// Returns the mobility correction for an infectious proportion, updating the deadband state.
    pub fn correction(&mut self, table: &CorrectionTable, infectious_proportion: f64) -> f64 {
        if self.in_effect && infectious_proportion > self.upper_bound {
            self.in_effect = false;
        }

        // Strict `>` here: with a lower bound of zero, `>=` would keep the correction forever
        // because the proportion can never drop below zero.
        if self.in_effect && infectious_proportion > self.lower_bound {
            return self.factor;
        }
        self.in_effect = false;

        let mut correction = 1.0;
        let entries = table.entries();
        for (index, entry) in entries.iter().enumerate() {
            if entry.threshold > infectious_proportion {
                break;
            }
            correction = entry.factor;
            self.in_effect = true;
            self.lower_bound = entry.threshold - entry.band_width;
            self.upper_bound = entries
                .get(index + 1)
                .map_or(entry.threshold, |next| next.threshold);
            self.factor = entry.factor;
        }
        correction
    }
}

/// Blends a correction with the fraction of the population that ignores it.
#[must_use]
pub fn effective_correction(disobedient: f64, correction: f64) -> f64 {
    disobedient + (1.0 - disobedient) * correction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    fn table() -> CorrectionTable {
        serde_json::from_str(r#"{"0.4": [0.2, 0.1], "0.1": [0.5, 0.1], "0.7": [0.1, 0.2]}"#)
            .unwrap()
    }

    #[test]
    fn table_is_sorted_on_load() {
        let thresholds: Vec<f64> = table().entries().iter().map(|e| e.threshold).collect();
        assert_eq!(thresholds, vec![0.1, 0.4, 0.7]);
    }

    #[test]
    fn table_rejects_bad_rows() {
        assert!(serde_json::from_str::<CorrectionTable>(r#"{"x": [0.5, 0.1]}"#).is_err());
        assert!(serde_json::from_str::<CorrectionTable>(r#"{"0.1": [1.5, 0.1]}"#).is_err());
        assert!(serde_json::from_str::<CorrectionTable>(r#"{"0.1": [0.5, -0.1]}"#).is_err());
        assert!(
            serde_json::from_str::<CorrectionTable>(r#"{"0.1": [0.5, 0.1], "0.10": [0.4, 0.1]}"#)
                .is_err()
        );
    }

    #[test]
    fn below_every_threshold_is_uncorrected() {
        let mut factor = HysteresisFactor::default();
        assert_almost_eq!(factor.correction(&table(), 0.05), 1.0, 1e-12);
        assert!(!factor.in_effect);
    }

    #[test]
    fn last_matching_threshold_wins() {
        let mut factor = HysteresisFactor::default();
        assert_almost_eq!(factor.correction(&table(), 0.45), 0.2, 1e-12);
        assert!(factor.in_effect);
        assert_almost_eq!(factor.lower_bound, 0.3, 1e-12);
        assert_almost_eq!(factor.upper_bound, 0.7, 1e-12);
    }

    #[test]
    fn threshold_itself_activates() {
        let mut factor = HysteresisFactor::default();
        assert_almost_eq!(factor.correction(&table(), 0.4), 0.2, 1e-12);
    }

    #[test]
    fn deadband_holds_factor_until_lower_bound() {
        let table = table();
        let mut factor = HysteresisFactor::default();
        factor.correction(&table, 0.45);

        // Below the threshold but inside the band: no rescan.
        assert_almost_eq!(factor.correction(&table, 0.35), 0.2, 1e-12);
        assert_almost_eq!(factor.correction(&table, 0.31), 0.2, 1e-12);

        // Exactly on the lower bound releases the correction and falls back to 0.1 -> 0.5.
        assert_almost_eq!(factor.correction(&table, 0.3), 0.5, 1e-12);
        assert_almost_eq!(factor.upper_bound, 0.4, 1e-12);
    }

    #[test]
    fn exceeding_upper_bound_rescans() {
        let table = table();
        let mut factor = HysteresisFactor::default();
        factor.correction(&table, 0.15);
        assert_almost_eq!(factor.factor, 0.5, 1e-12);
        assert_almost_eq!(factor.correction(&table, 0.75), 0.1, 1e-12);
        // No higher threshold: the upper bound is the threshold itself.
        assert_almost_eq!(factor.upper_bound, 0.7, 1e-12);
        assert_almost_eq!(factor.lower_bound, 0.5, 1e-12);
    }

    #[test]
    fn zero_lower_bound_releases_at_zero() {
        let table: CorrectionTable = serde_json::from_str(r#"{"0.1": [0.5, 0.1]}"#).unwrap();
        let mut factor = HysteresisFactor::default();
        factor.correction(&table, 0.15);
        assert_almost_eq!(factor.lower_bound, 0.0, 1e-12);
        assert_almost_eq!(factor.correction(&table, 0.05), 0.5, 1e-12);
        assert_almost_eq!(factor.correction(&table, 0.0), 1.0, 1e-12);
        assert!(!factor.in_effect);
    }

    #[test]
    fn constant_proportion_is_idempotent() {
        let table = table();
        for proportion in [0.0, 0.2, 0.4, 0.55, 0.9] {
            let mut factor = HysteresisFactor::default();
            let first = factor.correction(&table, proportion);
            let settled = factor;
            for _ in 0..5 {
                assert_almost_eq!(factor.correction(&table, proportion), first, 1e-12);
                assert_eq!(factor, settled);
            }
        }
    }

    #[test]
    fn effective_correction_blends_disobedience() {
        assert_almost_eq!(effective_correction(0.0, 0.2), 0.2, 1e-12);
        assert_almost_eq!(effective_correction(1.0, 0.2), 1.0, 1e-12);
        assert_almost_eq!(effective_correction(0.25, 0.2), 0.4, 1e-12);
    }

    #[test]
    fn factor_snapshot_field_names() {
        let json = serde_json::to_value(HysteresisFactor::default()).unwrap();
        assert_eq!(json["in_effect"], false);
        assert_eq!(json["lower"], 0.0);
        assert_eq!(json["upper"], 0.0);
        assert_eq!(json["factor"], 1.0);
    }
}
