//! Floating point helpers shared by the transition engine.
//!
//! `almost_eq` wraps `approx::AbsDiffEq`; `Precision` implements the fixed-step rounding every
//! per-phase quantity goes through before it is stored, so that thousands of steps of floating
//! point error cannot break the susceptible closure identity.

use approx::AbsDiffEq;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that the compartments of an age group sum to one.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Values this far below zero are treated as rounding noise and clamped.
pub const NEGATIVE_TOLERANCE: f64 = 1e-3;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Fixed precision rounding: `round(value * divider) / divider`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Precision {
    divider: u32,
}

impl Precision {
    #[must_use]
    pub fn new(divider: u32) -> Precision {
        Precision {
            divider: divider.max(1),
        }
    }

    #[must_use]
    pub fn divider(&self) -> u32 {
        self.divider
    }

    #[must_use]
    pub fn correct(&self, value: f64) -> f64 {
        let divider = f64::from(self.divider.max(1));
        (value * divider).round() / divider
    }
}

impl Default for Precision {
    fn default() -> Self {
        Precision::new(100_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    #[test]
    fn almost_eq_within_tolerance() {
        assert!(almost_eq(1.0, 1.0 + 0.5e-7, CONSERVATION_TOLERANCE));
        assert!(!almost_eq(1.0, 1.0 + 2e-6, CONSERVATION_TOLERANCE));
    }

    #[test]
    fn almost_eq_infinities() {
        assert!(almost_eq(f64::INFINITY, f64::INFINITY, 1e-9));
        assert!(!almost_eq(f64::INFINITY, f64::NEG_INFINITY, 1e-9));
    }

    #[test]
    fn precision_rounds_to_divider() {
        let precision = Precision::new(1000);
        assert_almost_eq!(precision.correct(0.123_456), 0.123, 1e-12);
        assert_almost_eq!(precision.correct(0.000_6), 0.001, 1e-12);
        assert_almost_eq!(precision.correct(-0.000_04), 0.0, 1e-12);
    }

    #[test]
    #[should_panic(expected = "exposed phase 3")]
    fn assertion_message_names_the_quantity() {
        let phase = 3;
        assert_almost_eq!(0.5, 0.6, 1e-9, "exposed phase {phase}");
    }

    #[test]
    fn zero_divider_is_promoted_to_one() {
        let precision = Precision::new(0);
        assert_eq!(precision.divider(), 1);
        assert_almost_eq!(precision.correct(0.6), 1.0, 1e-12);
    }

    #[test]
    fn precision_serializes_as_plain_integer() {
        let precision: Precision = serde_json::from_str("10000").unwrap();
        assert_eq!(precision.divider(), 10000);
        assert_eq!(serde_json::to_string(&precision).unwrap(), "10000");
    }
}
