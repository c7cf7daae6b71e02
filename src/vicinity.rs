use serde::{Deserialize, Serialize};

use crate::hysteresis::CorrectionTable;

/// The relationship between a cell and one of its neighbors.
///
/// `correlation` scales how much of the neighbor's infectious population mixes with this cell;
/// `correction_factors` drives the mobility correction for the pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vicinity {
    pub correlation: f64,
    #[serde(default)]
    pub correction_factors: CorrectionTable,
}

impl Vicinity {
    #[must_use]
    pub fn new(correlation: f64, correction_factors: CorrectionTable) -> Vicinity {
        Vicinity {
            correlation,
            correction_factors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_scenario_shape() {
        let vicinity: Vicinity = serde_json::from_str(
            r#"{"correlation": 0.6, "correction_factors": {"0.2": [0.5, 0.05]}}"#,
        )
        .unwrap();
        assert_eq!(vicinity.correlation, 0.6);
        assert_eq!(vicinity.correction_factors.entries().len(), 1);
    }

    #[test]
    fn correction_factors_are_optional() {
        let vicinity: Vicinity = serde_json::from_str(r#"{"correlation": 1.0}"#).unwrap();
        assert!(vicinity.correction_factors.is_empty());
    }
}
