//! First and second dose uptake.
//!
//! Dose-1 susceptibles are tracked by days since the first dose. From `min_interval_between_doses`
//! on, a share of each cohort receives the second dose early; the cohort reaching the last dose-1
//! phase receives it unconditionally. Dose-2 susceptibles accumulate in their last phase.

use crate::error::ModelError;
use crate::numeric::Precision;
use crate::rates::RateConfiguration;
use crate::state::PhaseSeries;

/// Extension point for vaccinating unvaccinated recovered people.
///
/// Implementations return, per recovered phase, the proportion receiving a first dose this step.
/// The engine caps each amount at the phase's population, moves it out of the recovered series
/// and into the first dose-1 phase.
pub trait RecoveredUptake: Send + Sync {
    fn uptake(
        &self,
        rates: &RateConfiguration,
        age_group: usize,
        recovered: &PhaseSeries,
    ) -> Vec<f64>;
}

/// Recovered people are never vaccinated.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRecoveredUptake;

impl RecoveredUptake for NoRecoveredUptake {
    fn uptake(&self, _: &RateConfiguration, _: usize, _: &PhaseSeries) -> Vec<f64> {
        Vec::new()
    }
}

/// Unvaccinated susceptibles taking their first dose, out of those not exposed this step.
pub(crate) fn dose1_inflow(
    susceptible: f64,
    newly_exposed: f64,
    rate: f64,
    precision: Precision,
) -> f64 {
    precision
        .correct(rate * susceptible)
        .min(susceptible - newly_exposed)
        .max(0.0)
}

/// Removes the recovered uptake from a recovered series, returning the amount moved.
pub(crate) fn take_recovered_uptake(
    recovered: &mut PhaseSeries,
    uptake: &[f64],
    precision: Precision,
) -> f64 {
    let mut taken = 0.0;
    for (value, &amount) in recovered.values_mut().zip(uptake) {
        let amount = precision.correct(amount).clamp(0.0, *value);
        *value -= amount;
        taken += amount;
    }
    taken
}

/// Advances both dose series after this step's exposure losses.
///
/// `early_rates[k]` is the dose-2 uptake of the dose-1 cohort in phase `min_interval + k`.
///
/// # Errors
///
/// Returns `ModelError::MissingData` if `early_rates` ends before the last dose-1 phase.
#[allow(clippy::too_many_arguments)]
pub(crate) fn advance_doses(
    dose1: &PhaseSeries,
    dose2: &PhaseSeries,
    dose1_loss: &[f64],
    dose2_loss: &[f64],
    dose1_inflow: f64,
    early_rates: &[f64],
    min_interval: usize,
    precision: Precision,
) -> Result<(PhaseSeries, PhaseSeries), ModelError> {
    let remaining1 = remaining(dose1, dose1_loss, precision);
    let remaining2 = remaining(dose2, dose2_loss, precision);

    let last = remaining1.len().saturating_sub(1);
    let promoted = remaining1
        .iter()
        .enumerate()
        .map(|(phase, &value)| {
            if phase == last {
                Ok(value)
            } else if phase >= min_interval {
                let rate = early_rates.get(phase - min_interval).ok_or_else(|| {
                    ModelError::MissingData(format!(
                        "no dose-2 uptake rate for dose-1 phase {phase}"
                    ))
                })?;
                Ok(precision.correct(rate * value))
            } else {
                Ok(0.0)
            }
        })
        .collect::<Result<Vec<f64>, ModelError>>()?;

    let next1 = remaining1.advance(dose1_inflow, false, |phase, value| {
        precision.correct(value - promoted[phase])
    });
    let next2 = remaining2.advance(promoted.iter().sum(), true, |_, value| value);
    Ok((next1, next2))
}

fn remaining(series: &PhaseSeries, loss: &[f64], precision: Precision) -> PhaseSeries {
    series
        .iter()
        .zip(loss.iter().chain(std::iter::repeat(&0.0)))
        .map(|(value, lost)| precision.correct(value - lost))
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    fn precision() -> Precision {
        Precision::new(100_000_000)
    }

    #[test]
    fn dose1_uptake_leaves_room_for_exposure() {
        assert_almost_eq!(dose1_inflow(0.5, 0.0, 0.1, precision()), 0.05, 1e-12);
        assert_almost_eq!(dose1_inflow(0.5, 0.48, 0.1, precision()), 0.02, 1e-12);
        assert_eq!(dose1_inflow(0.5, 0.5, 0.1, precision()), 0.0);
    }

    #[test]
    fn recovered_uptake_is_capped_per_phase() {
        let mut recovered = PhaseSeries::new(vec![0.1, 0.02]);
        let taken = take_recovered_uptake(&mut recovered, &[0.05, 0.5], precision());
        assert_almost_eq!(taken, 0.07, 1e-12);
        assert_almost_eq!(recovered[0], 0.05, 1e-12);
        assert_eq!(recovered[1], 0.0);
    }

    #[test]
    fn no_recovered_uptake_is_empty() {
        let rates = RateConfiguration::default();
        let recovered = PhaseSeries::new(vec![0.1]);
        assert!(NoRecoveredUptake.uptake(&rates, 0, &recovered).is_empty());
    }

    #[test]
    fn last_dose1_phase_is_promoted() {
        let dose1 = PhaseSeries::new(vec![0.1, 0.2, 0.3]);
        let dose2 = PhaseSeries::new(vec![0.0, 0.0]);
        let (next1, next2) =
            advance_doses(&dose1, &dose2, &[], &[], 0.05, &[0.0], 1, precision()).unwrap();
        assert_eq!(next1.as_slice(), &[0.05, 0.1, 0.2]);
        assert_almost_eq!(next2[0], 0.3, 1e-12);
        assert_almost_eq!(next2[1], 0.0, 1e-12);
    }

    #[test]
    fn early_promotion_after_minimum_interval() {
        let dose1 = PhaseSeries::new(vec![0.1, 0.2, 0.3, 0.0]);
        let dose2 = PhaseSeries::new(vec![0.05, 0.4]);
        let (next1, next2) =
            advance_doses(&dose1, &dose2, &[], &[], 0.0, &[0.5, 0.25], 1, precision()).unwrap();
        // Phase 0 is before the interval, phase 1 promotes half, phase 2 a quarter.
        assert_almost_eq!(next1[1], 0.1, 1e-12);
        assert_almost_eq!(next1[2], 0.1, 1e-12);
        assert_almost_eq!(next1[3], 0.225, 1e-12);
        assert_almost_eq!(next2[0], 0.1 + 0.075, 1e-12);
        assert_almost_eq!(next2[1], 0.45, 1e-12);
    }

    #[test]
    fn exposure_loss_comes_before_promotion() {
        let dose1 = PhaseSeries::new(vec![0.2, 0.2]);
        let dose2 = PhaseSeries::new(vec![0.1]);
        let (next1, next2) = advance_doses(
            &dose1,
            &dose2,
            &[0.05, 0.1],
            &[0.02],
            0.0,
            &[0.5],
            0,
            precision(),
        )
        .unwrap();
        // Phase 0: 0.15 remain, half promoted. Phase 1: 0.1 remain, all promoted.
        assert_almost_eq!(next1[1], 0.075, 1e-12);
        assert_almost_eq!(next2[0], 0.08 + 0.075 + 0.1, 1e-12);
        let before = dose1.total() + dose2.total();
        let after = next1.total() + next2.total();
        assert_almost_eq!(before - after, 0.05 + 0.1 + 0.02, 1e-12);
    }

    #[test]
    fn missing_early_rate_is_an_error() {
        let dose1 = PhaseSeries::new(vec![0.1, 0.2, 0.3, 0.4]);
        let dose2 = PhaseSeries::new(vec![0.0]);
        let result = advance_doses(&dose1, &dose2, &[], &[], 0.0, &[0.5], 1, precision());
        assert!(matches!(result, Err(ModelError::MissingData(_))));
    }
}
