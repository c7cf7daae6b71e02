//! Disease progression within one track: incubation, fatalities, recoveries and the advancement
//! of the exposed, infected and recovered series.

use crate::numeric::Precision;
use crate::rates::RateConfiguration;
use crate::state::PhaseSeries;

/// Fatalities per infected phase. `modifier` is the fatality modifier when the cell is over
/// hospital capacity, and one otherwise.
pub(crate) fn fatalities(
    infected: &PhaseSeries,
    rates: &RateConfiguration,
    age_group: usize,
    modifier: f64,
    precision: Precision,
) -> Vec<f64> {
    infected
        .iter()
        .enumerate()
        .map(|(phase, &value)| {
            let deaths = precision.correct(rates.fatality(age_group, phase) * value * modifier);
            deaths.min(value)
        })
        .collect()
}

/// Recoveries per infected phase. Must be called with the fatalities of the same step: nobody
/// recovers who has already died, and the terminal phase recovers whoever is left.
pub(crate) fn recoveries(
    infected: &PhaseSeries,
    fatalities: &[f64],
    rates: &RateConfiguration,
    age_group: usize,
    precision: Precision,
) -> Vec<f64> {
    let last = infected.len().saturating_sub(1);
    infected
        .iter()
        .zip(fatalities)
        .enumerate()
        .map(|(phase, (&value, &deaths))| {
            let survivors = value - deaths;
            if phase == last {
                survivors
            } else {
                precision
                    .correct(rates.recovery(age_group, phase) * value)
                    .min(survivors)
            }
        })
        .collect()
}

/// Newly infected this step. Every phase but the last incubates at its rate; the last
/// incubates entirely.
pub(crate) fn infection_inflow(
    exposed: &PhaseSeries,
    incubation: &[f64],
    precision: Precision,
) -> f64 {
    let Some((last, earlier)) = exposed.as_slice().split_last() else {
        return 0.0;
    };
    let incubating: f64 = earlier
        .iter()
        .zip(incubation)
        .map(|(value, rate)| value * rate)
        .sum();
    precision.correct(incubating + last)
}

pub(crate) fn advance_exposed(
    exposed: &PhaseSeries,
    newly_exposed: f64,
    incubation: &[f64],
    precision: Precision,
) -> PhaseSeries {
    exposed.advance(newly_exposed, false, |phase, value| {
        precision.correct(value * (1.0 - incubation.get(phase).copied().unwrap_or(1.0)))
    })
}

pub(crate) fn advance_infected(
    infected: &PhaseSeries,
    newly_infected: f64,
    fatalities: &[f64],
    recoveries: &[f64],
    precision: Precision,
) -> PhaseSeries {
    infected.advance(newly_infected, false, |phase, value| {
        precision.correct(value - recoveries[phase] - fatalities[phase])
    })
}

/// Advances the recovered series and returns it with the terminal cohort that left it.
///
/// Without re-susceptibility the last phase is a sink and nobody leaves.
pub(crate) fn advance_recovered(
    recovered: &PhaseSeries,
    newly_recovered: f64,
    re_susceptibility: bool,
) -> (PhaseSeries, f64) {
    let leaving = if re_susceptibility { recovered.last() } else { 0.0 };
    let next = recovered.advance(newly_recovered, !re_susceptibility, |_, value| value);
    (next, leaving)
}
