//! Mobility corrections and the force of infection a cell receives from its neighborhood.

use super::Neighbor;
use crate::error::ModelError;
use crate::hashing::IndexMap;
use crate::hysteresis::{effective_correction, HysteresisFactor};
use crate::numeric::Precision;
use crate::rates::RateConfiguration;
use crate::state::{CellId, CellState, PhaseSeries};

fn factor_for<'a>(
    hysteresis: &'a mut IndexMap<CellId, HysteresisFactor>,
    id: &str,
) -> &'a mut HysteresisFactor {
    if !hysteresis.contains_key(id) {
        hysteresis.insert(id.to_string(), HysteresisFactor::default());
    }
    &mut hysteresis[id]
}

/// Returns the correction to apply to each neighbor, in neighbor order.
///
/// The cell's own correction is driven by its own published infectious proportion. The
/// correction towards another neighbor is the more restrictive of the cell's own and the one
/// driven by that neighbor's proportion and disobedience. Each hysteresis entry is updated once.
pub(crate) fn mobility_corrections(
    cell_id: &str,
    current: &CellState,
    hysteresis: &mut IndexMap<CellId, HysteresisFactor>,
    neighbors: &[Neighbor<'_>],
) -> Result<Vec<f64>, ModelError> {
    let own = neighbors
        .iter()
        .find(|neighbor| neighbor.id == cell_id)
        .ok_or_else(|| {
            ModelError::MissingData(format!("cell {cell_id} is not part of its own neighborhood"))
        })?;
    let own_correction = factor_for(hysteresis, cell_id)
        .correction(&own.vicinity.correction_factors, own.state.total_infections());
    let own_correction = effective_correction(current.disobedient, own_correction);

    Ok(neighbors
        .iter()
        .map(|neighbor| {
            if neighbor.id == cell_id {
                return own_correction;
            }
            let correction = factor_for(hysteresis, neighbor.id).correction(
                &neighbor.vicinity.correction_factors,
                neighbor.state.total_infections(),
            );
            own_correction.min(effective_correction(neighbor.state.disobedient, correction))
        })
        .collect())
}

/// Per-capita rate at which susceptibles of `age_group` become exposed.
///
/// ```text
/// Σ_n correlation_n × correction_n
///     × Σ_a' weight_n[a'] × Σ_q mobility[q] × virulence[q] × I_n[a'][q]
/// ```
///
/// where `I_n[a'][q]` sums the neighbor's infected proportion over all tracks.
pub(crate) fn force_of_infection(
    rates: &RateConfiguration,
    age_group: usize,
    neighbors: &[Neighbor<'_>],
    corrections: &[f64],
) -> Result<f64, ModelError> {
    let mobility = &rates.mobility_rates[age_group];
    let virulence = &rates.virulence_rates[age_group];
    let mut force = 0.0;
    for (neighbor, correction) in neighbors.iter().zip(corrections) {
        let mut contact = 0.0;
        for (neighbor_age, state) in neighbor.state.age_groups.iter().enumerate() {
            for (phase, (m, v)) in mobility.iter().zip(virulence).enumerate() {
                let infected = state.infected_in_phase(phase).ok_or_else(|| {
                    ModelError::MissingData(format!(
                        "neighbor {} has no infected phase {phase} in age group {neighbor_age}",
                        neighbor.id
                    ))
                })?;
                contact += m * v * infected * state.weight;
            }
        }
        force += neighbor.vicinity.correlation * correction * contact;
    }
    Ok(force)
}

/// Unvaccinated susceptibles exposed this step; never more than are susceptible.
///
/// The cap is applied after rounding, since rounding to a coarse divider can land above `S`.
pub(crate) fn unvaccinated_exposure(
    susceptible: f64,
    force: f64,
    precision: Precision,
) -> f64 {
    precision.correct(susceptible * force).min(susceptible)
}

/// Week of vaccine protection that applies `day` days after the dose.
pub(crate) fn immunity_index(day: usize, weeks: usize) -> usize {
    (day / 7).min(weeks.saturating_sub(1))
}

/// Per-phase exposure of a vaccinated susceptible series, reduced by the protection of the
/// week the cohort is in.
pub(crate) fn vaccinated_exposure(
    susceptible: &PhaseSeries,
    force: f64,
    immunity: &[f64],
    precision: Precision,
) -> Vec<f64> {
    susceptible
        .iter()
        .enumerate()
        .map(|(day, &value)| {
            let protection = immunity
                .get(immunity_index(day, immunity.len()))
                .copied()
                .unwrap_or(0.0);
            precision.correct(value * force * (1.0 - protection))
        })
        .collect()
}
