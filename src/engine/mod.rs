//! The per-cell transition engine.
//!
//! [`TransitionEngine::next_state`] computes a cell's state for the next step from its current
//! state and the previous-step states of its neighbors. It is deterministic, performs no I/O and
//! mutates nothing but the hysteresis entries of the state it returns.
//!
//! Every age group goes through the same ordered pipeline:
//!
//! 1. exposure of every susceptible pool to the neighborhood's force of infection,
//! 2. fatalities per infected phase,
//! 3. recoveries per infected phase, bounded by what the fatalities left,
//! 4. advancement of the exposed, infected and recovered series of every track,
//! 5. dose uptake and advancement of the vaccinated susceptible series,
//! 6. the susceptible closure and the invariant checks.
//!
//! All three population tracks go through steps 1 to 4 with the same code.

mod closure;
mod exposure;
mod progression;
mod vaccination;

pub use vaccination::{NoRecoveredUptake, RecoveredUptake};

use crate::error::ModelError;
use crate::log::trace;
use crate::numeric::Precision;
use crate::rates::RateConfiguration;
use crate::state::{AgeGroupState, CellState, PhaseSeries, Track};
use crate::vicinity::Vicinity;

/// A neighbor's previous-step state and its relationship to the cell being stepped.
///
/// The cell itself must be one of its own neighbors.
#[derive(Copy, Clone, Debug)]
pub struct Neighbor<'a> {
    pub id: &'a str,
    pub state: &'a CellState,
    pub vicinity: &'a Vicinity,
}

impl<'a> Neighbor<'a> {
    #[must_use]
    pub fn new(id: &'a str, state: &'a CellState, vicinity: &'a Vicinity) -> Neighbor<'a> {
        Neighbor {
            id,
            state,
            vicinity,
        }
    }
}

/// Fatalities and recoveries of one track, per infected phase.
struct Outflows {
    fatalities: Vec<f64>,
    recoveries: Vec<f64>,
}

/// Values shared by every age group of one cell step.
struct StepInputs {
    step: u64,
    precision: Precision,
    fatality_modifier: f64,
}

#[derive(Clone, Copy)]
pub struct TransitionEngine<'a> {
    rates: &'a RateConfiguration,
    recovered_uptake: &'a dyn RecoveredUptake,
}

impl<'a> TransitionEngine<'a> {
    #[must_use]
    pub fn new(rates: &'a RateConfiguration) -> TransitionEngine<'a> {
        TransitionEngine {
            rates,
            recovered_uptake: &NoRecoveredUptake,
        }
    }

    /// Vaccinates unvaccinated recovered people through `uptake` in vaccination runs.
    #[must_use]
    pub fn with_recovered_uptake(
        mut self,
        uptake: &'a dyn RecoveredUptake,
    ) -> TransitionEngine<'a> {
        self.recovered_uptake = uptake;
        self
    }

    #[must_use]
    pub fn rates(&self) -> &'a RateConfiguration {
        self.rates
    }

    /// Computes the state of `cell_id` for the step after `step`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MissingData` if the cell is not among its own `neighbors` or a
    /// neighbor state lacks an infected phase, `ModelError::ConfigInconsistency` if the state
    /// does not have one age group per rate table row, and `ModelError::InvariantViolation` if a
    /// compartment leaves its valid range.
    pub fn next_state(
        &self,
        cell_id: &str,
        current: &CellState,
        neighbors: &[Neighbor<'_>],
        step: u64,
    ) -> Result<CellState, ModelError> {
        if current.num_age_groups() != self.rates.num_age_groups() {
            return Err(ModelError::ConfigInconsistency(format!(
                "cell {cell_id} has {} age groups but the rates have {}",
                current.num_age_groups(),
                self.rates.num_age_groups()
            )));
        }

        let mut next = current.clone();
        let corrections = exposure::mobility_corrections(
            cell_id,
            current,
            &mut next.hysteresis_factors,
            neighbors,
        )?;

        let inputs = StepInputs {
            step,
            precision: current.precision(self.rates),
            fatality_modifier: if current.total_infections() > current.hospital_capacity {
                current.fatality_modifier
            } else {
                1.0
            },
        };
        next.age_groups = current
            .age_groups
            .iter()
            .enumerate()
            .map(|(age_group, age)| {
                let force =
                    exposure::force_of_infection(self.rates, age_group, neighbors, &corrections)?;
                self.step_age_group(current, age_group, age, force, &inputs)
            })
            .collect::<Result<Vec<_>, _>>()?;

        trace!("cell {cell_id} step {step}: {next}");
        Ok(next)
    }

    fn step_age_group(
        &self,
        cell: &CellState,
        age_group: usize,
        prev: &AgeGroupState,
        force: f64,
        inputs: &StepInputs,
    ) -> Result<AgeGroupState, ModelError> {
        let rates = self.rates;
        let precision = inputs.precision;

        let exposure = self.exposure(cell, age_group, prev, force, precision);
        let outflows = Track::ALL.map(|track| {
            let infected = &prev.track(track).infected;
            let fatalities = progression::fatalities(
                infected,
                rates,
                age_group,
                inputs.fatality_modifier,
                precision,
            );
            let recoveries =
                progression::recoveries(infected, &fatalities, rates, age_group, precision);
            Outflows {
                fatalities,
                recoveries,
            }
        });

        let mut recovered_before = Track::ALL.map(|track| prev.track(track).recovered.clone());
        let recovered_uptake = if rates.vaccination {
            let uptake = self.recovered_uptake.uptake(
                rates,
                age_group,
                &prev.track(Track::Unvaccinated).recovered,
            );
            vaccination::take_recovered_uptake(&mut recovered_before[0], &uptake, precision)
        } else {
            0.0
        };

        let mut next = prev.clone();
        let mut released = [0.0; 3];
        for track in Track::ALL {
            let index = track.index();
            let before = prev.track(track);
            let flows = &outflows[index];
            let incubation = rates.incubation(track, age_group);
            let newly_exposed: f64 = exposure[index].iter().sum();
            let newly_infected =
                progression::infection_inflow(&before.exposed, incubation, precision);
            let newly_recovered: f64 = flows.recoveries.iter().sum();

            let (recovered, leaving) = progression::advance_recovered(
                &recovered_before[index],
                newly_recovered,
                rates.re_susceptibility,
            );
            let after = next.track_mut(track);
            after.exposed =
                progression::advance_exposed(&before.exposed, newly_exposed, incubation, precision);
            after.infected = progression::advance_infected(
                &before.infected,
                newly_infected,
                &flows.fatalities,
                &flows.recoveries,
                precision,
            );
            after.recovered = recovered;
            released[index] = leaving;
            next.fatalities += flows.fatalities.iter().sum::<f64>();
        }

        if rates.vaccination {
            let dose1_inflow = vaccination::dose1_inflow(
                prev.susceptible(),
                exposure[0].iter().sum(),
                rates.dose1_uptake(age_group),
                precision,
            ) + recovered_uptake;
            let early_rates = rates
                .vaccination_rates_dose2
                .get(age_group)
                .map_or(&[][..], Vec::as_slice);
            let (dose1, dose2) = vaccination::advance_doses(
                &prev.track(Track::Dose1).susceptible,
                &prev.track(Track::Dose2).susceptible,
                &exposure[Track::Dose1.index()],
                &exposure[Track::Dose2.index()],
                dose1_inflow,
                early_rates,
                cell.min_interval_between_doses,
                precision,
            )?;
            next.track_mut(Track::Dose1).susceptible = dose1;
            next.track_mut(Track::Dose2).susceptible = dose2;
            // Vaccinated people who lose their immunity return to the waned end of their dose.
            for track in [Track::Dose1, Track::Dose2] {
                let susceptible = &mut next.track_mut(track).susceptible;
                if let Some(last) = susceptible.len().checked_sub(1) {
                    susceptible[last] += released[track.index()];
                }
            }
        }

        closure::close(next, inputs.step, age_group)
    }

    /// Per-track exposure of the susceptible pools. The unvaccinated entry has a single element;
    /// the vaccinated entries have one per day since the dose and are empty without vaccination.
    fn exposure(
        &self,
        cell: &CellState,
        age_group: usize,
        prev: &AgeGroupState,
        force: f64,
        precision: Precision,
    ) -> [Vec<f64>; 3] {
        let unvaccinated = vec![exposure::unvaccinated_exposure(
            prev.susceptible(),
            force,
            precision,
        )];
        if !self.rates.vaccination {
            return [unvaccinated, Vec::new(), Vec::new()];
        }
        let vaccinated = |track: Track| {
            let susceptible: &PhaseSeries = &prev.track(track).susceptible;
            exposure::vaccinated_exposure(
                susceptible,
                force,
                cell.immunity(self.rates, track, age_group),
                precision,
            )
        };
        [unvaccinated, vaccinated(Track::Dose1), vaccinated(Track::Dose2)]
    }
}

/// Computes a cell's next state with the default engine.
///
/// # Errors
///
/// See [`TransitionEngine::next_state`].
pub fn compute_next_state(
    cell_id: &str,
    current: &CellState,
    neighbors: &[Neighbor<'_>],
    rates: &RateConfiguration,
    step: u64,
) -> Result<CellState, ModelError> {
    TransitionEngine::new(rates).next_state(cell_id, current, neighbors, step)
}
