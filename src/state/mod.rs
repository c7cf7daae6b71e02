//! Compartmental state of one cell.
//!
//! A [`CellState`] holds, per age group, three parallel [`PopulationTrack`]s (unvaccinated,
//! dose 1, dose 2) and the cumulative fatalities. All values are proportions of the age group's
//! population, so for every age group
//!
//! ```text
//! Σ_tracks (susceptible + exposed + infected + recovered) + fatalities = 1
//! ```
//!
//! The unvaccinated track's susceptible series has exactly one phase. The vaccinated tracks'
//! susceptible series are indexed by days since the dose was received.
//!
//! States are immutable between steps: the engine builds a fresh `CellState` every step.

mod series;
mod snapshot;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use series::PhaseSeries;
pub use snapshot::{CellSnapshot, SusceptibleByTrack, TrackSeries};

use crate::error::ModelError;
use crate::hashing::IndexMap;
use crate::hysteresis::HysteresisFactor;
use crate::numeric::{Precision, CONSERVATION_TOLERANCE, NEGATIVE_TOLERANCE};
use crate::rates::{PhaseRates, RateConfiguration};

pub type CellId = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Unvaccinated,
    Dose1,
    Dose2,
}

impl Track {
    pub const ALL: [Track; 3] = [Track::Unvaccinated, Track::Dose1, Track::Dose2];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Track::Unvaccinated => 0,
            Track::Dose1 => 1,
            Track::Dose2 => 2,
        }
    }

    #[must_use]
    pub fn is_vaccinated(self) -> bool {
        self != Track::Unvaccinated
    }
}

/// The compartments of one vaccination track within one age group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationTrack {
    pub susceptible: PhaseSeries,
    pub exposed: PhaseSeries,
    pub infected: PhaseSeries,
    pub recovered: PhaseSeries,
}

impl PopulationTrack {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.susceptible.total()
            + self.exposed.total()
            + self.infected.total()
            + self.recovered.total()
    }

    fn compartments_mut(&mut self) -> [(&'static str, &mut PhaseSeries); 4] {
        [
            ("susceptible", &mut self.susceptible),
            ("exposed", &mut self.exposed),
            ("infected", &mut self.infected),
            ("recovered", &mut self.recovered),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgeGroupState {
    /// Share of the cell's population in this age group.
    pub weight: f64,
    /// Indexed by [`Track::index`].
    pub tracks: [PopulationTrack; 3],
    pub fatalities: f64,
}

impl AgeGroupState {
    #[must_use]
    pub fn track(&self, track: Track) -> &PopulationTrack {
        &self.tracks[track.index()]
    }

    pub fn track_mut(&mut self, track: Track) -> &mut PopulationTrack {
        &mut self.tracks[track.index()]
    }

    /// The unvaccinated susceptible proportion.
    #[must_use]
    pub fn susceptible(&self) -> f64 {
        self.track(Track::Unvaccinated).susceptible.first()
    }

    /// Sum of every compartment and the fatalities; one for a conserved age group.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.tracks.iter().map(PopulationTrack::total).sum::<f64>() + self.fatalities
    }

    /// Infected proportion in `phase`, summed over tracks.
    #[must_use]
    pub fn infected_in_phase(&self, phase: usize) -> Option<f64> {
        self.tracks
            .iter()
            .map(|track| track.infected.as_slice().get(phase).copied())
            .sum()
    }

    #[must_use]
    pub fn vaccinated(&self) -> f64 {
        self.track(Track::Dose1).susceptible.total() + self.track(Track::Dose2).susceptible.total()
    }

    /// Sets compartments within `NEGATIVE_TOLERANCE` below zero to zero, and fails for anything
    /// further below zero or above one.
    pub(crate) fn sanitize(&mut self, step: u64, age_group: usize) -> Result<(), ModelError> {
        for track in Track::ALL {
            for (name, series) in self.track_mut(track).compartments_mut() {
                for value in series.values_mut() {
                    *value = checked_proportion(*value, step, age_group, track, name)?;
                }
            }
        }
        self.fatalities = checked_proportion(
            self.fatalities,
            step,
            age_group,
            Track::Unvaccinated,
            "fatalities",
        )?;
        Ok(())
    }

    /// Checks conservation and the vaccinated share.
    pub(crate) fn check_invariants(&self, step: u64, age_group: usize) -> Result<(), ModelError> {
        let total = self.total();
        if (total - 1.0).abs() > CONSERVATION_TOLERANCE {
            return Err(ModelError::invariant(step, age_group, "sum of compartments", total));
        }
        let vaccinated = self.vaccinated();
        if vaccinated > 1.0 + CONSERVATION_TOLERANCE {
            return Err(ModelError::invariant(
                step,
                age_group,
                "dose1 + dose2 susceptible",
                vaccinated,
            ));
        }
        Ok(())
    }
}

fn checked_proportion(
    value: f64,
    step: u64,
    age_group: usize,
    track: Track,
    compartment: &str,
) -> Result<f64, ModelError> {
    if value.is_nan() || value < -NEGATIVE_TOLERANCE || value > 1.0 + NEGATIVE_TOLERANCE {
        return Err(ModelError::invariant(
            step,
            age_group,
            &format!("{track:?} {compartment}"),
            value,
        ));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// The full state of one cell at one step.
///
/// Serialized through [`CellSnapshot`], which is the layout exchanged between cells and stored in
/// scenario files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CellSnapshot", into = "CellSnapshot")]
pub struct CellState {
    /// Number of people in the cell; only used for reporting.
    pub population: f64,
    pub age_groups: Vec<AgeGroupState>,
    /// Weekly protection tables overriding the scenario's when present.
    pub immunity_dose1: Option<PhaseRates>,
    pub immunity_dose2: Option<PhaseRates>,
    /// Fraction of the population that ignores mobility corrections.
    pub disobedient: f64,
    /// Infectious proportion above which the fatality modifier applies.
    pub hospital_capacity: f64,
    pub fatality_modifier: f64,
    pub min_interval_between_doses: usize,
    pub precision_divider: Option<Precision>,
    pub hysteresis_factors: IndexMap<CellId, HysteresisFactor>,
}

impl CellState {
    #[must_use]
    pub fn num_age_groups(&self) -> usize {
        self.age_groups.len()
    }

    #[must_use]
    pub fn num_infected_phases(&self) -> usize {
        self.age_groups
            .first()
            .map_or(0, |age| age.track(Track::Unvaccinated).infected.len())
    }

    /// The precision divider in effect for this cell.
    #[must_use]
    pub fn precision(&self, rates: &RateConfiguration) -> Precision {
        self.precision_divider.unwrap_or(rates.precision)
    }

    /// Weekly protection table for a vaccinated track.
    #[must_use]
    pub fn immunity<'a>(
        &'a self,
        rates: &'a RateConfiguration,
        track: Track,
        age_group: usize,
    ) -> &'a [f64] {
        let table = match track {
            Track::Unvaccinated => return &[],
            Track::Dose1 => self.immunity_dose1.as_ref().unwrap_or(&rates.immunity_rates_dose1),
            Track::Dose2 => self.immunity_dose2.as_ref().unwrap_or(&rates.immunity_rates_dose2),
        };
        table.get(age_group).map_or(&[], Vec::as_slice)
    }

    /// Makes sure a hysteresis entry exists for every neighbor.
    pub fn init_hysteresis<I, S>(&mut self, neighbors: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for neighbor in neighbors {
            let id = neighbor.as_ref();
            if !self.hysteresis_factors.contains_key(id) {
                self.hysteresis_factors
                    .insert(id.to_string(), HysteresisFactor::default());
            }
        }
    }

    fn weighted(&self, f: impl Fn(&AgeGroupState) -> f64) -> f64 {
        self.age_groups.iter().map(|age| age.weight * f(age)).sum()
    }

    fn weighted_tracks(&self, f: impl Fn(&PopulationTrack) -> f64) -> f64 {
        self.weighted(|age| age.tracks.iter().map(&f).sum())
    }

    /// Unvaccinated susceptible proportion of the cell.
    #[must_use]
    pub fn total_susceptible(&self) -> f64 {
        self.weighted(AgeGroupState::susceptible)
    }

    #[must_use]
    pub fn total_vaccinated(&self, track: Track) -> f64 {
        if !track.is_vaccinated() {
            return 0.0;
        }
        self.weighted(|age| age.track(track).susceptible.total())
    }

    #[must_use]
    pub fn total_exposed(&self) -> f64 {
        self.weighted_tracks(|track| track.exposed.total())
    }

    /// Infectious proportion of the cell over every age group and track.
    #[must_use]
    pub fn total_infections(&self) -> f64 {
        self.weighted_tracks(|track| track.infected.total())
    }

    #[must_use]
    pub fn total_recovered(&self) -> f64 {
        self.weighted_tracks(|track| track.recovered.total())
    }

    #[must_use]
    pub fn total_fatalities(&self) -> f64 {
        self.weighted(|age| age.fatalities)
    }

    #[must_use]
    pub fn new_exposed(&self) -> f64 {
        self.weighted_tracks(|track| track.exposed.first())
    }

    #[must_use]
    pub fn new_infections(&self) -> f64 {
        self.weighted_tracks(|track| track.infected.first())
    }

    #[must_use]
    pub fn new_recoveries(&self) -> f64 {
        self.weighted_tracks(|track| track.recovered.first())
    }

    /// Checks that this state can be stepped with `rates`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigInconsistency` if the number of age groups or phases does not
    /// fit the rate tables, the dose-2 uptake table does not cover every dose-1 phase after the
    /// minimum interval, or vaccinated pools are populated in a run without vaccination, and
    /// `ModelError::MissingData` if vaccination is enabled but no protection table is available.
    pub fn check_against(&self, rates: &RateConfiguration) -> Result<(), ModelError> {
        let inconsistent = |message: String| Err(ModelError::ConfigInconsistency(message));
        if self.num_age_groups() != rates.num_age_groups() {
            return inconsistent(format!(
                "state has {} age groups but the rates have {}",
                self.num_age_groups(),
                rates.num_age_groups()
            ));
        }
        if self.num_infected_phases() != rates.num_infected_phases() {
            return inconsistent(format!(
                "state has {} infected phases but the rates have {}",
                self.num_infected_phases(),
                rates.num_infected_phases()
            ));
        }
        let first = &self.age_groups[0];
        for track in Track::ALL {
            let exposed = first.track(track).exposed.len();
            let incubation = rates.incubation(track, 0).len();
            if exposed == 0 || (incubation != exposed && incubation + 1 != exposed) {
                return inconsistent(format!(
                    "{track:?} state has {exposed} exposed phases but {incubation} incubation rates"
                ));
            }
            let recovered = first.track(track).recovered.len();
            if recovered == 0 || (!rates.re_susceptibility && recovered < 2) {
                return inconsistent(format!(
                    "{track:?} state needs at least {} recovered phases, found {recovered}",
                    if rates.re_susceptibility { 1 } else { 2 }
                ));
            }
        }

        if !rates.vaccination {
            if self.age_groups.iter().any(|age| age.vaccinated() > 0.0) {
                return inconsistent(
                    "vaccinated susceptible pools are populated but vaccination is disabled"
                        .to_string(),
                );
            }
            return Ok(());
        }

        let dose1_phases = first.track(Track::Dose1).susceptible.len();
        let dose2_phases = first.track(Track::Dose2).susceptible.len();
        if dose1_phases == 0 || dose2_phases == 0 {
            return inconsistent("vaccinated susceptible series must not be empty".to_string());
        }
        if self.min_interval_between_doses >= dose1_phases {
            return inconsistent(format!(
                "min_interval_between_doses {} must be below the {dose1_phases} dose-1 phases",
                self.min_interval_between_doses
            ));
        }
        let early_phases = dose1_phases - self.min_interval_between_doses - 1;
        for age_group in 0..self.num_age_groups() {
            let early_rates = rates
                .vaccination_rates_dose2
                .get(age_group)
                .map_or(0, Vec::len);
            if early_rates < early_phases {
                return inconsistent(format!(
                    "vaccination_rates_dose2 has {early_rates} rates for age group {age_group} \
                     but {early_phases} dose-1 phases can take an early second dose"
                ));
            }
        }
        for track in [Track::Dose1, Track::Dose2] {
            for age_group in 0..self.num_age_groups() {
                if self.immunity(rates, track, age_group).is_empty() {
                    return Err(ModelError::MissingData(format!(
                        "no {track:?} immunity rates for age group {age_group}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for CellState {
    /// `<population,S,E,VD1,VD2,I,R,new E,new I,new R,D>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{},{},{},{},{},{},{},{},{},{},{}>",
            self.population,
            self.total_susceptible(),
            self.total_exposed(),
            self.total_vaccinated(Track::Dose1),
            self.total_vaccinated(Track::Dose2),
            self.total_infections(),
            self.total_recovered(),
            self.new_exposed(),
            self.new_infections(),
            self.new_recoveries(),
            self.total_fatalities()
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::rates::tests::simple_rates;

    /// One age group matching `simple_rates`: 99% susceptible, 1% on the first day of infection.
    pub(crate) fn simple_state() -> CellState {
        serde_json::from_str(
            r#"{
                "population": 1000,
                "age_group_weights": [1.0],
                "susceptible": {"unvaccinated": [0.99]},
                "exposed": {"unvaccinated": [[0.0, 0.0]]},
                "infected": {"unvaccinated": [[0.01, 0.0]]},
                "recovered": {"unvaccinated": [[0.0, 0.0, 0.0]]},
                "fatalities": [0.0],
                "hospital_capacity": 0.5,
                "fatality_modifier": 1.0
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn totals_are_weighted() {
        let mut state = simple_state();
        assert_almost_eq!(state.total_infections(), 0.01, 1e-12);
        assert_almost_eq!(state.total_susceptible(), 0.99, 1e-12);

        let mut second = state.age_groups[0].clone();
        second.weight = 0.5;
        second.track_mut(Track::Unvaccinated).infected = PhaseSeries::new(vec![0.03, 0.0]);
        second.track_mut(Track::Unvaccinated).susceptible = PhaseSeries::new(vec![0.97]);
        state.age_groups[0].weight = 0.5;
        state.age_groups.push(second);
        assert_almost_eq!(state.total_infections(), 0.02, 1e-12);
        assert_almost_eq!(state.new_infections(), 0.02, 1e-12);
    }

    #[test]
    fn display_matches_output_tuple() {
        let text = simple_state().to_string();
        assert_eq!(text, "<1000,0.99,0,0,0,0.01,0,0,0.01,0,0>");
    }

    #[test]
    fn infected_in_phase_sums_tracks() {
        let mut age = simple_state().age_groups[0].clone();
        age.track_mut(Track::Dose2).infected = PhaseSeries::new(vec![0.02, 0.0]);
        assert_almost_eq!(age.infected_in_phase(0).unwrap(), 0.03, 1e-12);
        assert!(age.infected_in_phase(5).is_none());
    }

    #[test]
    fn sanitize_clamps_rounding_noise_and_rejects_defects() {
        let mut age = simple_state().age_groups[0].clone();
        age.track_mut(Track::Unvaccinated).exposed[1] = -0.0005;
        age.sanitize(3, 0).unwrap();
        assert_eq!(age.track(Track::Unvaccinated).exposed[1], 0.0);

        age.track_mut(Track::Unvaccinated).infected[1] = -0.01;
        let err = age.sanitize(3, 0).unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation { step: 3, age_group: 0, .. }));
    }

    #[test]
    fn invariants_detect_leaks() {
        let mut age = simple_state().age_groups[0].clone();
        assert!(age.check_invariants(0, 0).is_ok());
        age.fatalities = 0.1;
        assert!(matches!(
            age.check_invariants(0, 0),
            Err(ModelError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn state_fits_simple_rates() {
        assert!(simple_state().check_against(&simple_rates()).is_ok());
    }

    #[test]
    fn state_with_too_few_recovered_phases_is_rejected() {
        let mut state = simple_state();
        state.age_groups[0].track_mut(Track::Unvaccinated).recovered = PhaseSeries::zeros(1);
        assert!(state.check_against(&simple_rates()).is_err());
        let mut rates = simple_rates();
        rates.re_susceptibility = true;
        assert!(state.check_against(&rates).is_ok());
    }

    #[test]
    fn vaccination_requires_immunity_tables() {
        let mut rates = simple_rates();
        rates.vaccination = true;
        rates.vaccination_rates_dose1 = vec![vec![0.01]];
        rates.vaccination_rates_dose2 = vec![vec![0.1, 0.1]];
        let mut state = simple_state();
        for track in [Track::Dose1, Track::Dose2] {
            state.age_groups[0].track_mut(track).susceptible = PhaseSeries::zeros(3);
        }
        assert!(matches!(state.check_against(&rates), Err(ModelError::MissingData(_))));
        rates.immunity_rates_dose1 = vec![vec![0.6]];
        rates.immunity_rates_dose2 = vec![vec![0.9]];
        assert!(state.check_against(&rates).is_ok());
        state.min_interval_between_doses = 3;
        assert!(state.check_against(&rates).is_err());
    }

    #[test]
    fn short_dose2_table_is_rejected() {
        let mut rates = simple_rates();
        rates.vaccination = true;
        rates.vaccination_rates_dose1 = vec![vec![0.01]];
        rates.vaccination_rates_dose2 = vec![vec![0.3, 0.2]];
        rates.immunity_rates_dose1 = vec![vec![0.6]];
        rates.immunity_rates_dose2 = vec![vec![0.9]];
        let mut state = simple_state();
        state.min_interval_between_doses = 1;
        state.age_groups[0].track_mut(Track::Dose1).susceptible = PhaseSeries::zeros(10);
        state.age_groups[0].track_mut(Track::Dose2).susceptible = PhaseSeries::zeros(3);
        let err = state.check_against(&rates).unwrap_err();
        assert!(matches!(err, ModelError::ConfigInconsistency(ref message)
            if message.contains("vaccination_rates_dose2")));

        // Phases 1 to 8 take an early second dose; phase 9 is promoted unconditionally.
        rates.vaccination_rates_dose2 = vec![vec![0.3, 0.2, 0.2, 0.2, 0.1, 0.1, 0.1, 0.1]];
        assert!(state.check_against(&rates).is_ok());
    }

    #[test]
    fn hysteresis_entries_are_added_lazily() {
        let mut state = simple_state();
        let neighbors = vec!["a".to_string(), "b".to_string()];
        state.init_hysteresis(&neighbors);
        state.hysteresis_factors.get_mut("a").unwrap().in_effect = true;
        state.init_hysteresis(&neighbors);
        assert_eq!(state.hysteresis_factors.len(), 2);
        assert!(state.hysteresis_factors["a"].in_effect);
    }
}
