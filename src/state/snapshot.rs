use serde::{Deserialize, Serialize};

use super::{AgeGroupState, CellId, CellState, PhaseSeries, PopulationTrack, Track};
use crate::error::ModelError;
use crate::hashing::IndexMap;
use crate::hysteresis::HysteresisFactor;
use crate::numeric::{Precision, CONSERVATION_TOLERANCE};
use crate::rates::PhaseRates;

/// Phase series of one compartment for every track, indexed `[age_group][phase]`.
///
/// The vaccinated tracks may be omitted, in which case they start empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSeries {
    pub unvaccinated: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose1: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose2: Vec<Vec<f64>>,
}

impl TrackSeries {
    fn get(&self, track: Track) -> &Vec<Vec<f64>> {
        match track {
            Track::Unvaccinated => &self.unvaccinated,
            Track::Dose1 => &self.dose1,
            Track::Dose2 => &self.dose2,
        }
    }
}

/// Unvaccinated susceptibles are a single proportion per age group; the vaccinated pools are
/// series indexed by days since the dose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SusceptibleByTrack {
    pub unvaccinated: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose1: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose2: Vec<Vec<f64>>,
}

fn one() -> f64 {
    1.0
}

/// The layout a [`CellState`] is exchanged and stored in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    #[serde(default)]
    pub population: f64,
    #[serde(alias = "age_group_proportions")]
    pub age_group_weights: Vec<f64>,
    pub susceptible: SusceptibleByTrack,
    pub exposed: TrackSeries,
    pub infected: TrackSeries,
    pub recovered: TrackSeries,
    pub fatalities: Vec<f64>,
    #[serde(default)]
    pub hysteresis_factors: IndexMap<CellId, HysteresisFactor>,
    #[serde(default)]
    pub disobedient: f64,
    #[serde(default = "one")]
    pub hospital_capacity: f64,
    #[serde(default = "one")]
    pub fatality_modifier: f64,
    #[serde(default, alias = "immunityD1", skip_serializing_if = "Option::is_none")]
    pub immunity_dose1: Option<PhaseRates>,
    #[serde(default, alias = "immunityD2", skip_serializing_if = "Option::is_none")]
    pub immunity_dose2: Option<PhaseRates>,
    #[serde(default)]
    pub min_interval_between_doses: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision_divider: Option<Precision>,
}

fn inconsistent(message: String) -> ModelError {
    ModelError::ConfigInconsistency(message)
}

/// Checks that `table` has one entry per age group and the same number of phases in each.
/// An empty table is accepted when `optional` is set and expands to empty rows.
fn phase_rows(
    name: &str,
    table: &[Vec<f64>],
    age_groups: usize,
    optional: Option<usize>,
) -> Result<Vec<PhaseSeries>, ModelError> {
    if table.is_empty() {
        if let Some(phases) = optional {
            return Ok(vec![PhaseSeries::zeros(phases); age_groups]);
        }
    }
    if table.len() != age_groups {
        return Err(inconsistent(format!(
            "{name} has {} age groups but age_group_weights has {age_groups}",
            table.len()
        )));
    }
    let phases = table[0].len();
    if let Some(phases_expected) = optional {
        if phases != phases_expected {
            return Err(inconsistent(format!(
                "{name} has {phases} phases but the unvaccinated series has {phases_expected}"
            )));
        }
    }
    if table.iter().any(|row| row.len() != phases) {
        return Err(inconsistent(format!(
            "{name} has a different number of phases per age group"
        )));
    }
    Ok(table.iter().cloned().map(PhaseSeries::new).collect())
}

fn compartment(
    name: &str,
    series: &TrackSeries,
    age_groups: usize,
) -> Result<[Vec<PhaseSeries>; 3], ModelError> {
    let unvaccinated = phase_rows(
        &format!("{name}.unvaccinated"),
        &series.unvaccinated,
        age_groups,
        None,
    )?;
    let phases = Some(unvaccinated.first().map_or(0, PhaseSeries::len));
    let vaccinated = |track: Track, label: &str| {
        phase_rows(&format!("{name}.{label}"), series.get(track), age_groups, phases)
    };
    let dose1 = vaccinated(Track::Dose1, "dose1")?;
    let dose2 = vaccinated(Track::Dose2, "dose2")?;
    Ok([unvaccinated, dose1, dose2])
}

/// Vaccinated susceptible series may have any length, including none.
fn vaccinated_rows(
    name: &str,
    table: &[Vec<f64>],
    age_groups: usize,
) -> Result<Vec<PhaseSeries>, ModelError> {
    if table.is_empty() {
        return Ok(vec![PhaseSeries::default(); age_groups]);
    }
    phase_rows(name, table, age_groups, None)
}

impl TryFrom<CellSnapshot> for CellState {
    type Error = ModelError;

    fn try_from(snapshot: CellSnapshot) -> Result<Self, Self::Error> {
        let age_groups = snapshot.age_group_weights.len();
        if age_groups == 0 {
            return Err(inconsistent("state has no age groups".to_string()));
        }
        let weight_total: f64 = snapshot.age_group_weights.iter().sum();
        if (weight_total - 1.0).abs() > CONSERVATION_TOLERANCE {
            return Err(inconsistent(format!(
                "age_group_weights sum to {weight_total} instead of 1"
            )));
        }
        for (name, len) in [
            ("susceptible.unvaccinated", snapshot.susceptible.unvaccinated.len()),
            ("fatalities", snapshot.fatalities.len()),
        ] {
            if len != age_groups {
                return Err(inconsistent(format!(
                    "{name} has {len} age groups but age_group_weights has {age_groups}"
                )));
            }
        }

        let susceptible = [
            snapshot
                .susceptible
                .unvaccinated
                .iter()
                .map(|&s| PhaseSeries::new(vec![s]))
                .collect(),
            vaccinated_rows("susceptible.dose1", &snapshot.susceptible.dose1, age_groups)?,
            vaccinated_rows("susceptible.dose2", &snapshot.susceptible.dose2, age_groups)?,
        ];
        let exposed = compartment("exposed", &snapshot.exposed, age_groups)?;
        let infected = compartment("infected", &snapshot.infected, age_groups)?;
        let recovered = compartment("recovered", &snapshot.recovered, age_groups)?;

        let mut states = Vec::with_capacity(age_groups);
        for age_group in 0..age_groups {
            let track = |index: usize| PopulationTrack {
                susceptible: susceptible[index][age_group].clone(),
                exposed: exposed[index][age_group].clone(),
                infected: infected[index][age_group].clone(),
                recovered: recovered[index][age_group].clone(),
            };
            let state = AgeGroupState {
                weight: snapshot.age_group_weights[age_group],
                tracks: [track(0), track(1), track(2)],
                fatalities: snapshot.fatalities[age_group],
            };
            let total = state.total();
            if (total - 1.0).abs() > CONSERVATION_TOLERANCE {
                return Err(inconsistent(format!(
                    "compartments of age group {age_group} sum to {total} instead of 1"
                )));
            }
            if state.vaccinated() > 1.0 {
                return Err(inconsistent(format!(
                    "dose 1 and dose 2 susceptibles of age group {age_group} exceed 1"
                )));
            }
            states.push(state);
        }

        Ok(CellState {
            population: snapshot.population,
            age_groups: states,
            immunity_dose1: snapshot.immunity_dose1,
            immunity_dose2: snapshot.immunity_dose2,
            disobedient: snapshot.disobedient,
            hospital_capacity: snapshot.hospital_capacity,
            fatality_modifier: snapshot.fatality_modifier,
            min_interval_between_doses: snapshot.min_interval_between_doses,
            precision_divider: snapshot.precision_divider,
            hysteresis_factors: snapshot.hysteresis_factors,
        })
    }
}

fn collect(state: &CellState, f: impl Fn(&AgeGroupState) -> &PhaseSeries) -> Vec<Vec<f64>> {
    state.age_groups.iter().map(|age| f(age).as_slice().to_vec()).collect()
}

fn collect_tracks(
    state: &CellState,
    f: impl Fn(&PopulationTrack) -> &PhaseSeries,
) -> TrackSeries {
    TrackSeries {
        unvaccinated: collect(state, |age| f(age.track(Track::Unvaccinated))),
        dose1: collect(state, |age| f(age.track(Track::Dose1))),
        dose2: collect(state, |age| f(age.track(Track::Dose2))),
    }
}

impl From<CellState> for CellSnapshot {
    fn from(state: CellState) -> Self {
        let susceptible = SusceptibleByTrack {
            unvaccinated: state.age_groups.iter().map(AgeGroupState::susceptible).collect(),
            dose1: collect(&state, |age| &age.track(Track::Dose1).susceptible),
            dose2: collect(&state, |age| &age.track(Track::Dose2).susceptible),
        };
        CellSnapshot {
            population: state.population,
            age_group_weights: state.age_groups.iter().map(|age| age.weight).collect(),
            susceptible,
            exposed: collect_tracks(&state, |track| &track.exposed),
            infected: collect_tracks(&state, |track| &track.infected),
            recovered: collect_tracks(&state, |track| &track.recovered),
            fatalities: state.age_groups.iter().map(|age| age.fatalities).collect(),
            hysteresis_factors: state.hysteresis_factors,
            disobedient: state.disobedient,
            hospital_capacity: state.hospital_capacity,
            fatality_modifier: state.fatality_modifier,
            immunity_dose1: state.immunity_dose1,
            immunity_dose2: state.immunity_dose2,
            min_interval_between_doses: state.min_interval_between_doses,
            precision_divider: state.precision_divider,
        }
    }
}
