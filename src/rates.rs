//! Immutable per-age-group, per-phase rate tables shared by every cell of a scenario.
//!
//! Every table is indexed `[age_group][phase]`. `virulence_rates` and `mobility_rates` have one
//! entry per infected phase. `recovery_rates` and `fatality_rates` may omit the terminal phase:
//! everyone still infected there recovers, and a missing terminal fatality rate reads as zero.
//! Likewise the terminal entry of `incubation_rates` is optional: the last exposed phase always
//! incubates.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::log::error;
use crate::numeric::Precision;
use crate::state::Track;

pub type PhaseRates = Vec<Vec<f64>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateConfiguration {
    /// Default precision divider for cells whose snapshot does not carry one.
    #[serde(default)]
    pub precision: Precision,
    pub virulence_rates: PhaseRates,
    pub incubation_rates: PhaseRates,
    #[serde(default)]
    pub incubation_rates_dose1: Option<PhaseRates>,
    #[serde(default)]
    pub incubation_rates_dose2: Option<PhaseRates>,
    pub recovery_rates: PhaseRates,
    pub mobility_rates: PhaseRates,
    pub fatality_rates: PhaseRates,
    /// Dose-1 uptake; only the first entry of each age group is used.
    #[serde(default)]
    pub vaccination_rates_dose1: PhaseRates,
    /// Early dose-2 uptake, indexed by `dose1_phase - min_interval_between_doses`.
    #[serde(default)]
    pub vaccination_rates_dose2: PhaseRates,
    /// Weekly vaccine protection for dose-1 susceptibles.
    #[serde(default)]
    pub immunity_rates_dose1: PhaseRates,
    /// Weekly vaccine protection for dose-2 susceptibles.
    #[serde(default)]
    pub immunity_rates_dose2: PhaseRates,
    /// When set, the terminal recovered phase returns to susceptible instead of accumulating.
    #[serde(default, alias = "SIIRS_model")]
    pub re_susceptibility: bool,
    #[serde(default, alias = "Vaccinations")]
    pub vaccination: bool,
}

impl RateConfiguration {
    #[must_use]
    pub fn num_age_groups(&self) -> usize {
        self.virulence_rates.len()
    }

    #[must_use]
    pub fn num_infected_phases(&self) -> usize {
        self.virulence_rates.first().map_or(0, Vec::len)
    }

    /// Incubation rates for a track; vaccinated tracks fall back to the unvaccinated table.
    #[must_use]
    pub fn incubation(&self, track: Track, age_group: usize) -> &[f64] {
        let table = match track {
            Track::Unvaccinated => &self.incubation_rates,
            Track::Dose1 => self
                .incubation_rates_dose1
                .as_ref()
                .unwrap_or(&self.incubation_rates),
            Track::Dose2 => self
                .incubation_rates_dose2
                .as_ref()
                .unwrap_or(&self.incubation_rates),
        };
        &table[age_group]
    }

    #[must_use]
    pub fn recovery(&self, age_group: usize, phase: usize) -> f64 {
        phase_rate(&self.recovery_rates, age_group, phase)
    }

    /// Fatality rate of an infected phase; a missing terminal entry reads as zero.
    #[must_use]
    pub fn fatality(&self, age_group: usize, phase: usize) -> f64 {
        phase_rate(&self.fatality_rates, age_group, phase)
    }

    #[must_use]
    pub fn dose1_uptake(&self, age_group: usize) -> f64 {
        self.vaccination_rates_dose1
            .get(age_group)
            .and_then(|rates| rates.first())
            .copied()
            .unwrap_or(0.0)
    }

    /// Checks the tables against each other. Called once when a scenario is loaded.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigInconsistency` when age group counts or phase counts differ
    /// between tables, a rate is negative or not finite, `recovery + fatality > 1` for a phase,
    /// or the terminal fatality rate exceeds one.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.check().inspect_err(|e| error!("{e}"))
    }

    fn check(&self) -> Result<(), ModelError> {
        let age_groups = self.num_age_groups();
        if age_groups == 0 {
            return Err(inconsistent("no age groups in virulence_rates"));
        }
        let infected_phases = self.num_infected_phases();
        if infected_phases == 0 {
            return Err(inconsistent("virulence_rates has no infected phases"));
        }

        let mut tables: Vec<(&str, &PhaseRates)> = vec![
            ("virulence_rates", &self.virulence_rates),
            ("incubation_rates", &self.incubation_rates),
            ("recovery_rates", &self.recovery_rates),
            ("mobility_rates", &self.mobility_rates),
            ("fatality_rates", &self.fatality_rates),
        ];
        if let Some(table) = &self.incubation_rates_dose1 {
            tables.push(("incubation_rates_dose1", table));
        }
        if let Some(table) = &self.incubation_rates_dose2 {
            tables.push(("incubation_rates_dose2", table));
        }
        if self.vaccination {
            tables.push(("vaccination_rates_dose1", &self.vaccination_rates_dose1));
            tables.push(("vaccination_rates_dose2", &self.vaccination_rates_dose2));
        }
        for (name, table) in &tables {
            check_table(name, table, age_groups)?;
        }
        // Per-cell overrides may stand in for these, so they are only checked when present.
        for (name, table) in [
            ("immunity_rates_dose1", &self.immunity_rates_dose1),
            ("immunity_rates_dose2", &self.immunity_rates_dose2),
        ] {
            if !table.is_empty() {
                check_table(name, table, age_groups)?;
            }
        }

        if self.mobility_rates[0].len() != infected_phases {
            return Err(inconsistent(&format!(
                "mobility_rates has {} phases but virulence_rates has {infected_phases}",
                self.mobility_rates[0].len()
            )));
        }
        for (name, table) in [
            ("recovery_rates", &self.recovery_rates),
            ("fatality_rates", &self.fatality_rates),
        ] {
            let phases = table[0].len();
            if phases + 1 != infected_phases && phases != infected_phases {
                return Err(inconsistent(&format!(
                    "{name} has {phases} phases; expected {} or {infected_phases}",
                    infected_phases - 1
                )));
            }
        }

        for age_group in 0..age_groups {
            let recovery = &self.recovery_rates[age_group];
            let fatality = &self.fatality_rates[age_group];
            for (phase, rate) in recovery.iter().enumerate() {
                if rate + fatality.get(phase).copied().unwrap_or(0.0) > 1.0 {
                    return Err(inconsistent(&format!(
                        "recovery rate + fatality rate exceeds 1 for age group {age_group}, \
                         phase {phase}"
                    )));
                }
            }
            let terminal_fatality = fatality.len() == infected_phases
                && fatality.last().is_some_and(|&rate| rate > 1.0);
            if terminal_fatality {
                return Err(inconsistent(&format!(
                    "terminal fatality rate exceeds 1 for age group {age_group}"
                )));
            }
            for track in [Track::Unvaccinated, Track::Dose1, Track::Dose2] {
                if self.incubation(track, age_group).iter().any(|&r| r > 1.0) {
                    return Err(inconsistent(&format!(
                        "incubation rate exceeds 1 for age group {age_group} ({track:?})"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn phase_rate(table: &PhaseRates, age_group: usize, phase: usize) -> f64 {
    table
        .get(age_group)
        .and_then(|rates| rates.get(phase))
        .copied()
        .unwrap_or(0.0)
}

fn inconsistent(message: &str) -> ModelError {
    ModelError::ConfigInconsistency(message.to_string())
}

/// Every age group present, every rate finite and non-negative, and the same number of phases in
/// every age group.
fn check_table(name: &str, table: &PhaseRates, age_groups: usize) -> Result<(), ModelError> {
    if table.len() != age_groups {
        return Err(inconsistent(&format!(
            "{name} has {} age groups but virulence_rates has {age_groups}",
            table.len()
        )));
    }
    let phases = table[0].len();
    for (age_group, rates) in table.iter().enumerate() {
        if rates.len() != phases {
            return Err(inconsistent(&format!(
                "{name} has {} phases for age group {age_group} but {phases} for age group 0",
                rates.len()
            )));
        }
        if let Some(rate) = rates.iter().find(|r| !r.is_finite() || **r < 0.0) {
            return Err(inconsistent(&format!(
                "{name} contains invalid rate {rate} for age group {age_group}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One age group, two exposed, two infected and three recovered phases, no vaccination.
    pub(crate) fn simple_rates() -> RateConfiguration {
        RateConfiguration {
            precision: Precision::new(100_000_000),
            virulence_rates: vec![vec![0.3, 0.2]],
            incubation_rates: vec![vec![0.5, 1.0]],
            recovery_rates: vec![vec![0.1]],
            mobility_rates: vec![vec![1.0, 1.0]],
            fatality_rates: vec![vec![0.01, 0.02]],
            ..RateConfiguration::default()
        }
    }

    #[test]
    fn simple_rates_are_valid() {
        assert!(simple_rates().validate().is_ok());
    }

    #[test]
    fn mismatched_age_groups_are_rejected() {
        let mut rates = simple_rates();
        rates.mobility_rates.push(vec![1.0, 1.0]);
        let err = rates.validate().unwrap_err();
        assert!(matches!(err, ModelError::ConfigInconsistency(m) if m.contains("mobility_rates")));
    }

    #[test]
    fn recovery_plus_fatality_over_one_is_rejected() {
        let mut rates = simple_rates();
        rates.recovery_rates = vec![vec![0.995]];
        assert!(matches!(
            rates.validate(),
            Err(ModelError::ConfigInconsistency(_))
        ));
    }

    #[test]
    fn terminal_fatality_over_one_is_rejected() {
        let mut rates = simple_rates();
        rates.fatality_rates = vec![vec![0.01, 1.5]];
        let err = rates.validate().unwrap_err();
        assert!(matches!(err, ModelError::ConfigInconsistency(m) if m.contains("terminal")));
    }

    #[test]
    fn phase_count_mismatch_is_rejected() {
        let mut rates = simple_rates();
        rates.fatality_rates = vec![vec![0.01, 0.02, 0.03]];
        assert!(rates.validate().is_err());

        let mut rates = simple_rates();
        rates.recovery_rates = vec![vec![]];
        rates.virulence_rates = vec![vec![0.3, 0.2, 0.1]];
        rates.mobility_rates = vec![vec![1.0, 1.0, 1.0]];
        rates.fatality_rates = vec![vec![0.0, 0.0, 0.0]];
        assert!(rates.validate().is_err());
    }

    #[test]
    fn terminal_fatality_may_be_omitted() {
        let mut rates = simple_rates();
        rates.fatality_rates = vec![vec![0.01]];
        assert!(rates.validate().is_ok());
        assert_eq!(rates.fatality(0, 0), 0.01);
        assert_eq!(rates.fatality(0, 1), 0.0);
        assert_eq!(rates.recovery(0, 1), 0.0);
    }

    #[test]
    fn negative_rates_are_rejected() {
        let mut rates = simple_rates();
        rates.virulence_rates = vec![vec![-0.3, 0.2]];
        assert!(rates.validate().is_err());
    }

    #[test]
    fn vaccinated_tracks_fall_back_to_unvaccinated_incubation() {
        let mut rates = simple_rates();
        assert_eq!(rates.incubation(Track::Dose2, 0), &[0.5, 1.0]);
        rates.incubation_rates_dose1 = Some(vec![vec![0.25, 1.0]]);
        assert_eq!(rates.incubation(Track::Dose1, 0), &[0.25, 1.0]);
        assert_eq!(rates.incubation(Track::Unvaccinated, 0), &[0.5, 1.0]);
    }

    #[test]
    fn vaccination_tables_are_checked_when_enabled() {
        let mut rates = simple_rates();
        rates.vaccination = true;
        assert!(rates.validate().is_err());
        rates.vaccination_rates_dose1 = vec![vec![0.01]];
        rates.vaccination_rates_dose2 = vec![vec![0.1, 0.2]];
        assert!(rates.validate().is_ok());
        assert_eq!(rates.dose1_uptake(0), 0.01);
    }

    #[test]
    fn deserializes_legacy_flag_names() {
        let json = r#"{
            "precision": 1000,
            "virulence_rates": [[0.3]],
            "incubation_rates": [[1.0]],
            "recovery_rates": [[]],
            "mobility_rates": [[1.0]],
            "fatality_rates": [[0.0]],
            "SIIRS_model": true,
            "Vaccinations": false
        }"#;
        let rates: RateConfiguration = serde_json::from_str(json).unwrap();
        assert!(rates.re_susceptibility);
        assert!(!rates.vaccination);
        assert_eq!(rates.precision.divider(), 1000);
        assert!(rates.validate().is_ok());
    }
}
