//! CSV reports of the epidemic state of every cell.
//!
//! A report file holds one [`StateReport`] row per cell per step, starting with the initial
//! state at step 0. Every proportion is weighted by the age group weights of the cell.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use serde::{Deserialize, Serialize};

use crate::context::Simulation;
use crate::error::ModelError;
use crate::log::{debug, error};
use crate::state::{CellState, Track};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub step: u64,
    pub cell_id: String,
    pub population: f64,
    /// Unvaccinated susceptibles only.
    pub susceptible: f64,
    pub exposed: f64,
    pub vaccinated_dose1: f64,
    pub vaccinated_dose2: f64,
    pub infected: f64,
    pub recovered: f64,
    pub new_exposed: f64,
    pub new_infected: f64,
    pub new_recovered: f64,
    pub fatalities: f64,
}

impl StateReport {
    #[must_use]
    pub fn new(step: u64, cell_id: &str, state: &CellState) -> StateReport {
        StateReport {
            step,
            cell_id: cell_id.to_string(),
            population: state.population,
            susceptible: state.total_susceptible(),
            exposed: state.total_exposed(),
            vaccinated_dose1: state.total_vaccinated(Track::Dose1),
            vaccinated_dose2: state.total_vaccinated(Track::Dose2),
            infected: state.total_infections(),
            recovered: state.total_recovered(),
            new_exposed: state.new_exposed(),
            new_infected: state.new_infections(),
            new_recovered: state.new_recoveries(),
            fatalities: state.total_fatalities(),
        }
    }
}

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful.
fn generate_validate_filepath(path: &Path) -> Result<File, ModelError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(ModelError::ReportError(
            "Report output files must be CSVs at this time".to_string(),
        )),
    }
}

pub struct ReportWriter {
    writer: Writer<File>,
}

impl ReportWriter {
    /// # Errors
    ///
    /// Returns `ModelError::ReportError` if `path` is not a `.csv` file and
    /// `ModelError::IoError` if it cannot be created.
    pub fn create(path: &Path) -> Result<ReportWriter, ModelError> {
        let file = generate_validate_filepath(path)
            .inspect_err(|e| error!("cannot create report {}: {e}", path.display()))?;
        Ok(ReportWriter {
            writer: Writer::from_writer(file),
        })
    }

    /// Writes one row and flushes it to disk.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::CSVError` or `ModelError::IoError` if writing fails.
    pub fn send_report<T: Serialize>(&mut self, report: &T) -> Result<(), ModelError> {
        self.writer.serialize(report)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a row for every cell's published state at the current step.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::CSVError` or `ModelError::IoError` if writing fails.
    pub fn send_generation(&mut self, simulation: &Simulation) -> Result<(), ModelError> {
        let step = simulation.clock();
        for (id, state) in simulation.cells() {
            self.writer.serialize(StateReport::new(step, id, state))?;
        }
        self.writer.flush()?;
        debug!("reported {} cells at step {step}", simulation.num_cells());
        Ok(())
    }
}

pub trait SimulationReportExt {
    /// Writes the current generation to a new report at `path` and appends every following
    /// generation produced by [`Simulation::execute`].
    ///
    /// # Errors
    ///
    /// Returns an error if the report file cannot be created or written.
    fn add_state_report(&mut self, path: &Path) -> Result<(), ModelError>;
}

impl SimulationReportExt for Simulation {
    fn add_state_report(&mut self, path: &Path) -> Result<(), ModelError> {
        let mut writer = ReportWriter::create(path)?;
        writer.send_generation(self)?;
        self.add_step_observer(move |simulation| writer.send_generation(simulation));
        Ok(())
    }
}
