//! Scenario files: the rate tables plus every cell's initial state and neighborhood.
//!
//! ```json
//! {
//!   "rates": { "virulence_rates": [[0.3, 0.2]], ... },
//!   "cells": {
//!     "a": {
//!       "state": { "age_group_weights": [1.0], "susceptible": { ... }, ... },
//!       "neighborhood": { "a": { "correlation": 1.0 }, "b": { "correlation": 0.5 } }
//!     }
//!   }
//! }
//! ```
//!
//! The order of `cells` and of each `neighborhood` is preserved.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::{Neighborhood, Simulation};
use crate::error::ModelError;
use crate::hashing::IndexMap;
use crate::log::{error, info};
use crate::rates::RateConfiguration;
use crate::state::{CellId, CellState};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    pub state: CellState,
    pub neighborhood: Neighborhood,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub rates: RateConfiguration,
    pub cells: IndexMap<CellId, CellConfig>,
}

impl Scenario {
    /// Reads a scenario from a JSON file. The result has not been validated yet.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::IoError` if the file cannot be read and `ModelError::JsonError` if it
    /// is not a well formed scenario.
    pub fn load(path: &Path) -> Result<Scenario, ModelError> {
        let content = fs::read_to_string(path)
            .inspect_err(|e| error!("failed to read scenario {}: {e}", path.display()))?;
        let scenario = Scenario::from_json(&content)
            .inspect_err(|e| error!("failed to parse scenario {}: {e}", path.display()))?;
        info!(
            "loaded {} cells from {}",
            scenario.cells.len(),
            path.display()
        );
        Ok(scenario)
    }

    /// # Errors
    ///
    /// Returns `ModelError::JsonError` if `json` is not a well formed scenario.
    pub fn from_json(json: &str) -> Result<Scenario, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Captures the published state of every cell, for example to resume a run later.
    #[must_use]
    pub fn from_simulation(simulation: &Simulation) -> Scenario {
        let cells = simulation
            .cells()
            .map(|(id, state)| {
                let neighborhood = simulation.neighborhood(id).cloned().unwrap_or_default();
                (
                    id.clone(),
                    CellConfig {
                        state: state.clone(),
                        neighborhood,
                    },
                )
            })
            .collect();
        Scenario {
            rates: simulation.rates().clone(),
            cells,
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::IoError` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Validates the rates, every cell against the rates, and every neighborhood, then builds
    /// the simulation.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigInconsistency` or `MissingData` found.
    pub fn into_simulation(self) -> Result<Simulation, ModelError> {
        let mut simulation = Simulation::new(self.rates)?;
        for (id, cell) in self.cells {
            simulation.add_cell(id, cell.state, cell.neighborhood)?;
        }
        simulation.check_neighborhoods()?;
        Ok(simulation)
    }
}
