//! A cellular, age-structured SEVIRDS epidemic model
//!
//! Sevirds steps a set of geographical cells through a discrete-time
//! compartmental model: Susceptible, Exposed, Vaccinated (one or two doses),
//! Infected, Recovered, Deceased, with optional return from Recovered to
//! Susceptible. Every compartment is a proportion of the cell's population
//! tracked per age group and per day spent in the compartment.
//!
//! The central piece is the [`TransitionEngine`], a pure function from a
//! cell's previous state, its neighbors' previous states and the shared
//! [`RateConfiguration`] to the cell's next state. Around it the crate
//! provides:
//! * [`Scenario`] files that describe the rates, the cells and their
//!   neighborhoods as JSON.
//! * A [`Simulation`] that steps every cell in lockstep generations,
//!   optionally on several threads.
//! * CSV state reports and a command line runner.
//!
//! ```no_run
//! use std::path::Path;
//! use sevirds::{ModelError, Scenario};
//!
//! fn run() -> Result<(), ModelError> {
//!     let mut simulation = Scenario::load(Path::new("scenario.json"))?.into_simulation()?;
//!     simulation.execute(365)?;
//!     for (id, state) in simulation.cells() {
//!         println!("{id}: {state}");
//!     }
//!     Ok(())
//! }
//! ```
pub mod cell;
pub mod context;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod hysteresis;
pub mod log;
mod macros;
pub mod numeric;
pub mod plan;
#[cfg(feature = "progress_bar")]
pub mod progress;
pub mod rates;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod state;
pub mod vicinity;

pub use crate::log::{debug, error, info, trace, warn};
pub use cell::{CellView, GeographicalCell};
pub use context::{Neighborhood, Simulation};
pub use engine::{compute_next_state, Neighbor, RecoveredUptake, TransitionEngine};
pub use error::ModelError;
pub use rates::RateConfiguration;
pub use report::{SimulationReportExt, StateReport};
pub use scenario::Scenario;
pub use state::{CellId, CellState, Track};
pub use vicinity::Vicinity;
