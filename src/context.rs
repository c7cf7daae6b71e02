//! An in-process scheduler for a set of cells.
//!
//! [`Simulation`] holds the published generation of every cell's state. A step computes each
//! cell's next state from the published generation only, so no cell ever observes a state of the
//! generation being computed. Computed states are scheduled on a plan queue at
//! `clock + output_delay` and published together once the clock reaches that step.
//!
//! Cells of one generation are independent and can be computed on several threads with
//! [`Simulation::set_parallelism`]; the result does not depend on the number of threads.

use std::thread;

use crate::cell::{CellView, GeographicalCell};
use crate::engine::{NoRecoveredUptake, RecoveredUptake, TransitionEngine};
use crate::error::ModelError;
use crate::hashing::IndexMap;
use crate::log::{debug, error, info};
use crate::plan::Queue;
use crate::rates::RateConfiguration;
use crate::state::{CellId, CellState};
use crate::vicinity::Vicinity;

/// A cell's neighbors in the order their contributions are summed, including the cell itself.
pub type Neighborhood = IndexMap<CellId, Vicinity>;

type StepObserver = dyn FnMut(&Simulation) -> Result<(), ModelError>;

struct Cell {
    state: CellState,
    neighborhood: Neighborhood,
}

struct SimulationView<'s> {
    id: &'s str,
    cell: &'s Cell,
    cells: &'s IndexMap<CellId, Cell>,
    clock: u64,
}

impl CellView for SimulationView<'_> {
    fn cell_id(&self) -> &str {
        self.id
    }

    fn current_state(&self) -> &CellState {
        &self.cell.state
    }

    fn neighbor_ids(&self) -> Vec<&str> {
        self.cell.neighborhood.keys().map(String::as_str).collect()
    }

    fn neighbor_state(&self, id: &str) -> Result<&CellState, ModelError> {
        self.cells
            .get(id)
            .map(|cell| &cell.state)
            .ok_or_else(|| {
                ModelError::MissingData(format!("no cell {id}, neighbor of {}", self.id))
            })
    }

    fn vicinity(&self, id: &str) -> Result<&Vicinity, ModelError> {
        self.cell.neighborhood.get(id).ok_or_else(|| {
            ModelError::MissingData(format!("{id} is not in the neighborhood of {}", self.id))
        })
    }

    fn clock(&self) -> u64 {
        self.clock
    }
}

pub struct Simulation {
    rates: RateConfiguration,
    cells: IndexMap<CellId, Cell>,
    publications: Queue<(usize, CellState), usize>,
    clock: u64,
    threads: usize,
    recovered_uptake: Box<dyn RecoveredUptake>,
    observers: Vec<Box<StepObserver>>,
}

impl Simulation {
    /// # Errors
    ///
    /// Returns `ModelError::ConfigInconsistency` if the rates fail validation.
    pub fn new(rates: RateConfiguration) -> Result<Simulation, ModelError> {
        rates.validate()?;
        Ok(Simulation {
            rates,
            cells: IndexMap::default(),
            publications: Queue::new(),
            clock: 0,
            threads: 1,
            recovered_uptake: Box::new(NoRecoveredUptake),
            observers: Vec::new(),
        })
    }

    /// Adds a cell with its initial state. The state's hysteresis map receives an inactive
    /// entry for every neighbor it does not have yet.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MissingData` if the cell is not part of its own neighborhood, and
    /// `ModelError::ConfigInconsistency` if the id is taken or the state does not fit the rates.
    pub fn add_cell(
        &mut self,
        id: impl Into<CellId>,
        mut state: CellState,
        neighborhood: Neighborhood,
    ) -> Result<(), ModelError> {
        let id = id.into();
        if !neighborhood.contains_key(&id) {
            let err =
                ModelError::MissingData(format!("cell {id} is not part of its own neighborhood"));
            error!("{err}");
            return Err(err);
        }
        if self.cells.contains_key(&id) {
            return Err(ModelError::ConfigInconsistency(format!("duplicate cell {id}")));
        }
        state
            .check_against(&self.rates)
            .inspect_err(|e| error!("cell {id}: {e}"))?;
        state.init_hysteresis(neighborhood.keys());
        self.cells.insert(id, Cell { state, neighborhood });
        Ok(())
    }

    /// Number of threads cells are computed on; values below one are treated as one.
    pub fn set_parallelism(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    pub fn set_recovered_uptake(&mut self, uptake: Box<dyn RecoveredUptake>) {
        self.recovered_uptake = uptake;
    }

    /// Registers a callback run after every step of [`Simulation::execute`].
    pub fn add_step_observer(
        &mut self,
        observer: impl FnMut(&Simulation) -> Result<(), ModelError> + 'static,
    ) {
        self.observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub fn rates(&self) -> &RateConfiguration {
        &self.rates
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// The published state of a cell.
    #[must_use]
    pub fn cell_state(&self, id: &str) -> Option<&CellState> {
        self.cells.get(id).map(|cell| &cell.state)
    }

    #[must_use]
    pub fn neighborhood(&self, id: &str) -> Option<&Neighborhood> {
        self.cells.get(id).map(|cell| &cell.neighborhood)
    }

    /// Published states in the order the cells were added.
    pub fn cells(&self) -> impl Iterator<Item = (&CellId, &CellState)> {
        self.cells.iter().map(|(id, cell)| (id, &cell.state))
    }

    /// Checks that every neighbor of every cell exists.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MissingData` naming the first unknown neighbor.
    pub fn check_neighborhoods(&self) -> Result<(), ModelError> {
        for (id, cell) in &self.cells {
            if let Some(missing) = cell
                .neighborhood
                .keys()
                .find(|neighbor| !self.cells.contains_key(*neighbor))
            {
                let err = ModelError::MissingData(format!("no cell {missing}, neighbor of {id}"));
                error!("{err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Computes one generation and publishes every state that is due.
    ///
    /// # Errors
    ///
    /// Returns the first error any cell produced; nothing is published in that case.
    pub fn step(&mut self) -> Result<(), ModelError> {
        let engine = TransitionEngine::new(&self.rates)
            .with_recovered_uptake(self.recovered_uptake.as_ref());
        let generation = compute_generation(&self.cells, &engine, self.clock, self.threads)?;
        for (index, state) in generation.into_iter().enumerate() {
            let publish_at = self.clock + GeographicalCell::output_delay(&state);
            self.publications.add_plan(publish_at, (index, state), index);
        }

        self.clock += 1;
        for plan in self.publications.take_due(self.clock) {
            let (index, state) = plan.data;
            if let Some((_, cell)) = self.cells.get_index_mut(index) {
                cell.state = state;
            }
        }
        debug!("published generation {}", self.clock);
        Ok(())
    }

    /// Runs `steps` steps, calling the step observers after each one.
    ///
    /// # Errors
    ///
    /// Stops at the first error from a neighborhood check, a cell or an observer.
    pub fn execute(&mut self, steps: u64) -> Result<(), ModelError> {
        self.check_neighborhoods()?;
        info!(
            "running {} cells for {steps} steps from step {} on {} thread(s)",
            self.cells.len(),
            self.clock,
            self.threads
        );
        for _ in 0..steps {
            self.step()?;
            self.notify_observers()?;
        }
        info!("finished at step {}", self.clock);
        Ok(())
    }

    fn notify_observers(&mut self) -> Result<(), ModelError> {
        let mut observers = std::mem::take(&mut self.observers);
        let result = observers
            .iter_mut()
            .try_for_each(|observer| observer(self));
        // Keep observers registered while the others ran.
        observers.append(&mut self.observers);
        self.observers = observers;
        result
    }
}

fn compute_generation(
    cells: &IndexMap<CellId, Cell>,
    engine: &TransitionEngine<'_>,
    clock: u64,
    threads: usize,
) -> Result<Vec<CellState>, ModelError> {
    let compute = |index: usize| -> Result<CellState, ModelError> {
        let (id, cell) = cells
            .get_index(index)
            .ok_or_else(|| ModelError::MissingData(format!("no cell at index {index}")))?;
        let view = SimulationView {
            id,
            cell,
            cells,
            clock,
        };
        GeographicalCell::local_computation(&view, engine)
    };

    if threads <= 1 || cells.len() < 2 {
        return (0..cells.len()).map(compute).collect();
    }

    let chunk_size = cells.len().div_ceil(threads);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..cells.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(cells.len());
                scope.spawn(move || (start..end).map(compute).collect::<Result<Vec<_>, _>>())
            })
            .collect();
        let mut generation = Vec::with_capacity(cells.len());
        for handle in handles {
            let states = handle
                .join()
                .map_err(|_| ModelError::ModelError("cell worker thread panicked".to_string()))??;
            generation.extend(states);
        }
        Ok(generation)
    })
}
