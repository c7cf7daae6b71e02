//! The boundary between the transition engine and whatever schedules cells.
//!
//! A scheduler exposes one cell at a time through [`CellView`]; [`GeographicalCell`] turns that
//! view into the engine's inputs and tells the scheduler when the result becomes visible.

use crate::engine::{Neighbor, TransitionEngine};
use crate::error::ModelError;
use crate::state::CellState;
use crate::vicinity::Vicinity;

/// What a cell can see while it is being stepped.
pub trait CellView {
    fn cell_id(&self) -> &str;

    /// The cell's own previous-step state.
    fn current_state(&self) -> &CellState;

    /// Neighbor ids in neighborhood order, including the cell itself.
    fn neighbor_ids(&self) -> Vec<&str>;

    /// The previous-step state of a neighbor.
    ///
    /// # Errors
    ///
    /// `ModelError::MissingData` if there is no cell `id`.
    fn neighbor_state(&self, id: &str) -> Result<&CellState, ModelError>;

    /// # Errors
    ///
    /// `ModelError::MissingData` if `id` is not a neighbor.
    fn vicinity(&self, id: &str) -> Result<&Vicinity, ModelError>;

    /// The step being computed. Only used for diagnostics.
    fn clock(&self) -> u64;
}

pub struct GeographicalCell;

impl GeographicalCell {
    /// Steps before a computed state becomes visible to the neighbors.
    pub const OUTPUT_DELAY: u64 = 1;

    /// Computes the next state of the viewed cell.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the view and any error from
    /// [`TransitionEngine::next_state`].
    pub fn local_computation<V: CellView + ?Sized>(
        view: &V,
        engine: &TransitionEngine<'_>,
    ) -> Result<CellState, ModelError> {
        let ids = view.neighbor_ids();
        let neighbors = ids
            .iter()
            .map(|&id| Ok(Neighbor::new(id, view.neighbor_state(id)?, view.vicinity(id)?)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        engine.next_state(view.cell_id(), view.current_state(), &neighbors, view.clock())
    }

    #[must_use]
    pub fn output_delay(_state: &CellState) -> u64 {
        Self::OUTPUT_DELAY
    }
}
