//! A console progress bar for the steps of a run.
//!
//! Only one progress bar can be active at a time. [`init_step_progress_bar`] sets it up for the
//! next `steps` steps of a simulation and registers a step observer that moves it forward and
//! finalizes it on the last step.
//!
//! ```ignore
//! init_step_progress_bar(&mut simulation, 365);
//! simulation.execute(365)?;
//! ```

use crate::context::Simulation;
use crate::log::trace;
use progress_bar::{
    finalize_progress_bar, init_progress_bar, set_progress_bar_action,
    set_progress_bar_progress, Color, Style,
};

/// Initializes the progress bar for the next `steps` steps of `simulation`.
pub fn init_step_progress_bar(simulation: &mut Simulation, steps: u64) {
    let first = simulation.clock();
    let last = first + steps;
    trace!("initializing step progress bar from step {first} to {last}");
    init_progress_bar(usize::try_from(steps).unwrap_or(usize::MAX));
    set_progress_bar_action("Step", Color::Blue, Style::Bold);
    simulation.add_step_observer(move |simulation| {
        update_step_progress(simulation.clock(), first, last);
        Ok(())
    });
}

fn update_step_progress(clock: u64, first: u64, last: u64) {
    if clock > last {
        return;
    }
    let done = clock.saturating_sub(first);
    set_progress_bar_progress(usize::try_from(done).unwrap_or(usize::MAX));
    if clock == last {
        finalize_progress_bar();
    }
}
