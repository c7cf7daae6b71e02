use std::hint::black_box;
use std::path::Path;

use criterion::{criterion_group, criterion_main, Criterion};
use sevirds::{compute_next_state, Neighbor, Neighborhood, Scenario, Simulation, Vicinity};

static GRID_SIZE: usize = 20;
static SCENARIO: &str = "tests/data/vaccination.json";

fn cell_id(row: usize, column: usize) -> String {
    format!("{row}-{column}")
}

/// A square grid where every cell neighbors the eight cells around it.
fn grid(threads: usize) -> Simulation {
    let scenario = Scenario::load(Path::new(SCENARIO)).expect("failed to load scenario");
    let template = &scenario.cells["north"];
    let vicinity = template.neighborhood["centre"].clone();
    let mut simulation = Simulation::new(scenario.rates.clone()).expect("invalid rates");
    for row in 0..GRID_SIZE {
        for column in 0..GRID_SIZE {
            let mut neighborhood = Neighborhood::default();
            neighborhood.insert(cell_id(row, column), template.neighborhood["north"].clone());
            for (dr, dc) in (-1..=1).flat_map(|dr| (-1..=1).map(move |dc| (dr, dc))) {
                let (Some(r), Some(c)) = (row.checked_add_signed(dr), column.checked_add_signed(dc))
                else {
                    continue;
                };
                if (dr, dc) != (0, 0) && r < GRID_SIZE && c < GRID_SIZE {
                    neighborhood.insert(cell_id(r, c), vicinity.clone());
                }
            }
            let state = if (row, column) == (0, 0) {
                template.state.clone()
            } else {
                scenario.cells["south"].state.clone()
            };
            simulation
                .add_cell(cell_id(row, column), state, neighborhood)
                .expect("failed to add cell");
        }
    }
    simulation.set_parallelism(threads);
    // Warm up so that the benchmark steps an epidemic in progress.
    simulation.execute(30).expect("warm up failed");
    simulation
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let scenario = Scenario::load(Path::new(SCENARIO)).expect("failed to load scenario");
    let centre = &scenario.cells["centre"];
    let states: Vec<_> = centre
        .neighborhood
        .keys()
        .map(|id| (id.as_str(), &scenario.cells[id.as_str()].state))
        .collect();
    let vicinities: Vec<&Vicinity> = centre.neighborhood.values().collect();
    c.bench_function("compute_next_state", |bencher| {
        bencher.iter(|| {
            let neighbors: Vec<Neighbor> = states
                .iter()
                .zip(&vicinities)
                .map(|(&(id, state), vicinity)| Neighbor::new(id, state, vicinity))
                .collect();
            compute_next_state("centre", &centre.state, &neighbors, &scenario.rates, 1)
                .expect("step failed")
        });
    });

    for threads in [1, 4] {
        let mut simulation = grid(threads);
        c.bench_function(&format!("grid generation, {threads} thread(s)"), |bencher| {
            bencher.iter(|| black_box(&mut simulation).step().expect("step failed"));
        });
    }
}

criterion_group!(cell_step_benches, criterion_benchmark);
criterion_main!(cell_step_benches);
