//! Event example: count fires per timestep with a listener.
//!
//! Subscribes to probabilistic cell changes, runs one iteration, and prints
//! the burned area per timestep next to the state class totals.
//!
//! Run with: `cargo run -p stsim-core --example fire_events`

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use stsim_core::config::{InitialConditionRow, InitialConditions, RunControl};
use stsim_core::engine::Simulation;
use stsim_core::event::{Event, EventKind};
use stsim_core::output::SummaryCollector;
use stsim_core::registry::RegistryBuilder;
use stsim_core::scenario::ScenarioBuilder;
use stsim_core::transition::Transition;

fn main() {
    let mut registry = RegistryBuilder::new();
    let forest = registry.register_stratum("Forest").unwrap();
    let young = registry.register_state_class("Young").unwrap();
    let old = registry.register_state_class("Old").unwrap();
    let fire = registry.register_transition_type("Fire").unwrap();
    let growth = registry.register_transition_type("Growth").unwrap();

    let mut b = ScenarioBuilder::new(registry.build());
    b.run_control(RunControl::new(1, 10)).initial_conditions(
        InitialConditions::new(10_000.0, 1000).with_row(InitialConditionRow::new(forest, old, 1.0)),
    );
    b.add_transition(Transition::new(young, Some(old), growth, 0.2));
    b.add_transition(Transition::new(old, Some(young), fire, 0.03));
    let scenario = b.build().expect("scenario should validate");

    let mut sim = Simulation::new(&scenario, 7);
    let fires: Rc<RefCell<BTreeMap<i32, usize>>> = Rc::default();
    let sink = fires.clone();
    sim.event_bus.subscribe(
        EventKind::ChangingCellProbabilistic,
        Box::new(move |e| {
            if let Event::ChangingCellProbabilistic {
                transition_type,
                timestep,
                ..
            } = e
            {
                if *transition_type == fire {
                    *sink.borrow_mut().entry(*timestep).or_default() += 1;
                }
            }
        }),
    );

    let mut summary = SummaryCollector::new();
    sim.run_iteration(1, &mut summary).expect("run should succeed");

    println!("timestep  fires  burned_area  young  old");
    for timestep in 1..=10 {
        let count = fires.borrow().get(&timestep).copied().unwrap_or(0);
        println!(
            "{timestep:>8}  {count:>5}  {:>11.1}  {:>5.0}  {:>3.0}",
            count as f64 * sim.amount_per_cell(),
            summary.state_amount(1, timestep, young),
            summary.state_amount(1, timestep, old),
        );
    }
}
