//! Save/load example: resume an iteration from a snapshot.
//!
//! Builds a two-class forest, runs five timesteps, serializes the iteration
//! to bytes, restores it into a fresh simulation, and verifies that both
//! copies stay identical to the end of the run.
//!
//! Run with: `cargo run -p stsim-core --example save_load`

use stsim_core::config::{InitialConditionRow, InitialConditions, RunControl};
use stsim_core::engine::Simulation;
use stsim_core::output::NullSink;
use stsim_core::registry::RegistryBuilder;
use stsim_core::scenario::{Scenario, ScenarioBuilder};
use stsim_core::transition::Transition;

/// 500 cells of Young forest that burn back from Old and grow up again.
fn build_scenario() -> Scenario {
    let mut registry = RegistryBuilder::new();
    let forest = registry.register_stratum("Forest").unwrap();
    let young = registry.register_state_class("Young").unwrap();
    let old = registry.register_state_class("Old").unwrap();
    let fire = registry.register_transition_type("Fire").unwrap();
    let growth = registry.register_transition_type("Growth").unwrap();

    let mut b = ScenarioBuilder::new(registry.build());
    b.run_control(RunControl::new(1, 20))
        .initial_conditions(InitialConditions::new(500.0, 500).with_row(InitialConditionRow::new(forest, young, 1.0)));
    b.add_transition(Transition::new(young, Some(old), growth, 0.1));
    b.add_transition(Transition::new(old, Some(young), fire, 0.05));
    b.build().expect("scenario should validate")
}

fn main() {
    let scenario = build_scenario();

    // --- Step 1: Run halfway ---

    let mut sim = Simulation::new(&scenario, 42);
    sim.begin_iteration(1, &mut NullSink).expect("iteration should start");
    for _ in 0..5 {
        sim.step(&mut NullSink).expect("step should succeed");
    }
    println!("Saved at timestep {}", sim.sim_state().timestep);

    // --- Step 2: Serialize ---

    let bytes = sim.serialize().expect("serialization should succeed");
    println!("Serialized to {} bytes", bytes.len());

    // --- Step 3: Restore into a fresh simulation ---

    let mut restored = Simulation::new(&scenario, 0);
    restored.deserialize_into(&bytes).expect("deserialization should succeed");
    assert_eq!(sim.state_hash(), restored.state_hash(), "restored state should match");

    // --- Step 4: Run both to the end ---

    while sim.sim_state().timestep < scenario.run_control().max_timestep {
        sim.step(&mut NullSink).expect("step should succeed");
        restored.step(&mut NullSink).expect("step should succeed");
    }

    println!("\nAfter timestep {}:", sim.sim_state().timestep);
    println!("  Original hash: {:016x}", sim.state_hash());
    println!("  Restored hash: {:016x}", restored.state_hash());
    assert_eq!(sim.state_hash(), restored.state_hash(), "hashes should match after resume");

    println!("\nSnapshot resume verified successfully.");
}
