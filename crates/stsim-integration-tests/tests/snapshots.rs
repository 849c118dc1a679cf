//! Iteration snapshots taken from loaded scenarios: resuming must be
//! indistinguishable from running straight through.

use std::path::Path;
use stsim_core::engine::Simulation;
use stsim_core::output::{NullSink, SummaryCollector};
use stsim_core::serialize::{read_snapshot_header, IterationSnapshot};
use stsim_core::validation::validate_snapshot_determinism;
use stsim_data::load_scenario;

fn forest() -> stsim_data::LoadedScenario {
    load_scenario(&Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/forest")).unwrap()
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let loaded = forest();
    let seed = loaded.options.seed;

    let mut straight = Simulation::new(&loaded.scenario, seed);
    straight.run_iteration(2, &mut NullSink).unwrap();

    let mut first = Simulation::new(&loaded.scenario, seed);
    first.begin_iteration(2, &mut NullSink).unwrap();
    for _ in 0..4 {
        first.step(&mut NullSink).unwrap();
    }
    let bytes = first.serialize().unwrap();

    let mut resumed = Simulation::new(&loaded.scenario, 0);
    resumed.deserialize_into(&bytes).unwrap();
    assert_eq!(resumed.sim_state().iteration, 2);
    assert_eq!(resumed.sim_state().timestep, 4);
    while resumed.sim_state().timestep < loaded.scenario.run_control().max_timestep {
        resumed.step(&mut NullSink).unwrap();
    }
    assert_eq!(resumed.state_hash(), straight.state_hash());
}

#[test]
fn resumed_output_matches_from_snapshot_timestep() {
    let loaded = forest();
    let seed = loaded.options.seed;

    let mut straight = Simulation::new(&loaded.scenario, seed);
    let mut expected = SummaryCollector::new();
    straight.run_iteration(1, &mut expected).unwrap();

    let mut first = Simulation::new(&loaded.scenario, seed);
    first.begin_iteration(1, &mut NullSink).unwrap();
    for _ in 0..6 {
        first.step(&mut NullSink).unwrap();
    }
    let snapshot = first.snapshot().unwrap();

    let mut resumed = Simulation::new(&loaded.scenario, seed);
    resumed.restore(snapshot).unwrap();
    let mut actual = SummaryCollector::new();
    while resumed.sim_state().timestep < 10 {
        resumed.step(&mut actual).unwrap();
    }

    let registry = loaded.scenario.registry();
    for name in ["Young", "Mid", "Old"] {
        let sc = registry.state_class_id(name).unwrap();
        for timestep in 7..=10 {
            assert_eq!(
                actual.state_amount(1, timestep, sc),
                expected.state_amount(1, timestep, sc),
                "{name} at timestep {timestep}"
            );
        }
    }
}

#[test]
fn snapshot_header_and_replay_determinism() {
    let loaded = forest();
    let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed);
    sim.begin_iteration(3, &mut NullSink).unwrap();
    sim.step(&mut NullSink).unwrap();
    let bytes = sim.serialize().unwrap();

    let header = read_snapshot_header(&bytes).unwrap();
    assert_eq!(header.iteration, 3);
    assert_eq!(header.timestep, 1);
    assert_eq!(IterationSnapshot::from_bytes(&bytes).unwrap().cells.len(), 1000);

    let result = validate_snapshot_determinism(&loaded.scenario, &bytes, 9).unwrap();
    assert!(result.is_deterministic);
    assert_eq!(result.hash_log.len(), 10);
}

#[test]
fn corrupted_snapshot_is_rejected() {
    let loaded = forest();
    let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed);
    sim.begin_iteration(1, &mut NullSink).unwrap();
    let bytes = sim.serialize().unwrap();

    let mut other = Simulation::new(&loaded.scenario, 0);
    assert!(other.deserialize_into(&bytes[..bytes.len() / 2]).is_err());
}
