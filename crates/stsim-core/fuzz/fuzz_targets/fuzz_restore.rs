#![no_main]
use libfuzzer_sys::fuzz_target;
use stsim_core::engine::Simulation;
use stsim_core::output::NullSink;
use stsim_core::test_utils::*;

fuzz_target!(|data: &[u8]| {
    // Restoring arbitrary bytes must fail cleanly; a restore that succeeds
    // must leave a simulation that can keep stepping.
    let mut b = make_builder(10, 3);
    b.add_transition(fire(0.5));
    let Ok(scenario) = b.build() else {
        return;
    };
    let mut sim = Simulation::new(&scenario, 0);
    if sim.deserialize_into(data).is_ok() {
        let _ = sim.step(&mut NullSink);
    }
});
