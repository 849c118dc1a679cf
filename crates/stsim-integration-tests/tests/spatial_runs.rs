//! Spatial runs across the core, spatial and data crates.
//!
//! `fixtures/landscape` is a 4x4 raster (30 m cells, one no-data cell)
//! with fire spreading in patches of up to three cells, a fire-risk
//! multiplier raster and an eastward spread bias. The remaining tests build
//! rasters in code to pin down spread behaviour exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use stsim_core::cell::Cell;
use stsim_core::engine::Simulation;
use stsim_core::id::CellId;
use stsim_core::output::{OutputSink, SummaryCollector, TransitionRecord};
use stsim_core::patch::TransitionSizeDistribution;
use stsim_core::test_utils::*;
use stsim_data::load_scenario;
use stsim_spatial::{
    Direction, DirectionMultiplier, InputRasters, LandscapeConfig, Raster, RasterLandscape, RasterMetadata,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

/// Records the cells of every transition alongside the summary.
#[derive(Default)]
struct CellLog {
    summary: SummaryCollector,
    fired: Vec<(i32, i32, CellId)>,
}

impl OutputSink for CellLog {
    fn record_state(&mut self, iteration: i32, timestep: i32, cell: &Cell, amount: f64) {
        self.summary.record_state(iteration, timestep, cell, amount);
    }

    fn record_transition(&mut self, r: &TransitionRecord) {
        if r.group == FIRE_GROUP {
            self.fired.push((r.iteration, r.timestep, r.cell));
        }
        self.summary.record_transition(r);
    }
}

// ===========================================================================
// Fixture landscape
// ===========================================================================

#[test]
fn landscape_fixture_skips_no_data_cell() {
    init_tracing();
    let loaded = load_scenario(&fixture("landscape")).unwrap();
    let landscape = loaded.landscape.expect("spatial fixture has a landscape");
    assert_eq!(landscape.metadata().rows, 4);
    assert_eq!(landscape.metadata().cell_area(), 900.0);
    assert!(landscape.warnings().is_empty());

    let registry = loaded.scenario.registry();
    let young = registry.state_class_id("Young").unwrap();
    let old = registry.state_class_id("Old").unwrap();

    let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed).with_spatial_model(Box::new(landscape));
    assert_eq!(sim.scenario().run_control().max_iteration, 2);
    let mut log = CellLog::default();
    sim.run(&mut log).unwrap();

    // 15 of the 16 cells carry data.
    assert!(sim.cells().index_of(CellId(16)).is_none());
    assert_eq!(sim.cells().len(), 15);
    for iteration in 1..=2 {
        for timestep in 0..=5 {
            let total = log.summary.state_amount(iteration, timestep, young) + log.summary.state_amount(iteration, timestep, old);
            assert!((total - 15.0 * 900.0).abs() < 1e-6);
        }
    }
}

#[test]
fn zero_fire_risk_cells_never_burn() {
    init_tracing();
    let loaded = load_scenario(&fixture("landscape")).unwrap();
    let landscape = loaded.landscape.unwrap();
    let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed).with_spatial_model(Box::new(landscape));
    let mut log = CellLog::default();
    sim.run(&mut log).unwrap();

    let protected: BTreeSet<CellId> = [9, 10, 13, 14].into_iter().map(CellId).collect();
    assert!(log.fired.iter().all(|(_, _, cell)| !protected.contains(cell)));
    assert!(log.fired.iter().all(|(_, _, cell)| *cell != CellId(16)));
}

#[test]
fn landscape_runs_are_reproducible() {
    init_tracing();
    let run = || {
        let loaded = load_scenario(&fixture("landscape")).unwrap();
        let landscape = loaded.landscape.unwrap();
        let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed).with_spatial_model(Box::new(landscape));
        let mut log = CellLog::default();
        sim.run(&mut log).unwrap();
        (log.summary, log.fired, sim.state_hash())
    };
    assert_eq!(run(), run());
}

// ===========================================================================
// Spread behaviour
// ===========================================================================

/// A 1 x `cols` strip of Young Forest with a single Burned seed cell.
fn strip(cols: usize, seed_col: usize) -> InputRasters {
    let meta = RasterMetadata::new(1, cols, 10.0);
    let mut strata = vec![FOREST.0; cols];
    strata[seed_col] = BURN_STRATUM.0;
    let stratum = Raster::new("stratum", meta.clone(), strata).unwrap();
    InputRasters::new(stratum, Raster::filled(meta, YOUNG.0))
}

/// Fire that only ignites in the Burned stratum and spreads into patches
/// of three cells.
fn seeded_fire_scenario() -> stsim_core::scenario::Scenario {
    let mut b = make_spatial_builder(1);
    b.add_transition(fire(1e-12));
    let mut seed = fire(1.0);
    seed.stratum_source = Some(BURN_STRATUM);
    b.add_transition(seed);
    b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 200.0, 0.0));
    b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 300.0, 1.0));
    b.build().unwrap()
}

fn fired_cells(config: &LandscapeConfig, seed: u64) -> BTreeSet<i32> {
    let scenario = seeded_fire_scenario();
    let landscape = RasterLandscape::build(strip(7, 3), config, &BTreeMap::new()).unwrap();
    let mut sim = Simulation::new(&scenario, seed).with_spatial_model(Box::new(landscape));
    let mut log = CellLog::default();
    sim.run_iteration(1, &mut log).unwrap();
    log.fired.iter().map(|(_, _, c)| c.0).collect()
}

#[test]
fn patch_spreads_to_sampled_size() {
    for seed in 1..5 {
        let fired = fired_cells(&LandscapeConfig::default(), seed);
        assert_eq!(fired.len(), 3, "seed {seed}: {fired:?}");
        assert!(fired.contains(&4));
    }
}

#[test]
fn blocked_direction_steers_the_patch() {
    let config = LandscapeConfig {
        direction_multipliers: vec![DirectionMultiplier::new(FIRE_GROUP, Direction::West, 0.0)],
        ..Default::default()
    };
    for seed in 1..5 {
        assert_eq!(fired_cells(&config, seed), BTreeSet::from([4, 5, 6]));
    }
}
