//! Criterion benchmarks for raster landscapes.

use criterion::{Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use stsim_core::engine::Simulation;
use stsim_core::output::NullSink;
use stsim_core::test_utils::*;
use stsim_core::patch::TransitionSizeDistribution;
use stsim_spatial::{
    AdjacencyMultiplier, AdjacencySetting, AdjacencyTarget, Direction, DirectionMultiplier, InputRasters,
    LandscapeConfig, Raster, RasterLandscape, RasterMetadata,
};

fn landscape(side: usize, config: &LandscapeConfig) -> RasterLandscape {
    let meta = RasterMetadata::new(side, side, 30.0);
    let inputs = InputRasters::new(Raster::filled(meta.clone(), FOREST.0), Raster::filled(meta, YOUNG.0));
    RasterLandscape::build(inputs, config, &BTreeMap::new()).expect("valid landscape")
}

fn bench_spread(c: &mut Criterion) {
    let mut group = c.benchmark_group("spread");
    group.sample_size(20);

    let mut b = make_spatial_builder(1000);
    b.add_transition(fire(0.001));
    b.add_transition(regrow(0.05));
    b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 90_000.0, 1.0));
    let scenario = b.build().expect("valid scenario");

    let config = LandscapeConfig {
        direction_multipliers: vec![DirectionMultiplier::new(FIRE_GROUP, Direction::East, 2.0)],
        ..Default::default()
    };
    let mut sim = Simulation::new(&scenario, 1).with_spatial_model(Box::new(landscape(100, &config)));
    sim.begin_iteration(1, &mut NullSink).expect("iteration starts");

    group.bench_function("100x100_patches", |b| {
        b.iter(|| sim.step(&mut NullSink).expect("step"));
    });
    group.finish();
}

fn bench_adjacency(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjacency");
    group.sample_size(20);

    let mut b = make_spatial_builder(1000);
    b.add_transition(fire(0.01));
    b.add_transition(regrow(0.05));
    let scenario = b.build().expect("valid scenario");

    let mut setting = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
    setting.radius = Some(90.0);
    let config = LandscapeConfig {
        adjacency_settings: vec![setting],
        adjacency_multipliers: vec![
            AdjacencyMultiplier::new(FIRE_GROUP, 0.0, 0.5),
            AdjacencyMultiplier::new(FIRE_GROUP, 0.25, 2.0),
        ],
        ..Default::default()
    };
    let mut sim = Simulation::new(&scenario, 1).with_spatial_model(Box::new(landscape(100, &config)));
    sim.begin_iteration(1, &mut NullSink).expect("iteration starts");

    group.bench_function("100x100_radius_3", |b| {
        b.iter(|| sim.step(&mut NullSink).expect("step"));
    });
    group.finish();
}

criterion_group!(benches, bench_spread, bench_adjacency);
criterion_main!(benches);
