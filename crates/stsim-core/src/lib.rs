//! STSim Core -- the engine for stochastic state-and-transition simulation.
//!
//! A landscape is a set of cells. Each cell sits in a stratum and a state
//! class and carries an age and per-group time-since-transition counters.
//! Every timestep, each cell may take at most one probabilistic transition
//! per transition group, then ages and may take a deterministic (age
//! triggered) transition. Targets, prioritizations and multipliers shape
//! the probabilities; patches spread transitions across neighbouring cells
//! in spatial runs.
//!
//! # Timestep Pipeline
//!
//! Each call to [`engine::Simulation::step`] advances the current iteration
//! by one timestep:
//!
//! 1. **Resample** -- Redraw timestep-frequency distribution values.
//! 2. **Candidates** -- Rebuild and shuffle every cell's applicable
//!    transitions.
//! 3. **Order** -- Shuffle the primary groups, then sort by configured
//!    order.
//! 4. **Groups** -- For each group: target multipliers, then one draw per
//!    cell (plus patch spread when spatial).
//! 5. **Deterministic** -- Age cells, apply deterministic transitions,
//!    record state and advance TST counters.
//!
//! # Building a Scenario
//!
//! ```rust,ignore
//! let mut b = RegistryBuilder::new();
//! let forest = b.register_stratum("Forest")?;
//! let young = b.register_state_class("Young")?;
//! let old = b.register_state_class("Old")?;
//! let fire = b.register_transition_type("Fire")?;
//!
//! let mut scenario = ScenarioBuilder::new(b.build());
//! scenario.initial_conditions(
//!     InitialConditions::new(100.0, 100).with_row(InitialConditionRow::new(forest, young, 1.0)),
//! );
//! scenario.add_transition(Transition::new(young, Some(old), fire, 0.05));
//! let scenario = scenario.build()?;
//!
//! let mut sim = Simulation::new(&scenario, 42);
//! sim.run(&mut SummaryCollector::new())?;
//! ```
//!
//! # Key Types
//!
//! - [`engine::Simulation`] -- Iteration driver and timestep pipeline.
//! - [`scenario::Scenario`] -- Immutable, validated model configuration
//!   with its lookup maps.
//! - [`registry::Registry`] -- Strata, state classes, transition types and
//!   groups (frozen at startup).
//! - [`cell::CellCollection`] -- Cells of the current iteration with a
//!   stratum index.
//! - [`keymap::KeyMap`] -- Wildcard-aware multi-key lookup with
//!   iteration/timestep fallback.
//! - [`spatial::SpatialModel`] -- Seam for raster landscapes.
//! - [`output::OutputSink`] -- Receives state, transition and attribute
//!   records.
//! - [`event::EventBus`] -- Synchronous subscription-based event bus.
//! - [`serialize`] -- Versioned iteration snapshots via bitcode.

pub mod ages;
pub mod attribute;
pub mod cell;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod event;
pub mod id;
pub mod keymap;
pub mod multiplier;
pub mod output;
pub mod patch;
pub mod registry;
pub mod rng;
pub mod scenario;
pub mod selector;
pub mod serialize;
pub mod sim;
pub mod spatial;
pub mod target;
pub mod transition;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
