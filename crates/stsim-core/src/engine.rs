//! The timestep driver: runs iterations of a scenario over a cell
//! collection.
//!
//! # Architecture
//!
//! A [`Simulation`] borrows an immutable [`Scenario`] and owns everything
//! that changes while it runs:
//! - the [`CellCollection`] of the current iteration
//! - the current distribution samples ([`SampledValues`])
//! - target budgets ([`TargetTracker`])
//! - one [`SimRng`] stream, derived from the run seed and the iteration
//! - an [`EventBus`] for synchronous notifications
//! - optionally a [`SpatialModel`] and an [`ExternalMultiplier`]
//!
//! # Timestep pipeline
//!
//! Each `step()` runs:
//! 1. **Resample** -- timestep-frequency distributions
//! 2. **Candidates** -- rebuild and shuffle every cell's candidate list
//! 3. **Order** -- shuffle primary groups, then sort by configured order
//! 4. **Groups** -- per group: compute target multipliers, then select at
//!    most one transition per cell (raster pass plus patch spread when
//!    spatial)
//! 5. **Deterministic** -- age cells, fire deterministic transitions,
//!    record state, advance TST counters
//!
//! Iterations never share state, so any iteration can be reproduced on its
//! own from the run seed.

use crate::ages::{UNBOUNDED, determine_target_age, determine_target_tst, initial_age, tst_in_window};
use crate::cell::{Cell, CellCollection, Tst};
use crate::distribution::{ResampleEvent, SampledValues};
use crate::error::{ConfigError, InvariantError, SimError};
use crate::event::{Event, EventBus, EventKind};
use crate::id::*;
use crate::multiplier::{ExternalMultiplier, Weight};
use crate::output::{OutputSink, TransitionRecord};
use crate::patch::{EligiblePatch, SizeQueue, TransitionPatch, prioritized_seeds};
use crate::rng::SimRng;
use crate::scenario::Scenario;
use crate::selector::{WeightTable, select_transition};
use crate::sim::{SimState, StateHash};
use crate::spatial::{LandscapeView, SpatialModel};
use crate::target::{Prioritized, TargetTracker, attribute_multiplier, rank_decisions, target_multiplier};
use crate::transition::Transition;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace};

// ---------------------------------------------------------------------------
// Stop handle
// ---------------------------------------------------------------------------

/// Requests that no further timestep or iteration be started. Cloneable, so
/// it can be moved into an event listener.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-rank accumulation for ranked prioritizations of one target.
#[derive(Debug, Default)]
struct RankTally {
    forced: f64,
    expected: f64,
    last_cell: Option<usize>,
    prioritizations: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Runs iterations of one scenario.
pub struct Simulation<'s> {
    pub(crate) scenario: &'s Scenario,

    /// Synchronous event bus. Register listeners before running.
    pub event_bus: EventBus,

    pub(crate) run_seed: u64,
    pub(crate) rng: SimRng,
    pub(crate) sim_state: SimState,

    /// Whether `begin_iteration` has run.
    pub(crate) started: bool,

    pub(crate) values: SampledValues,
    pub(crate) tracker: TargetTracker,
    pub(crate) cells: CellCollection,
    pub(crate) amount_per_cell: f64,

    pub(crate) spatial: Option<Box<dyn SpatialModel + 's>>,
    pub(crate) external: Option<Box<dyn ExternalMultiplier + 's>>,
    stop: StopHandle,

    /// Scratch buffer reused across cells.
    weights: WeightTable,
}

impl std::fmt::Debug for Simulation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("sim_state", &self.sim_state)
            .field("started", &self.started)
            .field("cells", &self.cells.len())
            .field("amount_per_cell", &self.amount_per_cell)
            .field("spatial", &self.spatial.is_some())
            .field("external", &self.external.is_some())
            .finish()
    }
}

impl<'s> Simulation<'s> {
    /// A non-spatial simulation of `scenario` seeded with `seed`.
    pub fn new(scenario: &'s Scenario, seed: u64) -> Self {
        let rc = scenario.run_control();
        Self {
            scenario,
            event_bus: EventBus::new(),
            run_seed: seed,
            rng: SimRng::for_iteration(seed, rc.min_iteration),
            sim_state: SimState::new(rc.min_iteration, rc.timestep_zero()),
            started: false,
            values: scenario.initial_samples(),
            tracker: TargetTracker::new(scenario.target_count(), scenario.attribute_target_count()),
            cells: CellCollection::new(),
            amount_per_cell: 0.0,
            spatial: None,
            external: None,
            stop: StopHandle::default(),
            weights: WeightTable::default(),
        }
    }

    pub fn with_spatial_model(mut self, model: Box<dyn SpatialModel + 's>) -> Self {
        self.spatial = Some(model);
        self
    }

    pub fn with_external_multiplier(mut self, external: Box<dyn ExternalMultiplier + 's>) -> Self {
        self.external = Some(external);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn scenario(&self) -> &'s Scenario {
        self.scenario
    }

    pub fn cells(&self) -> &CellCollection {
        &self.cells
    }

    pub fn sim_state(&self) -> SimState {
        self.sim_state
    }

    pub fn values(&self) -> &SampledValues {
        &self.values
    }

    pub fn tracker(&self) -> &TargetTracker {
        &self.tracker
    }

    pub fn amount_per_cell(&self) -> f64 {
        self.amount_per_cell
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    /// Hash of the clock, the cells and the RNG position.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_i32(self.sim_state.iteration);
        h.write_i32(self.sim_state.timestep);
        h.write_u64(self.cells.state_hash());
        h.write_u64(self.rng.state());
        h.finish()
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Run every iteration of the scenario.
    pub fn run(&mut self, sink: &mut dyn OutputSink) -> Result<(), SimError> {
        let rc = *self.scenario.run_control();
        info!(
            min_iteration = rc.min_iteration,
            max_iteration = rc.max_iteration,
            spatial = self.spatial.is_some(),
            "model run begin"
        );
        self.event_bus.emit(Event::BeginModelRun {
            min_iteration: rc.min_iteration,
            max_iteration: rc.max_iteration,
        });
        for iteration in rc.iterations() {
            if self.stop.is_stop_requested() {
                break;
            }
            self.run_iteration(iteration, sink)?;
        }
        self.event_bus.emit(Event::ModelRunComplete);
        info!("model run complete");
        Ok(())
    }

    /// Initialize one iteration and step it to the last timestep, or until
    /// a stop is requested.
    pub fn run_iteration(&mut self, iteration: i32, sink: &mut dyn OutputSink) -> Result<(), SimError> {
        self.begin_iteration(iteration, sink)?;
        let max_timestep = self.scenario.run_control().max_timestep;
        while self.sim_state.timestep < max_timestep {
            if self.stop.is_stop_requested() {
                debug!(iteration, timestep = self.sim_state.timestep, "stop requested");
                break;
            }
            self.step(sink)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Iteration setup
    // -----------------------------------------------------------------------

    /// Reset per-iteration state, build the initial cells and record the
    /// timestep-zero state.
    pub fn begin_iteration(&mut self, iteration: i32, sink: &mut dyn OutputSink) -> Result<(), SimError> {
        let scenario = self.scenario;
        let rc = scenario.run_control();
        let timestep_zero = rc.timestep_zero();

        self.started = false;
        self.rng = SimRng::for_iteration(self.run_seed, iteration);
        self.sim_state = SimState::new(iteration, timestep_zero);
        self.values = scenario.initial_samples();
        self.values.resample(
            scenario.values(),
            scenario.provider(),
            &mut self.rng,
            ResampleEvent::Iteration,
        );
        self.tracker = TargetTracker::new(scenario.target_count(), scenario.attribute_target_count());
        self.cells = CellCollection::new();

        match self.spatial.as_deref() {
            Some(model) => {
                self.amount_per_cell = model.cell_area();
                for init in model.initial_cells() {
                    if init.stratum == StratumId::NONE || init.state_class == StateClassId::NONE {
                        continue;
                    }
                    let window = scenario.age_window(init.stratum, init.state_class, iteration, timestep_zero);
                    let age = match init.age {
                        Some(age) => age,
                        None => initial_age(0, UNBOUNDED, window, &mut self.rng),
                    };
                    let mut cell = Cell::new(init.id, init.stratum, init.state_class, age);
                    cell.secondary_stratum = init.secondary_stratum;
                    cell.tertiary_stratum = init.tertiary_stratum;
                    self.cells.push(cell)?;
                }
            }
            None if rc.is_spatial => {
                return Err(ConfigError::MissingRequired {
                    table: "Run Control".into(),
                    detail: "a spatial run needs a spatial model".into(),
                }
                .into());
            }
            None => {
                let ic = scenario.initial_conditions().ok_or_else(|| ConfigError::MissingRequired {
                    table: "Initial Conditions Non Spatial".into(),
                    detail: "a non-spatial run needs initial conditions".into(),
                })?;
                self.amount_per_cell = ic.amount_per_cell();
                for i in 0..ic.num_cells {
                    let Some(row) = ic.pick_row(&mut self.rng) else {
                        break;
                    };
                    let window = scenario.age_window(row.stratum, row.state_class, iteration, timestep_zero);
                    let age = initial_age(row.age_min, row.age_max, window, &mut self.rng);
                    let mut cell = Cell::new(CellId(i as i32 + 1), row.stratum, row.state_class, age);
                    cell.secondary_stratum = row.secondary_stratum;
                    cell.tertiary_stratum = row.tertiary_stratum;
                    self.cells.push(cell)?;
                }
            }
        }

        if !(self.amount_per_cell > 0.0) {
            return Err(InvariantError::NonPositiveCellAmount(self.amount_per_cell).into());
        }

        let tracked = scenario.tst_tracked_groups();
        if !tracked.is_empty() {
            for cell in self.cells.iter_mut() {
                for &group in tracked {
                    let (lo, hi) = scenario.tst_initial_range(group, cell, iteration);
                    let value = if hi == UNBOUNDED {
                        lo
                    } else {
                        self.rng.next_in_range(lo, hi.saturating_add(1))
                    };
                    cell.tst.push(Tst { group, value });
                }
            }
        }

        self.cells.validate()?;
        self.started = true;
        debug!(iteration, cells = self.cells.len(), amount_per_cell = self.amount_per_cell, "iteration initialized");
        self.event_bus.emit(Event::CellsInitialized {
            iteration,
            cells: self.cells.len(),
        });

        for cell in self.cells.iter() {
            self.record_state(cell, timestep_zero, sink);
        }
        sink.end_timestep(iteration, timestep_zero);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timestep
    // -----------------------------------------------------------------------

    /// Advance the current iteration by one timestep.
    pub fn step(&mut self, sink: &mut dyn OutputSink) -> Result<(), SimError> {
        if !self.started {
            return Err(InvariantError::IterationNotStarted.into());
        }
        let scenario = self.scenario;
        let iteration = self.sim_state.iteration;
        let timestep = self.sim_state.timestep + 1;
        debug!(iteration, timestep, "timestep begin");

        self.values.resample(
            scenario.values(),
            scenario.provider(),
            &mut self.rng,
            ResampleEvent::Timestep,
        );
        self.reset_candidates(iteration, timestep);
        self.tracker.reset_timestep();
        self.tracker.reset_attribute_targets();

        if let Some(model) = self.spatial.as_deref_mut() {
            model.before_timestep(&LandscapeView {
                scenario,
                cells: &self.cells,
                values: &self.values,
                iteration,
                timestep,
            });
        }

        let groups = scenario.ordered_groups(iteration, timestep, &mut self.rng);

        if self.event_bus.wants(EventKind::CellBeforeTransitions) {
            for cell in self.cells.iter() {
                if scenario
                    .deterministic_for(cell.stratum, cell.state_class, iteration, timestep)
                    .is_some()
                {
                    self.event_bus.emit(Event::CellBeforeTransitions {
                        cell: cell.id,
                        iteration,
                        timestep,
                    });
                }
            }
        }

        for group in groups {
            trace!(iteration, timestep, group = %group, "processing group");
            self.begin_group(group, iteration, timestep);
            self.event_bus.emit(Event::ApplyingTransitionMultipliers {
                group,
                iteration,
                timestep,
            });
            if self.spatial.is_some() {
                self.event_bus
                    .emit(Event::ApplyingSpatialTransitions { iteration, timestep });
                self.apply_spatial_group(group, iteration, timestep, sink)?;
            } else {
                for index in 0..self.cells.len() {
                    self.apply_cell(index, group, 1.0, iteration, timestep, sink)?;
                }
            }
        }

        self.deterministic_pass(iteration, timestep, sink)?;
        self.sim_state.timestep = timestep;
        sink.end_timestep(iteration, timestep);
        Ok(())
    }

    /// Rebuild every cell's candidate list for a timestep.
    pub fn reset_candidates(&mut self, iteration: i32, timestep: i32) {
        for index in 0..self.cells.len() {
            self.fill_candidates(index, iteration, timestep);
        }
    }

    fn fill_candidates(&mut self, index: usize, iteration: i32, timestep: i32) {
        let scenario = self.scenario;
        let Some(cell) = self.cells.get(index) else {
            return;
        };
        let mut candidates: Vec<usize> = scenario
            .transitions_for(cell.stratum, cell.state_class, iteration, timestep)
            .iter()
            .copied()
            .filter(|&t| is_applicable(scenario, scenario.transition(t), cell))
            .collect();
        self.rng.shuffle(&mut candidates);
        if let Some(cell) = self.cells.get_mut(index) {
            cell.candidates = candidates;
        }
    }

    // -----------------------------------------------------------------------
    // Target multipliers
    // -----------------------------------------------------------------------

    /// Compute target multipliers and ranked prioritization effects for the
    /// targets a group's transitions can reach.
    fn begin_group(&mut self, group: TransitionGroupId, iteration: i32, timestep: i32) {
        let scenario = self.scenario;
        if scenario.target_count() == 0 {
            return;
        }
        let registry = scenario.registry();
        let mut expected: BTreeMap<usize, f64> = BTreeMap::new();
        let mut ranks: BTreeMap<usize, BTreeMap<u32, RankTally>> = BTreeMap::new();

        for (index, cell) in self.cells.iter().enumerate() {
            for &ti in cell.candidates() {
                let t = scenario.transition(ti);
                if registry.primary_group(t.transition_type) != Some(group) {
                    continue;
                }
                let amount = t.probability
                    * t.proportion
                    * self.base_multiplier(t.transition_type, cell, iteration, timestep)
                    * self.amount_per_cell;
                for &g in registry.groups_for_type(t.transition_type) {
                    let Some(target) = scenario.target_index(g, cell, iteration, timestep) else {
                        continue;
                    };
                    *expected.entry(target).or_default() += amount;
                    if let Some((pi, row)) = scenario.prioritization(g, cell, iteration, timestep)
                        && let Some(rank) = row.priority
                    {
                        let tally = ranks.entry(target).or_default().entry(rank).or_default();
                        if tally.last_cell != Some(index) {
                            tally.forced += self.amount_per_cell;
                            tally.last_cell = Some(index);
                        }
                        tally.expected += amount;
                        if !tally.prioritizations.contains(&pi) {
                            tally.prioritizations.push(pi);
                        }
                    }
                }
            }
        }

        for (target, expected) in expected {
            let remaining = self
                .tracker
                .touch(target, scenario.target_amount(target, &self.values));
            self.tracker
                .set_multiplier(target, target_multiplier(remaining, expected));
            if let Some(tallies) = ranks.get(&target) {
                let input: Vec<(u32, f64, f64)> = tallies
                    .iter()
                    .map(|(rank, t)| (*rank, t.forced, t.expected))
                    .collect();
                for (rank, effect) in rank_decisions(remaining.max(0.0), &input) {
                    if let Some(tally) = tallies.get(&rank) {
                        for &pi in &tally.prioritizations {
                            self.tracker.set_ranked(target, pi, effect);
                        }
                    }
                }
            }
            trace!(target, remaining, expected, "target multiplier");
        }
    }

    // -----------------------------------------------------------------------
    // Weights
    // -----------------------------------------------------------------------

    /// Temporal multiplier times the external transition multiplier.
    fn base_multiplier(&self, transition_type: TransitionTypeId, cell: &Cell, iteration: i32, timestep: i32) -> f64 {
        let mut m = self
            .scenario
            .temporal_multiplier(transition_type, cell, iteration, timestep, &self.values);
        if let Some(external) = self.external.as_deref() {
            m *= external.transition_multiplier(transition_type, cell, iteration, timestep);
        }
        m
    }

    /// Prioritization effect for a group on a cell covered by `target`. The
    /// flag is true for a ranked effect, which replaces the target
    /// multiplier instead of scaling it.
    fn prioritized(
        &self,
        group: TransitionGroupId,
        target: usize,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> Option<(Prioritized, bool)> {
        if !self.scenario.has_prioritizations(group) {
            return None;
        }
        let (index, row) = self.scenario.prioritization(group, cell, iteration, timestep)?;
        if row.priority.is_some()
            && let Some(effect) = self.tracker.ranked(target, index)
        {
            return Some((effect, true));
        }
        Some((row.effect(), false))
    }

    /// The full multiplier chain for one candidate.
    fn weigh(&self, ti: usize, cell: &Cell, iteration: i32, timestep: i32) -> Weight {
        let scenario = self.scenario;
        let registry = scenario.registry();
        let t = scenario.transition(ti);
        let groups = registry.groups_for_type(t.transition_type);

        let mut multiplier = self.base_multiplier(t.transition_type, cell, iteration, timestep);
        let mut force = false;

        for &g in groups {
            // Prioritizations only steer cells an enabled target covers.
            let Some(target) = scenario.target_index(g, cell, iteration, timestep) else {
                continue;
            };
            let target_factor = self.tracker.multiplier(target);
            match self.prioritized(g, target, cell, iteration, timestep) {
                Some((Prioritized::Force, _)) => force = true,
                Some((Prioritized::Suppress, _)) => multiplier = 0.0,
                Some((Prioritized::Scale(m), true)) => multiplier *= m,
                Some((Prioritized::Scale(m), false)) => multiplier *= target_factor * m,
                None => multiplier *= target_factor,
            }
        }

        if scenario.has_attribute_targets() {
            for &g in groups {
                for &attribute in scenario.transition_attribute_types(g) {
                    let Some(target) = scenario.attribute_target_index(attribute, cell, iteration, timestep) else {
                        continue;
                    };
                    if let Some(row) = scenario.attribute_prioritization(attribute, cell, iteration, timestep) {
                        match row.effect() {
                            Prioritized::Force => force = true,
                            Prioritized::Suppress => multiplier = 0.0,
                            Prioritized::Scale(m) => multiplier *= m,
                        }
                    }
                    let value = scenario
                        .transition_attribute_value(attribute, g, cell, iteration, timestep, &self.values)
                        .unwrap_or(0.0);
                    let remaining = self
                        .tracker
                        .attribute_remaining(target)
                        .unwrap_or_else(|| scenario.attribute_target_amount(target, &self.values));
                    multiplier *= attribute_multiplier(remaining, value * self.amount_per_cell);
                }
            }
        }

        if let Some(model) = self.spatial.as_deref() {
            for &g in groups {
                multiplier *= model.spatial_multiplier(g, cell, iteration, timestep)
                    * model.adjacency_multiplier(g, cell, iteration, timestep);
                if let Some(external) = self.external.as_deref() {
                    multiplier *= external.spatial_multiplier(g, cell, iteration, timestep);
                }
            }
        }

        Weight {
            value: t.probability * t.proportion * multiplier.max(0.0),
            force,
        }
    }

    // -----------------------------------------------------------------------
    // Selection and firing
    // -----------------------------------------------------------------------

    /// Select and fire at most one of a cell's candidates for a group.
    /// `initiation` scales every candidate's weight. Returns the fired
    /// transition.
    fn apply_cell(
        &mut self,
        index: usize,
        group: TransitionGroupId,
        initiation: f64,
        iteration: i32,
        timestep: i32,
        sink: &mut dyn OutputSink,
    ) -> Result<Option<usize>, SimError> {
        let scenario = self.scenario;
        let registry = scenario.registry();
        let Some(cell) = self.cells.get(index) else {
            return Ok(None);
        };

        let mut weights = std::mem::take(&mut self.weights);
        weights.clear();
        let mut candidates = Vec::new();
        for &ti in cell.candidates() {
            if registry.primary_group(scenario.transition(ti).transition_type) == Some(group) {
                let w = self.weigh(ti, cell, iteration, timestep);
                let w = Weight {
                    value: w.value * initiation,
                    force: w.force && initiation > 0.0,
                };
                weights.push(w, w.value);
                candidates.push(ti);
            }
        }
        let fired = if candidates.is_empty() {
            None
        } else {
            select_transition(&weights, &mut self.rng).fired()
        };
        self.weights = weights;

        let Some(k) = fired else {
            return Ok(None);
        };
        let ti = candidates[k];
        self.fire(index, ti, iteration, timestep, sink)?;
        Ok(Some(ti))
    }

    /// Apply a probabilistic transition to a cell: consume targets, record
    /// output, change state, age and TST, then refresh its candidates.
    fn fire(
        &mut self,
        index: usize,
        ti: usize,
        iteration: i32,
        timestep: i32,
        sink: &mut dyn OutputSink,
    ) -> Result<(), SimError> {
        let scenario = self.scenario;
        let registry = scenario.registry();
        let t = scenario.transition(ti);
        let amount = self.amount_per_cell;
        let Some(cell) = self.cells.get(index) else {
            return Ok(());
        };

        for &g in registry.groups_for_type(t.transition_type) {
            if let Some(target) = scenario.target_index(g, cell, iteration, timestep) {
                let initial = scenario.target_amount(target, &self.values);
                self.tracker.consume(target, amount, initial);
            }
            for &attribute in scenario.transition_attribute_types(g) {
                let Some(value) =
                    scenario.transition_attribute_value(attribute, g, cell, iteration, timestep, &self.values)
                else {
                    continue;
                };
                let total = value * amount;
                sink.record_transition_attribute(iteration, timestep, cell, attribute, total);
                if let Some(target) = scenario.attribute_target_index(attribute, cell, iteration, timestep) {
                    let initial = scenario.attribute_target_amount(target, &self.values);
                    self.tracker.consume_attribute(target, total, initial);
                }
            }
        }

        let id = cell.id;
        let from_stratum = cell.stratum;
        let from_class = cell.state_class;
        let to_stratum = t.stratum_dest.unwrap_or(from_stratum);
        let to_class = t.state_class_dest.unwrap_or(from_class);
        for &g in registry.groups_for_type(t.transition_type) {
            sink.record_transition(&TransitionRecord {
                iteration,
                timestep,
                cell: id,
                stratum: from_stratum,
                state_class: from_class,
                stratum_dest: to_stratum,
                state_class_dest: to_class,
                group: g,
                transition_type: t.transition_type,
                amount,
            });
        }
        let tst_groups = scenario.tst_groups_for(t.transition_type, cell);

        self.event_bus.emit(Event::ChangingCellProbabilistic {
            cell: id,
            transition_type: t.transition_type,
            from: from_class,
            to: to_class,
            iteration,
            timestep,
        });

        self.cells.set_stratum(index, to_stratum)?;
        let (age_min, age_max) = scenario
            .age_window(to_stratum, to_class, iteration, timestep)
            .unwrap_or((0, UNBOUNDED));
        if let Some(cell) = self.cells.get_mut(index) {
            cell.state_class = to_class;
            cell.age = determine_target_age(cell.age, t.age_reset, t.age_relative, age_min, age_max);
            for g in tst_groups {
                if let Some(tst) = cell.tst_mut(g) {
                    tst.value = determine_target_tst(tst.value, t.tst_relative, t.tst_min, t.tst_max);
                }
            }
        }
        self.fill_candidates(index, iteration, timestep);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Spatial pass
    // -----------------------------------------------------------------------

    /// Raster pass in seed order. Groups with a size distribution grow a
    /// patch from every cell that fires; cells that transitioned may then
    /// spread the transition a sampled distance away.
    fn apply_spatial_group(
        &mut self,
        group: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        sink: &mut dyn OutputSink,
    ) -> Result<(), SimError> {
        let scenario = self.scenario;
        let grows_patches = scenario.has_size_distribution(group);
        let order = self.seed_order(group, iteration, timestep);

        let mut claimed = vec![false; self.cells.len()];
        let mut sources = Vec::new();
        let mut queues: BTreeMap<usize, SizeQueue> = BTreeMap::new();
        let mut patches = 0usize;
        for index in order {
            if claimed[index] {
                continue;
            }
            let Some(cell) = self.cells.get(index) else {
                continue;
            };
            let (stratum, state_class) = (cell.stratum, cell.state_class);
            let target = scenario.target_index(group, cell, iteration, timestep);
            let initiation = self
                .spatial
                .as_deref()
                .map_or(1.0, |m| m.initiation_multiplier(group, cell, iteration, timestep));
            let Some(ti) = self.apply_cell(index, group, initiation, iteration, timestep, sink)? else {
                continue;
            };
            claimed[index] = true;
            let transition_type = scenario.transition(ti).transition_type;
            sources.push(SpreadSource {
                index,
                stratum,
                state_class,
                transition_type,
            });
            if !grows_patches {
                continue;
            }
            let Some(classes) = scenario.size_classes(group, stratum, iteration, timestep) else {
                continue;
            };

            let rule = scenario.size_prioritization(group, stratum, iteration, timestep);
            let queued = match (rule, target) {
                (Some(rule), Some(target)) => {
                    if !queues.contains_key(&target) {
                        // The seed has already drawn on the budget.
                        let budget = self
                            .tracker
                            .remaining(target)
                            .unwrap_or_else(|| scenario.target_amount(target, &self.values))
                            .max(0.0)
                            + self.amount_per_cell;
                        let queue = SizeQueue::draw(classes, budget, rule, &mut self.rng);
                        trace!(group = %group, target, sizes = queue.len(), "patch sizes drawn");
                        queues.insert(target, queue);
                    }
                    Some(target)
                }
                _ => None,
            };
            let max_area = match queued.and_then(|t| queues.get_mut(&t)) {
                Some(queue) => queue.next_size().unwrap_or(0.0),
                None => classes.sample(&mut self.rng),
            };

            let patch = TransitionPatch::new(index, transition_type, max_area, self.amount_per_cell);
            let area = self.grow_patch(patch, group, &mut claimed, &mut sources, iteration, timestep, sink)?;
            if let Some(queue) = queued.and_then(|t| queues.get_mut(&t)) {
                queue.settle(max_area, area);
            }
            patches += 1;
        }
        if grows_patches {
            trace!(group = %group, patches, "patch spread complete");
        }
        self.spread_pass(group, &sources, &mut claimed, iteration, timestep, sink)
    }

    /// Cell indices in the order they may seed a group. Shuffled, unless a
    /// patch prioritization ranks the connected patches of eligible cells.
    fn seed_order(&mut self, group: TransitionGroupId, iteration: i32, timestep: i32) -> Vec<usize> {
        let kind = self.scenario.patch_prioritization(group, iteration, timestep);
        let (Some(kind), Some(model)) = (kind, self.spatial.as_deref()) else {
            let mut order: Vec<usize> = (0..self.cells.len()).collect();
            self.rng.shuffle(&mut order);
            return order;
        };

        let scenario = self.scenario;
        let registry = scenario.registry();
        let eligible: Vec<bool> = (0..self.cells.len())
            .map(|i| {
                self.cells.get(i).is_some_and(|c| {
                    c.candidates()
                        .iter()
                        .any(|&ti| registry.primary_group(scenario.transition(ti).transition_type) == Some(group))
                })
            })
            .collect();

        let neighbours = |index: usize| -> Vec<usize> {
            self.cells.get(index).map_or_else(Vec::new, |c| {
                model
                    .neighbours(c.id)
                    .into_iter()
                    .filter_map(|id| self.cells.index_of(id))
                    .collect()
            })
        };

        let mut seen = vec![false; eligible.len()];
        let mut patches = Vec::new();
        for start in 0..eligible.len() {
            if !eligible[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            let mut cells = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(index) = queue.pop_front() {
                cells.push(index);
                for n in neighbours(index) {
                    if eligible[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            let edges = cells
                .iter()
                .copied()
                .filter(|&i| neighbours(i).into_iter().filter(|&n| eligible[n]).count() < model.neighbourhood_size())
                .collect();
            patches.push(EligiblePatch { cells, edges });
        }
        trace!(group = %group, ?kind, patches = patches.len(), "seed patches ranked");
        prioritized_seeds(patches, kind, &mut self.rng)
    }

    /// Grow a patch from its seed. Returns the area it reached.
    #[allow(clippy::too_many_arguments)]
    fn grow_patch(
        &mut self,
        mut patch: TransitionPatch,
        group: TransitionGroupId,
        claimed: &mut [bool],
        sources: &mut Vec<SpreadSource>,
        iteration: i32,
        timestep: i32,
        sink: &mut dyn OutputSink,
    ) -> Result<f64, SimError> {
        let scenario = self.scenario;
        let seed = patch.seed;
        self.offer_neighbours(&mut patch, seed, group, claimed, iteration, timestep);

        while !patch.is_full() {
            let Some(next) = patch.take_best() else {
                break;
            };
            if claimed[next] {
                continue;
            }
            let Some(cell) = self.cells.get(next) else {
                continue;
            };
            if let Some(target) = scenario.target_index(group, cell, iteration, timestep)
                && self.tracker.remaining(target).is_some_and(|r| r <= 0.0)
            {
                trace!(seed, target, "target exhausted, patch halted");
                break;
            }
            let Some(ti) = spread_candidate(scenario, cell, patch.transition_type) else {
                continue;
            };
            sources.push(SpreadSource {
                index: next,
                stratum: cell.stratum,
                state_class: cell.state_class,
                transition_type: patch.transition_type,
            });
            claimed[next] = true;
            self.fire(next, ti, iteration, timestep, sink)?;
            patch.add(next, self.amount_per_cell);
            self.offer_neighbours(&mut patch, next, group, claimed, iteration, timestep);
        }
        trace!(seed, area = patch.area(), cells = patch.cells().len(), "patch grown");
        Ok(patch.area())
    }

    /// Carry each transition a sampled distance in a random direction. A
    /// landing cell fires only if it is unclaimed and has a pathway for the
    /// same transition type; landings do not spread again.
    fn spread_pass(
        &mut self,
        group: TransitionGroupId,
        sources: &[SpreadSource],
        claimed: &mut [bool],
        iteration: i32,
        timestep: i32,
        sink: &mut dyn OutputSink,
    ) -> Result<(), SimError> {
        let scenario = self.scenario;
        let mut landed = 0usize;
        for source in sources {
            let Some(classes) =
                scenario.spread_classes(group, source.stratum, source.state_class, iteration, timestep)
            else {
                continue;
            };
            let distance = classes.sample(&mut self.rng);
            let angle = self.rng.next_f64() * std::f64::consts::TAU;
            let (Some(model), Some(from)) = (self.spatial.as_deref(), self.cells.get(source.index)) else {
                continue;
            };
            let Some(index) = model
                .cell_at_distance(from.id, distance, angle)
                .and_then(|id| self.cells.index_of(id))
            else {
                continue;
            };
            if claimed[index] {
                continue;
            }
            let Some(cell) = self.cells.get(index) else {
                continue;
            };
            if let Some(target) = scenario.target_index(group, cell, iteration, timestep)
                && self.tracker.remaining(target).is_some_and(|r| r <= 0.0)
            {
                continue;
            }
            let Some(ti) = spread_candidate(scenario, cell, source.transition_type) else {
                continue;
            };
            claimed[index] = true;
            self.fire(index, ti, iteration, timestep, sink)?;
            landed += 1;
        }
        if landed > 0 {
            trace!(group = %group, landed, "distance spread complete");
        }
        Ok(())
    }

    /// Offer the unclaimed neighbours of `from` to a patch's frontier.
    fn offer_neighbours(
        &self,
        patch: &mut TransitionPatch,
        from: usize,
        group: TransitionGroupId,
        claimed: &[bool],
        iteration: i32,
        timestep: i32,
    ) {
        let Some(model) = self.spatial.as_deref() else {
            return;
        };
        let Some(from_cell) = self.cells.get(from) else {
            return;
        };
        for id in model.neighbours(from_cell.id) {
            let Some(index) = self.cells.index_of(id) else {
                continue;
            };
            if claimed[index] {
                continue;
            }
            let Some(cell) = self.cells.get(index) else {
                continue;
            };
            let Some(ti) = spread_candidate(self.scenario, cell, patch.transition_type) else {
                continue;
            };
            let w = self.weigh(ti, cell, iteration, timestep);
            let base = if w.force { w.value.max(1.0) } else { w.value };
            let weight = base * model.spread_multiplier(group, from_cell, cell, iteration, timestep);
            patch.offer(index, weight);
        }
    }

    // -----------------------------------------------------------------------
    // Deterministic pass
    // -----------------------------------------------------------------------

    fn deterministic_pass(&mut self, iteration: i32, timestep: i32, sink: &mut dyn OutputSink) -> Result<(), SimError> {
        let scenario = self.scenario;
        for index in 0..self.cells.len() {
            let Some(cell) = self.cells.get(index) else {
                continue;
            };
            let dt = scenario.deterministic_for(cell.stratum, cell.state_class, iteration, timestep);
            if let Some(dt) = dt {
                self.event_bus.emit(Event::ChangingCellDeterministic {
                    cell: cell.id,
                    from: cell.state_class,
                    to: dt.state_class_dest,
                    iteration,
                    timestep,
                });
            }
            match dt {
                // A self-loop at its maximum holds the cell where it is.
                Some(dt) if cell.age >= dt.age_max => {
                    if !dt.is_self_loop() {
                        let to_stratum = dt.stratum_dest.unwrap_or(cell.stratum);
                        let to_class = dt.state_class_dest;
                        let age = scenario
                            .age_window(to_stratum, to_class, iteration, timestep)
                            .map_or(0, |(lo, _)| lo);
                        self.cells.set_stratum(index, to_stratum)?;
                        if let Some(cell) = self.cells.get_mut(index) {
                            cell.state_class = to_class;
                            cell.age = age;
                        }
                    }
                }
                _ => {
                    if let Some(cell) = self.cells.get_mut(index) {
                        cell.age = cell.age.saturating_add(1);
                    }
                }
            }

            if let Some(cell) = self.cells.get(index) {
                self.record_state(cell, timestep, sink);
            }
            if let Some(cell) = self.cells.get_mut(index) {
                for tst in &mut cell.tst {
                    tst.value = tst.value.saturating_add(1);
                }
            }
        }
        Ok(())
    }

    fn record_state(&self, cell: &Cell, timestep: i32, sink: &mut dyn OutputSink) {
        let iteration = self.sim_state.iteration;
        sink.record_state(iteration, timestep, cell, self.amount_per_cell);
        for &attribute in self.scenario.state_attribute_types() {
            if let Some(value) =
                self.scenario
                    .state_attribute_value(attribute, cell, iteration, timestep, &self.values)
            {
                sink.record_state_attribute(iteration, timestep, cell, attribute, value * self.amount_per_cell);
            }
        }
    }
}

/// Age and TST applicability of a pathway for a cell. A missing TST
/// counter does not constrain.
fn is_applicable(scenario: &Scenario, t: &Transition, cell: &Cell) -> bool {
    if cell.age < t.age_min || cell.age > t.age_max {
        return false;
    }
    if t.tst_min.is_none() && t.tst_max.is_none() {
        return true;
    }
    scenario
        .tst_groups_for(t.transition_type, cell)
        .iter()
        .all(|&g| cell.tst_value(g).is_none_or(|v| tst_in_window(v, t.tst_min, t.tst_max)))
}

/// A cell that transitioned during a spatial group pass, as it was before
/// the transition.
#[derive(Debug, Clone, Copy)]
struct SpreadSource {
    index: usize,
    stratum: StratumId,
    state_class: StateClassId,
    transition_type: TransitionTypeId,
}

/// First candidate of a cell with the patch's transition type.
fn spread_candidate(scenario: &Scenario, cell: &Cell, transition_type: TransitionTypeId) -> Option<usize> {
    cell.candidates()
        .iter()
        .copied()
        .find(|&t| scenario.transition(t).transition_type == transition_type)
}

// ---------------------------------------------------------------------------
// Parallel iterations
// ---------------------------------------------------------------------------

/// Run every iteration on the rayon pool, one sink per iteration. Results
/// are in iteration order and match a sequential run with the same seed.
#[cfg(feature = "parallel")]
pub fn run_iterations_parallel<S, F>(scenario: &Scenario, seed: u64, make_sink: F) -> Result<Vec<S>, SimError>
where
    S: OutputSink + Send,
    F: Fn(i32) -> S + Sync,
{
    use rayon::prelude::*;

    let iterations: Vec<i32> = scenario.run_control().iterations().collect();
    iterations
        .into_par_iter()
        .map(|iteration| {
            let mut sim = Simulation::new(scenario, seed);
            let mut sink = make_sink(iteration);
            sim.run_iteration(iteration, &mut sink)?;
            Ok(sink)
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{NullSink, SummaryCollector};
    use crate::patch::{
        PatchPrioritizationKind, SizePriority, TransitionPatchPrioritization, TransitionSizeDistribution,
        TransitionSizePrioritization, TransitionSpreadDistribution,
    };
    use crate::target::{TransitionTarget, TransitionTargetPrioritization};
    use crate::test_utils::*;
    use crate::transition::DeterministicTransition;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fire_count(sim: &mut Simulation<'_>) -> Rc<RefCell<Vec<CellId>>> {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let f = fired.clone();
        sim.event_bus.subscribe(
            EventKind::ChangingCellProbabilistic,
            Box::new(move |e| {
                if let Event::ChangingCellProbabilistic { cell, .. } = e {
                    f.borrow_mut().push(*cell);
                }
            }),
        );
        fired
    }

    #[test]
    fn certain_transition_changes_state_class() {
        let mut b = make_builder(1, 1);
        b.add_transition(fire(1.0));
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 42);
        sim.run_iteration(1, &mut NullSink).unwrap();
        let cell = sim.cells().get(0).unwrap();
        assert_eq!(cell.state_class, OLD);
        assert_eq!(sim.sim_state().timestep, 1);
    }

    #[test]
    fn step_before_iteration_is_invariant_error() {
        let scenario = make_builder(1, 1).build().unwrap();
        let mut sim = Simulation::new(&scenario, 1);
        let err = sim.step(&mut NullSink).unwrap_err();
        assert_eq!(err, SimError::Invariant(InvariantError::IterationNotStarted));
    }

    #[test]
    fn cells_never_have_zero_ids() {
        let scenario = make_builder(50, 1).build().unwrap();
        let mut sim = Simulation::new(&scenario, 3);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        assert_eq!(sim.cells().len(), 50);
        for cell in sim.cells().iter() {
            assert_ne!(cell.stratum, StratumId::NONE);
            assert_ne!(cell.state_class, StateClassId::NONE);
        }
    }

    #[test]
    fn suppressing_prioritization_blocks_every_draw() {
        let mut b = make_builder(1000, 1);
        b.add_transition(fire(1.0));
        b.add_target(TransitionTarget::new(FIRE_GROUP, 1000.0));
        let mut p = TransitionTargetPrioritization::new(FIRE_GROUP);
        p.probability_override = Some(0.0);
        b.add_prioritization(p);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 9);
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        assert!(fired.borrow().is_empty());
    }

    #[test]
    fn forcing_prioritization_fires_every_cell() {
        let mut b = make_builder(50, 1);
        b.add_transition(fire(0.01));
        b.add_target(TransitionTarget::new(FIRE_GROUP, 1000.0));
        let mut p = TransitionTargetPrioritization::new(FIRE_GROUP);
        p.probability_override = Some(1.0);
        b.add_prioritization(p);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 5);
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        assert_eq!(fired.borrow().len(), 50);
    }

    #[test]
    fn prioritization_without_target_is_ignored() {
        let mut b = make_builder(100, 1);
        b.add_transition(fire(0.01));
        let mut p = TransitionTargetPrioritization::new(FIRE_GROUP);
        p.probability_override = Some(1.0);
        b.add_prioritization(p);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 5);
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        assert!(fired.borrow().len() < 20, "{} of 100 fired", fired.borrow().len());
    }

    #[test]
    fn target_caps_transitioned_area() {
        let mut b = make_builder(100, 1);
        b.add_transition(fire(1.0));
        b.add_target(TransitionTarget::new(FIRE_GROUP, 10.0));
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 11);
        let mut summary = SummaryCollector::new();
        sim.run_iteration(1, &mut summary).unwrap();
        let burned = summary.transition_amount(1, 1, FIRE_GROUP);
        assert!(burned > 0.0);
        assert!(burned <= 10.0);
        let target = scenario.target_index(FIRE_GROUP, sim.cells().get(0).unwrap(), 1, 1).unwrap();
        assert!(sim.tracker().remaining(target).unwrap() >= 0.0);
    }

    #[test]
    fn one_transition_per_cell_and_group() {
        let mut b = make_builder(200, 3);
        b.add_transition(fire(0.6));
        b.add_transition(regrow(0.6));
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 21);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        sim.event_bus.subscribe(
            EventKind::ChangingCellProbabilistic,
            Box::new(move |e| {
                if let Event::ChangingCellProbabilistic {
                    cell,
                    transition_type,
                    timestep,
                    ..
                } = e
                {
                    s.borrow_mut().push((*cell, *transition_type, *timestep));
                }
            }),
        );
        sim.run_iteration(1, &mut NullSink).unwrap();
        let mut log = seen.borrow().clone();
        let total = log.len();
        assert!(total > 0);
        log.sort();
        log.dedup();
        assert_eq!(log.len(), total);
    }

    #[test]
    fn deterministic_transition_after_age_window() {
        let mut b = make_builder(10, 3);
        let mut dt = DeterministicTransition::new(YOUNG);
        dt.state_class_dest = OLD;
        dt.age_max = 2;
        b.add_deterministic(dt);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 2);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        assert!(sim.cells().iter().all(|c| c.age == 0));
        sim.step(&mut NullSink).unwrap();
        sim.step(&mut NullSink).unwrap();
        assert!(sim.cells().iter().all(|c| c.state_class == YOUNG && c.age == 2));
        sim.step(&mut NullSink).unwrap();
        assert!(sim.cells().iter().all(|c| c.state_class == OLD && c.age == 0));
    }

    #[test]
    fn self_loop_holds_age_at_maximum() {
        let mut b = make_builder(1, 6);
        let mut dt = DeterministicTransition::new(YOUNG);
        dt.age_max = 2;
        b.add_deterministic(dt);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 3);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        let mut ages = Vec::new();
        for _ in 0..6 {
            sim.step(&mut NullSink).unwrap();
            ages.push(sim.cells().get(0).unwrap().age);
        }
        assert_eq!(ages, vec![1, 2, 2, 2, 2, 2]);
        assert_eq!(sim.cells().get(0).unwrap().state_class, YOUNG);
    }

    #[test]
    fn deterministic_event_for_every_cell_with_a_pathway() {
        let mut b = make_builder(4, 1);
        let mut dt = DeterministicTransition::new(YOUNG);
        dt.state_class_dest = OLD;
        dt.age_max = 50;
        b.add_deterministic(dt);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 8);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        sim.event_bus.subscribe(
            EventKind::ChangingCellDeterministic,
            Box::new(move |e| {
                if let Event::ChangingCellDeterministic { cell, from, to, .. } = e {
                    s.borrow_mut().push((*cell, *from, *to));
                }
            }),
        );
        sim.run_iteration(1, &mut NullSink).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|&(_, from, to)| from == YOUNG && to == OLD));
        assert!(sim.cells().iter().all(|c| c.state_class == YOUNG && c.age == 1));
    }

    #[test]
    fn reset_candidates_is_stable_as_a_set() {
        let mut b = make_builder(5, 1);
        b.add_transition(fire(0.1));
        b.add_transition(regrow(0.1));
        let mut harvest = fire(0.2);
        harvest.transition_type = HARVEST;
        b.add_transition(harvest);
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 8);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        sim.reset_candidates(1, 1);
        let first: Vec<Vec<usize>> = sim
            .cells()
            .iter()
            .map(|c| {
                let mut v = c.candidates().to_vec();
                v.sort();
                v
            })
            .collect();
        sim.reset_candidates(1, 1);
        let second: Vec<Vec<usize>> = sim
            .cells()
            .iter()
            .map(|c| {
                let mut v = c.candidates().to_vec();
                v.sort();
                v
            })
            .collect();
        assert_eq!(first, second);
        assert_eq!(first[0], vec![0, 2]);
    }

    #[test]
    fn tst_resets_on_fire_and_counts_up() {
        let mut b = make_builder(1, 2);
        b.add_transition(fire(1.0));
        b.add_transition(regrow(0.0));
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 4);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        assert_eq!(sim.cells().get(0).unwrap().tst_value(FIRE_GROUP), Some(0));
        sim.step(&mut NullSink).unwrap();
        // Reset to 0 on fire, then incremented after output.
        assert_eq!(sim.cells().get(0).unwrap().tst_value(FIRE_GROUP), Some(1));
        sim.step(&mut NullSink).unwrap();
        assert_eq!(sim.cells().get(0).unwrap().tst_value(FIRE_GROUP), Some(2));
    }

    #[test]
    fn stop_request_prevents_next_timestep() {
        let mut b = make_builder(3, 10);
        b.add_transition(fire(0.5));
        let scenario = b.build().unwrap();
        let mut sim = Simulation::new(&scenario, 1);
        let stop = sim.stop_handle();
        sim.event_bus.subscribe(
            EventKind::CellsInitialized,
            Box::new(move |_| stop.request_stop()),
        );
        sim.run(&mut NullSink).unwrap();
        assert_eq!(sim.sim_state().timestep, 0);
    }

    #[test]
    fn same_seed_same_hash() {
        let mut b = make_builder(100, 5);
        b.add_transition(fire(0.3));
        b.add_transition(regrow(0.2));
        let scenario = b.build().unwrap();
        let mut a = Simulation::new(&scenario, 77);
        let mut c = Simulation::new(&scenario, 77);
        a.run_iteration(1, &mut NullSink).unwrap();
        c.run_iteration(1, &mut NullSink).unwrap();
        assert_eq!(a.state_hash(), c.state_hash());

        let mut d = Simulation::new(&scenario, 78);
        d.run_iteration(1, &mut NullSink).unwrap();
        assert_ne!(a.state_hash(), d.state_hash());
    }

    #[test]
    fn timestep_zero_state_recorded() {
        let scenario = make_builder(4, 2).build().unwrap();
        let mut sim = Simulation::new(&scenario, 1);
        let mut summary = SummaryCollector::new();
        sim.run_iteration(1, &mut summary).unwrap();
        assert_eq!(summary.state_amount(1, 0, YOUNG), 4.0);
        assert_eq!(summary.state_amount(1, 2, YOUNG), 4.0);
        assert_eq!(summary.timesteps_completed, 3);
    }

    #[test]
    fn patch_grows_to_sampled_size() {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1e-12));
        let mut seed = fire(1.0);
        seed.stratum_source = Some(BURN_STRATUM);
        b.add_transition(seed);
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 4.0, 0.0));
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 5.0, 1.0));
        let scenario = b.build().unwrap();

        let mut grid = GridModel::uniform(5, 5, FOREST, YOUNG);
        grid.set_stratum(2, 2, BURN_STRATUM);
        let mut sim = Simulation::new(&scenario, 6).with_spatial_model(Box::new(grid));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();

        let fired = fired.borrow();
        assert_eq!(fired.len(), 5);
        assert!(fired.contains(&CellId(13)));
    }

    #[test]
    fn edge_prioritization_skips_interior_seeds() {
        let mut b = make_spatial_builder(1);
        let mut seed = fire(1.0);
        seed.stratum_source = Some(BURN_STRATUM);
        b.add_transition(seed);
        b.add_patch_prioritization(TransitionPatchPrioritization::new(
            FIRE_GROUP,
            PatchPrioritizationKind::LargestEdgesOnly,
        ));
        let scenario = b.build().unwrap();

        let mut grid = GridModel::uniform(5, 5, FOREST, YOUNG);
        for r in 1..4 {
            for c in 1..4 {
                grid.set_stratum(r, c, BURN_STRATUM);
            }
        }
        let mut sim = Simulation::new(&scenario, 3).with_spatial_model(Box::new(grid));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();

        let fired = fired.borrow();
        assert_eq!(fired.len(), 8);
        assert!(!fired.contains(&CellId(13)));
    }

    #[test]
    fn initiation_multiplier_gates_seeds_only() {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1.0));
        let scenario = b.build().unwrap();
        let mut grid = GridModel::uniform(1, 3, FOREST, YOUNG);
        grid.set_initiation(0, 1, 0.0);
        let mut sim = Simulation::new(&scenario, 8).with_spatial_model(Box::new(grid.clone()));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        let mut seeded = fired.borrow().clone();
        seeded.sort();
        assert_eq!(seeded, vec![CellId(1), CellId(3)]);

        // A patch still grows through the blocked cell.
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1.0));
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 2.0, 0.0));
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 3.0, 1.0));
        let scenario = b.build().unwrap();
        grid.set_initiation(0, 0, 0.0);
        grid.set_initiation(0, 2, 1.0);
        let mut sim = Simulation::new(&scenario, 8).with_spatial_model(Box::new(grid));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        assert_eq!(fired.borrow().len(), 3);
    }

    #[test]
    fn spread_distribution_carries_transition_away() {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1e-12));
        let mut seed = fire(1.0);
        seed.stratum_source = Some(BURN_STRATUM);
        b.add_transition(seed);
        b.add_spread_distribution(TransitionSpreadDistribution::new(FIRE_GROUP, YOUNG, 1.9, 0.0));
        b.add_spread_distribution(TransitionSpreadDistribution::new(FIRE_GROUP, YOUNG, 2.0, 1.0));
        let scenario = b.build().unwrap();

        let mut grid = GridModel::uniform(5, 5, FOREST, YOUNG);
        grid.set_stratum(2, 2, BURN_STRATUM);
        let mut sim = Simulation::new(&scenario, 21).with_spatial_model(Box::new(grid));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();

        let fired = fired.borrow();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0], CellId(13));
        let landed = fired[1].0 - 1;
        let (row, col) = (landed / 5, landed % 5);
        assert!((row - 2).abs().max((col - 2).abs()) >= 1);
    }

    /// A burn cell seeds a patch into forest the target does not cover.
    fn burn_patch_size(rule: Option<TransitionSizePrioritization>) -> usize {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1e-12));
        let mut seed = fire(1.0);
        seed.stratum_source = Some(BURN_STRATUM);
        b.add_transition(seed);
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 9.0, 0.0));
        b.add_size_distribution(TransitionSizeDistribution::new(FIRE_GROUP, 10.0, 1.0));
        let mut target = TransitionTarget::new(FIRE_GROUP, 3.0);
        target.stratum = Some(BURN_STRATUM);
        b.add_target(target);
        if let Some(rule) = rule {
            b.add_size_prioritization(rule);
        }
        let scenario = b.build().unwrap();

        let mut grid = GridModel::uniform(1, 10, FOREST, YOUNG);
        grid.set_stratum(0, 0, BURN_STRATUM);
        let mut sim = Simulation::new(&scenario, 4).with_spatial_model(Box::new(grid));
        let fired = fire_count(&mut sim);
        sim.run_iteration(1, &mut NullSink).unwrap();
        fired.borrow().len()
    }

    #[test]
    fn size_prioritization_draws_sizes_against_target() {
        assert_eq!(burn_patch_size(None), 10);

        let mut rule = TransitionSizePrioritization::new(SizePriority::Largest);
        rule.maximize_fidelity_to_total_area = true;
        assert_eq!(burn_patch_size(Some(rule)), 3);
    }

    #[test]
    fn spatial_run_without_model_is_config_error() {
        let scenario = make_spatial_builder(1).build().unwrap();
        let mut sim = Simulation::new(&scenario, 1);
        assert!(matches!(
            sim.begin_iteration(1, &mut NullSink),
            Err(SimError::Config(ConfigError::MissingRequired { .. }))
        ));
    }
}
