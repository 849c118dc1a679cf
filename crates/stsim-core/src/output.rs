//! Output sinks.
//!
//! The driver emits raw records; formatting and persistence belong to the
//! sink. [`SummaryCollector`] is an in-memory sink that aggregates amounts
//! the way summary output tables do.

use crate::cell::Cell;
use crate::id::*;
use std::collections::BTreeMap;

/// A fired transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRecord {
    pub iteration: i32,
    pub timestep: i32,
    pub cell: CellId,
    /// Stratum and state class before the change.
    pub stratum: StratumId,
    pub state_class: StateClassId,
    pub stratum_dest: StratumId,
    pub state_class_dest: StateClassId,
    /// One record is emitted per group of the transition type.
    pub group: TransitionGroupId,
    pub transition_type: TransitionTypeId,
    pub amount: f64,
}

/// Receives simulation output. Every method defaults to a no-op.
pub trait OutputSink {
    /// A cell's state after the deterministic pass, before TST counters
    /// advance. Also called once per cell at timestep zero.
    fn record_state(&mut self, _iteration: i32, _timestep: i32, _cell: &Cell, _amount: f64) {}

    fn record_transition(&mut self, _record: &TransitionRecord) {}

    fn record_state_attribute(
        &mut self,
        _iteration: i32,
        _timestep: i32,
        _cell: &Cell,
        _attribute: AttributeTypeId,
        _amount: f64,
    ) {
    }

    fn record_transition_attribute(
        &mut self,
        _iteration: i32,
        _timestep: i32,
        _cell: &Cell,
        _attribute: AttributeTypeId,
        _amount: f64,
    ) {
    }

    fn end_timestep(&mut self, _iteration: i32, _timestep: i32) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {}

pub type StateKey = (i32, i32, StratumId, StateClassId);
pub type TransitionKey = (i32, i32, StratumId, TransitionGroupId, TransitionTypeId);
pub type AttributeKey = (i32, i32, StratumId, AttributeTypeId);

/// Aggregates amounts by iteration, timestep and stratum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryCollector {
    pub states: BTreeMap<StateKey, f64>,
    pub transitions: BTreeMap<TransitionKey, f64>,
    pub state_attributes: BTreeMap<AttributeKey, f64>,
    pub transition_attributes: BTreeMap<AttributeKey, f64>,
    pub timesteps_completed: usize,
}

impl SummaryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total state amount for a timestep and state class, across strata.
    pub fn state_amount(&self, iteration: i32, timestep: i32, state_class: StateClassId) -> f64 {
        self.states
            .iter()
            .filter(|((it, ts, _, sc), _)| *it == iteration && *ts == timestep && *sc == state_class)
            .map(|(_, v)| v)
            .sum()
    }

    /// Total transitioned amount for a timestep and group, across strata.
    pub fn transition_amount(&self, iteration: i32, timestep: i32, group: TransitionGroupId) -> f64 {
        self.transitions
            .iter()
            .filter(|((it, ts, _, g, _), _)| *it == iteration && *ts == timestep && *g == group)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn transition_attribute_amount(&self, iteration: i32, timestep: i32, attribute: AttributeTypeId) -> f64 {
        self.transition_attributes
            .iter()
            .filter(|((it, ts, _, a), _)| *it == iteration && *ts == timestep && *a == attribute)
            .map(|(_, v)| v)
            .sum()
    }
}

impl OutputSink for SummaryCollector {
    fn record_state(&mut self, iteration: i32, timestep: i32, cell: &Cell, amount: f64) {
        *self
            .states
            .entry((iteration, timestep, cell.stratum, cell.state_class))
            .or_default() += amount;
    }

    fn record_transition(&mut self, r: &TransitionRecord) {
        *self
            .transitions
            .entry((r.iteration, r.timestep, r.stratum, r.group, r.transition_type))
            .or_default() += r.amount;
    }

    fn record_state_attribute(
        &mut self,
        iteration: i32,
        timestep: i32,
        cell: &Cell,
        attribute: AttributeTypeId,
        amount: f64,
    ) {
        *self
            .state_attributes
            .entry((iteration, timestep, cell.stratum, attribute))
            .or_default() += amount;
    }

    fn record_transition_attribute(
        &mut self,
        iteration: i32,
        timestep: i32,
        cell: &Cell,
        attribute: AttributeTypeId,
        amount: f64,
    ) {
        *self
            .transition_attributes
            .entry((iteration, timestep, cell.stratum, attribute))
            .or_default() += amount;
    }

    fn end_timestep(&mut self, _iteration: i32, _timestep: i32) {
        self.timesteps_completed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_sums_by_state_class() {
        let mut c = SummaryCollector::new();
        let a = Cell::new(CellId(1), StratumId(1), StateClassId(2), 0);
        let b = Cell::new(CellId(2), StratumId(3), StateClassId(2), 0);
        c.record_state(1, 0, &a, 1.5);
        c.record_state(1, 0, &b, 2.0);
        c.record_state(1, 1, &b, 9.0);
        assert_eq!(c.state_amount(1, 0, StateClassId(2)), 3.5);
        assert_eq!(c.states.len(), 3);
    }

    #[test]
    fn collector_sums_transitions_by_group() {
        let mut c = SummaryCollector::new();
        let r = TransitionRecord {
            iteration: 1,
            timestep: 1,
            cell: CellId(1),
            stratum: StratumId(1),
            state_class: StateClassId(1),
            stratum_dest: StratumId(1),
            state_class_dest: StateClassId(2),
            group: TransitionGroupId(4),
            transition_type: TransitionTypeId(1),
            amount: 1.0,
        };
        c.record_transition(&r);
        c.record_transition(&r);
        assert_eq!(c.transition_amount(1, 1, TransitionGroupId(4)), 2.0);
        assert_eq!(c.transition_amount(1, 2, TransitionGroupId(4)), 0.0);
    }
}
