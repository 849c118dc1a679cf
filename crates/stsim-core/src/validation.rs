//! State comparison and determinism checking.
//!
//! Two simulations of the same scenario with the same seed must produce
//! identical cells timestep by timestep. These helpers find where they
//! don't.

use crate::cell::Cell;
use crate::engine::Simulation;
use crate::error::SimError;
use crate::id::CellId;
use crate::output::NullSink;
use crate::scenario::Scenario;
use crate::serialize::DeserializeError;

// ---------------------------------------------------------------------------
// State diff types
// ---------------------------------------------------------------------------

/// Difference between two simulations at the cell level.
#[derive(Debug, Clone, PartialEq)]
pub enum CellDiff {
    OnlyInA(CellId),
    OnlyInB(CellId),
    /// Cell exists in both but differs in the named fields.
    StateMismatch { cell: CellId, description: String },
}

#[derive(Debug, Clone)]
pub struct StateDiff {
    pub is_identical: bool,
    pub sim_state_matches: bool,
    /// Full state hashes, which also cover the RNG position.
    pub hashes_match: bool,
    pub cell_diffs: Vec<CellDiff>,
}

/// Compare two simulations cell by cell.
pub fn diff_simulations(a: &Simulation<'_>, b: &Simulation<'_>) -> StateDiff {
    let mut cell_diffs = Vec::new();

    for cell in a.cells().iter() {
        match b.cells().index_of(cell.id).and_then(|i| b.cells().get(i)) {
            None => cell_diffs.push(CellDiff::OnlyInA(cell.id)),
            Some(other) => {
                let mismatches = cell_mismatches(cell, other);
                if !mismatches.is_empty() {
                    cell_diffs.push(CellDiff::StateMismatch {
                        cell: cell.id,
                        description: mismatches.join(", "),
                    });
                }
            }
        }
    }
    for cell in b.cells().iter() {
        if a.cells().index_of(cell.id).is_none() {
            cell_diffs.push(CellDiff::OnlyInB(cell.id));
        }
    }

    let sim_state_matches = a.sim_state() == b.sim_state();
    let hashes_match = a.state_hash() == b.state_hash();
    StateDiff {
        is_identical: cell_diffs.is_empty() && sim_state_matches && hashes_match,
        sim_state_matches,
        hashes_match,
        cell_diffs,
    }
}

fn cell_mismatches(a: &Cell, b: &Cell) -> Vec<&'static str> {
    let mut out = Vec::new();
    if a.stratum != b.stratum
        || a.secondary_stratum != b.secondary_stratum
        || a.tertiary_stratum != b.tertiary_stratum
    {
        out.push("stratum");
    }
    if a.state_class != b.state_class {
        out.push("state_class");
    }
    if a.age != b.age {
        out.push("age");
    }
    if a.tst != b.tst {
        out.push("tst");
    }
    out
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeterminismError {
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// First timestep at which the runs diverged.
    pub divergence_timestep: Option<i32>,
    /// (timestep, hash of run A, hash of run B) for every timestep,
    /// starting with timestep zero.
    pub hash_log: Vec<(i32, u64, u64)>,
}

impl DeterminismResult {
    fn from_log(hash_log: Vec<(i32, u64, u64)>) -> Self {
        let divergence_timestep = hash_log.iter().find(|(_, a, b)| a != b).map(|(ts, _, _)| *ts);
        Self {
            is_deterministic: divergence_timestep.is_none(),
            divergence_timestep,
            hash_log,
        }
    }
}

fn step_pair(
    a: &mut Simulation<'_>,
    b: &mut Simulation<'_>,
    max_timestep: i32,
    hash_log: &mut Vec<(i32, u64, u64)>,
) -> Result<(), SimError> {
    hash_log.push((a.sim_state().timestep, a.state_hash(), b.state_hash()));
    while a.sim_state().timestep < max_timestep {
        a.step(&mut NullSink)?;
        b.step(&mut NullSink)?;
        hash_log.push((a.sim_state().timestep, a.state_hash(), b.state_hash()));
    }
    Ok(())
}

/// Run one iteration twice from scratch with the same seed and compare
/// state hashes after every timestep.
pub fn validate_determinism(scenario: &Scenario, seed: u64, iteration: i32) -> Result<DeterminismResult, SimError> {
    let mut a = Simulation::new(scenario, seed);
    let mut b = Simulation::new(scenario, seed);
    a.begin_iteration(iteration, &mut NullSink)?;
    b.begin_iteration(iteration, &mut NullSink)?;

    let mut hash_log = Vec::new();
    step_pair(&mut a, &mut b, scenario.run_control().max_timestep, &mut hash_log)?;
    Ok(DeterminismResult::from_log(hash_log))
}

/// Restore a snapshot twice and step both copies `timesteps` times.
pub fn validate_snapshot_determinism(
    scenario: &Scenario,
    snapshot_data: &[u8],
    timesteps: i32,
) -> Result<DeterminismResult, DeterminismError> {
    let mut a = Simulation::new(scenario, 0);
    let mut b = Simulation::new(scenario, 0);
    a.deserialize_into(snapshot_data)?;
    b.deserialize_into(snapshot_data)?;

    let max_timestep = a.sim_state().timestep.saturating_add(timesteps);
    let mut hash_log = Vec::new();
    step_pair(&mut a, &mut b, max_timestep, &mut hash_log)?;
    Ok(DeterminismResult::from_log(hash_log))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn fire_scenario(timesteps: i32) -> Scenario {
        let mut b = make_builder(60, timesteps);
        b.add_transition(fire(0.25));
        b.add_transition(regrow(0.5));
        b.build().unwrap()
    }

    #[test]
    fn identical_simulations_have_empty_diff() {
        let scenario = fire_scenario(3);
        let mut a = Simulation::new(&scenario, 5);
        let mut b = Simulation::new(&scenario, 5);
        a.run_iteration(1, &mut NullSink).unwrap();
        b.run_iteration(1, &mut NullSink).unwrap();
        let diff = diff_simulations(&a, &b);
        assert!(diff.is_identical);
        assert!(diff.cell_diffs.is_empty());
    }

    #[test]
    fn different_seeds_show_cell_diffs() {
        let scenario = fire_scenario(5);
        let mut a = Simulation::new(&scenario, 1);
        let mut b = Simulation::new(&scenario, 2);
        a.run_iteration(1, &mut NullSink).unwrap();
        b.run_iteration(1, &mut NullSink).unwrap();
        let diff = diff_simulations(&a, &b);
        assert!(!diff.is_identical);
        assert!(diff.sim_state_matches);
        assert!(
            diff.cell_diffs
                .iter()
                .any(|d| matches!(d, CellDiff::StateMismatch { .. }))
        );
    }

    #[test]
    fn fresh_runs_are_deterministic() {
        let scenario = fire_scenario(8);
        let result = validate_determinism(&scenario, 123, 1).unwrap();
        assert!(result.is_deterministic);
        assert_eq!(result.divergence_timestep, None);
        assert_eq!(result.hash_log.len(), 9);
        assert_eq!(result.hash_log[0].0, 0);
    }

    #[test]
    fn snapshot_runs_are_deterministic() {
        let scenario = fire_scenario(10);
        let mut sim = Simulation::new(&scenario, 7);
        sim.begin_iteration(1, &mut NullSink).unwrap();
        sim.step(&mut NullSink).unwrap();
        sim.step(&mut NullSink).unwrap();
        let data = sim.serialize().unwrap();

        let result = validate_snapshot_determinism(&scenario, &data, 4).unwrap();
        assert!(result.is_deterministic);
        assert_eq!(result.hash_log.first().unwrap().0, 2);
        assert_eq!(result.hash_log.last().unwrap().0, 6);
    }
}
