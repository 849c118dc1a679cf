//! Transition pathway records.

use crate::ages::UNBOUNDED;
use crate::error::ConfigError;
use crate::id::*;
use serde::{Deserialize, Serialize};

/// A probabilistic transition pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub stratum_source: Option<StratumId>,
    pub state_class_source: StateClassId,
    /// `None` keeps the cell's stratum.
    pub stratum_dest: Option<StratumId>,
    /// `None` keeps the cell's state class.
    pub state_class_dest: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub transition_type: TransitionTypeId,
    pub probability: f64,
    pub proportion: f64,
    /// Applicability window on cell age (inclusive).
    pub age_min: i32,
    pub age_max: i32,
    pub age_relative: i32,
    pub age_reset: bool,
    /// Applicability window on the cell's TST (inclusive).
    pub tst_min: Option<i32>,
    pub tst_max: Option<i32>,
    /// Change applied to the TST when this transition fires; `None` resets.
    pub tst_relative: Option<i32>,
}

impl Transition {
    pub fn new(
        state_class_source: StateClassId,
        state_class_dest: Option<StateClassId>,
        transition_type: TransitionTypeId,
        probability: f64,
    ) -> Self {
        Self {
            stratum_source: None,
            state_class_source,
            stratum_dest: None,
            state_class_dest,
            iteration: None,
            timestep: None,
            transition_type,
            probability,
            proportion: 1.0,
            age_min: 0,
            age_max: UNBOUNDED,
            age_relative: 0,
            age_reset: true,
            tst_min: None,
            tst_max: None,
            tst_relative: None,
        }
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        let invalid = |detail: String| ConfigError::Invalid {
            table: table.to_string(),
            detail,
        };
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(invalid(format!("probability {} outside [0, 1]", self.probability)));
        }
        if !(0.0..=1.0).contains(&self.proportion) {
            return Err(invalid(format!("proportion {} outside [0, 1]", self.proportion)));
        }
        if self.age_min > self.age_max {
            return Err(invalid(format!(
                "minimum age {} exceeds maximum age {}",
                self.age_min, self.age_max
            )));
        }
        if let (Some(lo), Some(hi)) = (self.tst_min, self.tst_max) {
            if lo > hi {
                return Err(invalid(format!("minimum TST {lo} exceeds maximum TST {hi}")));
            }
        }
        Ok(())
    }
}

/// An age-triggered transition. Also defines the age window of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterministicTransition {
    pub stratum_source: Option<StratumId>,
    pub state_class_source: StateClassId,
    pub stratum_dest: Option<StratumId>,
    pub state_class_dest: StateClassId,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub age_min: i32,
    pub age_max: i32,
}

impl DeterministicTransition {
    /// A self-loop with an unbounded window.
    pub fn new(state_class_source: StateClassId) -> Self {
        Self {
            stratum_source: None,
            state_class_source,
            stratum_dest: None,
            state_class_dest: state_class_source,
            iteration: None,
            timestep: None,
            age_min: 0,
            age_max: UNBOUNDED,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.state_class_source == self.state_class_dest
    }
}

/// Processing position of a primary group. Groups without an order run
/// after every ordered group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOrder {
    pub group: TransitionGroupId,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub order: f64,
}

/// Which group's TST a transition type reads and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TstGroup {
    pub transition_type: TransitionTypeId,
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
}

/// Initial TST range for cells at the start of an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TstRandomize {
    pub group: Option<TransitionGroupId>,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub min: i32,
    pub max: i32,
}

impl Default for TstRandomize {
    fn default() -> Self {
        Self {
            group: None,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            min: 0,
            max: UNBOUNDED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_defaults() {
        let t = Transition::new(StateClassId(1), Some(StateClassId(2)), TransitionTypeId(1), 0.1);
        assert_eq!(t.proportion, 1.0);
        assert_eq!(t.age_max, UNBOUNDED);
        assert!(t.validate("Probabilistic Transitions").is_ok());
    }

    #[test]
    fn probability_above_one_rejected() {
        let t = Transition::new(StateClassId(1), None, TransitionTypeId(1), 1.5);
        let err = t.validate("Probabilistic Transitions").unwrap_err();
        assert!(err.to_string().starts_with("Probabilistic Transitions:"));
    }

    #[test]
    fn deterministic_defaults_to_self_loop() {
        let dt = DeterministicTransition::new(StateClassId(3));
        assert!(dt.is_self_loop());
        assert_eq!(dt.age_min, 0);
        assert_eq!(dt.age_max, UNBOUNDED);
    }
}
