//! Run control and non-spatial initial conditions.

use crate::ages::UNBOUNDED;
use crate::error::ConfigError;
use crate::id::*;
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

const RUN_CONTROL: &str = "Run Control";
const INITIAL_CONDITIONS: &str = "Initial Conditions Non Spatial";
const INITIAL_DISTRIBUTION: &str = "Initial Conditions Non Spatial Distribution";

/// Iteration and timestep ranges of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunControl {
    pub min_iteration: i32,
    pub max_iteration: i32,
    pub min_timestep: i32,
    pub max_timestep: i32,
    pub is_spatial: bool,
}

impl RunControl {
    /// Iterations `1..=iterations`, timesteps `1..=timesteps`, non-spatial.
    pub fn new(iterations: i32, timesteps: i32) -> Self {
        Self {
            min_iteration: 1,
            max_iteration: iterations,
            min_timestep: 1,
            max_timestep: timesteps,
            is_spatial: false,
        }
    }

    /// The timestep whose state is the initial condition.
    pub fn timestep_zero(&self) -> i32 {
        self.min_timestep - 1
    }

    pub fn iterations(&self) -> RangeInclusive<i32> {
        self.min_iteration..=self.max_iteration
    }

    pub fn timesteps(&self) -> RangeInclusive<i32> {
        self.min_timestep..=self.max_timestep
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_iteration > self.max_iteration {
            return Err(ConfigError::Invalid {
                table: RUN_CONTROL.into(),
                detail: format!(
                    "minimum iteration {} exceeds maximum iteration {}",
                    self.min_iteration, self.max_iteration
                ),
            });
        }
        if self.min_timestep > self.max_timestep {
            return Err(ConfigError::Invalid {
                table: RUN_CONTROL.into(),
                detail: format!(
                    "minimum timestep {} exceeds maximum timestep {}",
                    self.min_timestep, self.max_timestep
                ),
            });
        }
        Ok(())
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// One row of the non-spatial initial state distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditionRow {
    pub stratum: StratumId,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: StateClassId,
    pub age_min: i32,
    pub age_max: i32,
    pub relative_amount: f64,
}

impl InitialConditionRow {
    pub fn new(stratum: StratumId, state_class: StateClassId, relative_amount: f64) -> Self {
        Self {
            stratum,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class,
            age_min: 0,
            age_max: UNBOUNDED,
            relative_amount,
        }
    }
}

/// Cell count, total area, and the initial state distribution of a
/// non-spatial run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub total_amount: f64,
    pub num_cells: usize,
    pub rows: Vec<InitialConditionRow>,
}

impl InitialConditions {
    pub fn new(total_amount: f64, num_cells: usize) -> Self {
        Self {
            total_amount,
            num_cells,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: InitialConditionRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn amount_per_cell(&self) -> f64 {
        if self.num_cells == 0 {
            0.0
        } else {
            self.total_amount / self.num_cells as f64
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_cells == 0 || !(self.total_amount > 0.0) {
            return Err(ConfigError::Invalid {
                table: INITIAL_CONDITIONS.into(),
                detail: format!(
                    "need a positive cell count and total amount, got {} cells and {}",
                    self.num_cells, self.total_amount
                ),
            });
        }
        if self.rows.is_empty() {
            return Err(ConfigError::MissingRequired {
                table: INITIAL_DISTRIBUTION.into(),
                detail: "no initial condition records".into(),
            });
        }
        for row in &self.rows {
            if row.stratum == StratumId::NONE || row.state_class == StateClassId::NONE {
                return Err(ConfigError::Invalid {
                    table: INITIAL_DISTRIBUTION.into(),
                    detail: "stratum and state class are required".into(),
                });
            }
            if row.age_min > row.age_max || row.age_min < 0 {
                return Err(ConfigError::Invalid {
                    table: INITIAL_DISTRIBUTION.into(),
                    detail: format!("invalid age range {}..={}", row.age_min, row.age_max),
                });
            }
            if !(row.relative_amount >= 0.0) {
                return Err(ConfigError::Invalid {
                    table: INITIAL_DISTRIBUTION.into(),
                    detail: format!("negative relative amount {}", row.relative_amount),
                });
            }
        }
        if !(self.rows.iter().map(|r| r.relative_amount).sum::<f64>() > 0.0) {
            return Err(ConfigError::Invalid {
                table: INITIAL_DISTRIBUTION.into(),
                detail: "relative amounts sum to zero".into(),
            });
        }
        Ok(())
    }

    /// Draw a row with probability proportional to its relative amount.
    pub fn pick_row(&self, rng: &mut SimRng) -> Option<&InitialConditionRow> {
        let total: f64 = self.rows.iter().map(|r| r.relative_amount).sum();
        let target = rng.next_f64() * total;
        let mut cumulative = 0.0;
        for row in &self.rows {
            cumulative += row.relative_amount;
            if target < cumulative {
                return Some(row);
            }
        }
        self.rows.iter().rev().find(|r| r.relative_amount > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestep_zero_precedes_first_timestep() {
        let mut rc = RunControl::new(2, 10);
        rc.min_timestep = 2020;
        rc.max_timestep = 2030;
        assert_eq!(rc.timestep_zero(), 2019);
        assert_eq!(rc.iterations().count(), 2);
    }

    #[test]
    fn reversed_run_control_names_table() {
        let mut rc = RunControl::new(1, 1);
        rc.min_timestep = 5;
        let err = rc.validate().unwrap_err();
        assert!(err.to_string().starts_with("Run Control:"));
    }

    #[test]
    fn missing_rows_is_missing_required() {
        let ic = InitialConditions::new(100.0, 10);
        let err = ic.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
        assert_eq!(err.table(), "Initial Conditions Non Spatial Distribution");
    }

    #[test]
    fn rows_picked_by_relative_amount() {
        let ic = InitialConditions::new(100.0, 10)
            .with_row(InitialConditionRow::new(StratumId(1), StateClassId(1), 0.0))
            .with_row(InitialConditionRow::new(StratumId(1), StateClassId(2), 3.0));
        ic.validate().unwrap();
        let mut rng = SimRng::new(2);
        for _ in 0..50 {
            assert_eq!(ic.pick_row(&mut rng).unwrap().state_class, StateClassId(2));
        }
        assert_eq!(ic.amount_per_cell(), 10.0);
    }
}
