//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::cell::{Cell, CellInit};
use crate::config::{InitialConditionRow, InitialConditions, RunControl};
use crate::id::*;
use crate::registry::{Registry, RegistryBuilder};
use crate::scenario::ScenarioBuilder;
use crate::spatial::SpatialModel;
use crate::transition::Transition;

// ===========================================================================
// Registry ids
// ===========================================================================

pub const FOREST: StratumId = StratumId(1);
pub const BURN_STRATUM: StratumId = StratumId(2);

pub const YOUNG: StateClassId = StateClassId(1);
pub const OLD: StateClassId = StateClassId(2);

pub const FIRE: TransitionTypeId = TransitionTypeId(1);
pub const HARVEST: TransitionTypeId = TransitionTypeId(2);

/// Auto groups, created in type registration order.
pub const FIRE_GROUP: TransitionGroupId = TransitionGroupId(1);
pub const HARVEST_GROUP: TransitionGroupId = TransitionGroupId(2);

pub const CARBON: AttributeTypeId = AttributeTypeId(1);

/// Strata Forest and Burned, state classes Young and Old, transition types
/// Fire and Harvest, attribute Carbon.
pub fn make_registry() -> Registry {
    let mut b = RegistryBuilder::new();
    let _ = b.register_stratum("Forest");
    let _ = b.register_stratum("Burned");
    let _ = b.register_state_class("Young");
    let _ = b.register_state_class("Old");
    let _ = b.register_transition_type("Fire");
    let _ = b.register_transition_type("Harvest");
    let _ = b.register_attribute_type("Carbon");
    b.build()
}

// ===========================================================================
// Scenario builders
// ===========================================================================

/// One iteration of `timesteps` timesteps over `cells` Young Forest cells
/// of age 0, one unit of area each. With zero cells no initial conditions
/// are set.
pub fn make_builder(cells: usize, timesteps: i32) -> ScenarioBuilder {
    let mut b = ScenarioBuilder::new(make_registry());
    b.run_control(RunControl::new(1, timesteps));
    if cells > 0 {
        let mut row = InitialConditionRow::new(FOREST, YOUNG, 1.0);
        row.age_max = 0;
        b.initial_conditions(InitialConditions::new(cells as f64, cells).with_row(row));
    }
    b
}

/// A spatial run of one iteration. Cells come from the spatial model.
pub fn make_spatial_builder(timesteps: i32) -> ScenarioBuilder {
    let mut b = ScenarioBuilder::new(make_registry());
    let mut rc = RunControl::new(1, timesteps);
    rc.is_spatial = true;
    b.run_control(rc);
    b
}

// ===========================================================================
// Transition constructors
// ===========================================================================

/// Fire: Young to Old.
pub fn fire(probability: f64) -> Transition {
    Transition::new(YOUNG, Some(OLD), FIRE, probability)
}

/// Harvest: Old back to Young.
pub fn regrow(probability: f64) -> Transition {
    Transition::new(OLD, Some(YOUNG), HARVEST, probability)
}

// ===========================================================================
// Grid model
// ===========================================================================

/// A rectangular raster with rook (4-cell) neighbourhoods. Cell ids run
/// 1.. in row-major order.
#[derive(Debug, Clone)]
pub struct GridModel {
    pub rows: usize,
    pub cols: usize,
    pub cell_area: f64,
    pub cells: Vec<CellInit>,
    /// Per-cell initiation multipliers, raster order.
    pub initiation: Vec<f64>,
}

impl GridModel {
    pub fn uniform(rows: usize, cols: usize, stratum: StratumId, state_class: StateClassId) -> Self {
        let cells = (0..rows * cols)
            .map(|i| CellInit {
                id: CellId(i as i32 + 1),
                stratum,
                secondary_stratum: None,
                tertiary_stratum: None,
                state_class,
                age: Some(0),
            })
            .collect();
        Self {
            rows,
            cols,
            cell_area: 1.0,
            cells,
            initiation: vec![1.0; rows * cols],
        }
    }

    pub fn set_stratum(&mut self, row: usize, col: usize, stratum: StratumId) {
        self.cells[row * self.cols + col].stratum = stratum;
    }

    pub fn set_state_class(&mut self, row: usize, col: usize, state_class: StateClassId) {
        self.cells[row * self.cols + col].state_class = state_class;
    }

    pub fn set_initiation(&mut self, row: usize, col: usize, value: f64) {
        self.initiation[row * self.cols + col] = value;
    }
}

impl SpatialModel for GridModel {
    fn cell_area(&self) -> f64 {
        self.cell_area
    }

    fn initial_cells(&self) -> Vec<CellInit> {
        self.cells.clone()
    }

    fn neighbours(&self, cell: CellId) -> Vec<CellId> {
        let i = (cell.0 - 1) as usize;
        let (r, c) = (i / self.cols, i % self.cols);
        let mut out = Vec::with_capacity(4);
        if r > 0 {
            out.push(CellId(cell.0 - self.cols as i32));
        }
        if r + 1 < self.rows {
            out.push(CellId(cell.0 + self.cols as i32));
        }
        if c > 0 {
            out.push(CellId(cell.0 - 1));
        }
        if c + 1 < self.cols {
            out.push(CellId(cell.0 + 1));
        }
        out
    }

    fn neighbourhood_size(&self) -> usize {
        4
    }

    fn cell_at_distance(&self, from: CellId, distance: f64, angle: f64) -> Option<CellId> {
        let size = self.cell_area.sqrt();
        let i = (from.0 - 1) as i64;
        let (r, c) = (i / self.cols as i64, i % self.cols as i64);
        let r = r + (-distance * angle.cos() / size).round() as i64;
        let c = c + (distance * angle.sin() / size).round() as i64;
        if r < 0 || c < 0 || r >= self.rows as i64 || c >= self.cols as i64 {
            return None;
        }
        Some(CellId((r * self.cols as i64 + c) as i32 + 1))
    }

    fn initiation_multiplier(&self, _group: TransitionGroupId, cell: &Cell, _iteration: i32, _timestep: i32) -> f64 {
        self.initiation[(cell.id.0 - 1) as usize]
    }
}
