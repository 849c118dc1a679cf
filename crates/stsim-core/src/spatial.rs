//! The seam between the timestep driver and a raster landscape.
//!
//! A non-spatial run has no [`SpatialModel`]. A spatial run supplies one;
//! it provides the initial cells, the neighbourhood topology used by patch
//! spread, and the per-cell spatial and initiation multipliers. Every
//! multiplier defaults to a neutral 1.0.

use crate::cell::{Cell, CellCollection, CellInit};
use crate::distribution::SampledValues;
use crate::id::*;
use crate::scenario::Scenario;

/// Read-only view of the landscape at the start of a timestep.
#[derive(Debug, Clone, Copy)]
pub struct LandscapeView<'a> {
    pub scenario: &'a Scenario,
    pub cells: &'a CellCollection,
    pub values: &'a SampledValues,
    pub iteration: i32,
    pub timestep: i32,
}

impl LandscapeView<'_> {
    /// Current value of a state attribute on a cell.
    pub fn state_attribute(&self, attribute: AttributeTypeId, cell: &Cell) -> Option<f64> {
        self.scenario
            .state_attribute_value(attribute, cell, self.iteration, self.timestep, self.values)
    }
}

pub trait SpatialModel {
    /// Area of one cell; the amount every cell represents.
    fn cell_area(&self) -> f64;

    /// Initial cells, in raster order. Cells with a zero stratum or state
    /// class are dropped by the driver.
    fn initial_cells(&self) -> Vec<CellInit>;

    /// Cells adjacent to `cell` for spread.
    fn neighbours(&self, cell: CellId) -> Vec<CellId>;

    /// Neighbour positions of an interior cell. A cell with fewer
    /// neighbours inside its patch sits on the patch edge.
    fn neighbourhood_size(&self) -> usize {
        8
    }

    /// The cell `distance` map units from `from` along `angle` (radians,
    /// clockwise from north), if it lies on the landscape.
    fn cell_at_distance(&self, _from: CellId, _distance: f64, _angle: f64) -> Option<CellId> {
        None
    }

    /// Scales how likely a cell is to seed a transition. Patch growth and
    /// spread are unaffected.
    fn initiation_multiplier(&self, _group: TransitionGroupId, _cell: &Cell, _iteration: i32, _timestep: i32) -> f64 {
        1.0
    }

    fn spatial_multiplier(&self, _group: TransitionGroupId, _cell: &Cell, _iteration: i32, _timestep: i32) -> f64 {
        1.0
    }

    fn adjacency_multiplier(&self, _group: TransitionGroupId, _cell: &Cell, _iteration: i32, _timestep: i32) -> f64 {
        1.0
    }

    /// Direction and slope multiplier for spreading from `from` into `to`.
    fn spread_multiplier(
        &self,
        _group: TransitionGroupId,
        _from: &Cell,
        _to: &Cell,
        _iteration: i32,
        _timestep: i32,
    ) -> f64 {
        1.0
    }

    /// Refresh cached neighbourhood state.
    fn before_timestep(&mut self, _landscape: &LandscapeView<'_>) {}
}
