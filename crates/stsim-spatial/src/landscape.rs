//! A raster landscape implementing the core `SpatialModel`.

use crate::adjacency::{AdjacencyMultiplier, AdjacencyMultipliers, AdjacencySetting, NeighbourhoodCache};
use crate::multiplier::{MismatchPolicy, SpatialMultiplierRecord, SpatialMultipliers};
use crate::raster::{InputRasters, Raster, RasterMetadata};
use crate::spread::{DirectionMultiplier, SlopeMultiplier, SpreadMultipliers, slope_degrees};
use crate::{Direction, GridPosition, SpatialError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stsim_core::cell::{Cell, CellInit};
use stsim_core::error::ConsistencyWarning;
use stsim_core::id::{CellId, TransitionGroupId};
use stsim_core::spatial::{LandscapeView, SpatialModel};
use tracing::{info, warn};

/// The spatial tables of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandscapeConfig {
    #[serde(default)]
    pub spatial_multipliers: Vec<SpatialMultiplierRecord>,
    /// Rasters scaling where a transition may start. Mismatched rows or
    /// columns are always an error for these.
    #[serde(default)]
    pub initiation_multipliers: Vec<SpatialMultiplierRecord>,
    #[serde(default)]
    pub adjacency_settings: Vec<AdjacencySetting>,
    #[serde(default)]
    pub adjacency_multipliers: Vec<AdjacencyMultiplier>,
    #[serde(default)]
    pub direction_multipliers: Vec<DirectionMultiplier>,
    #[serde(default)]
    pub slope_multipliers: Vec<SlopeMultiplier>,
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
}

/// Cells, topology and spatial multipliers of a raster run. Neighbourhoods
/// are the eight surrounding cells.
#[derive(Debug, Clone)]
pub struct RasterLandscape {
    metadata: RasterMetadata,
    cells: Vec<CellInit>,
    elevation: Option<Raster<f64>>,
    multipliers: SpatialMultipliers,
    initiation: SpatialMultipliers,
    adjacency: AdjacencyMultipliers,
    neighbourhoods: NeighbourhoodCache,
    spread: SpreadMultipliers,
    warnings: Vec<ConsistencyWarning>,
}

impl RasterLandscape {
    /// A landscape with no spatial multipliers.
    pub fn new(inputs: InputRasters) -> Result<Self, SpatialError> {
        Self::build(inputs, &LandscapeConfig::default(), &BTreeMap::new())
    }

    /// Build from initial condition rasters, the spatial tables and the
    /// multiplier rasters they name.
    pub fn build(
        inputs: InputRasters,
        config: &LandscapeConfig,
        rasters: &BTreeMap<String, Raster<f64>>,
    ) -> Result<Self, SpatialError> {
        let mut warnings = inputs.check()?;
        let metadata = inputs.metadata().clone();

        let (multipliers, raster_warnings) =
            SpatialMultipliers::build(&config.spatial_multipliers, rasters, &metadata, config.mismatch_policy)?;
        warnings.extend(raster_warnings);
        let (initiation, initiation_warnings) = SpatialMultipliers::build(
            &config.initiation_multipliers,
            rasters,
            &metadata,
            MismatchPolicy::Strict,
        )?;
        warnings.extend(initiation_warnings);

        let adjacency = AdjacencyMultipliers::build(&config.adjacency_multipliers)?;
        let neighbourhoods = NeighbourhoodCache::new(
            &config.adjacency_settings,
            metadata.rows,
            metadata.cols,
            metadata.cell_size,
        )?;
        for group in neighbourhoods.groups() {
            if !adjacency.has_group(group) {
                warn!(group = %group, "adjacency setting has no multipliers; using 1.0");
                warnings.push(ConsistencyWarning::MissingAdjacencyMultipliers { group });
            }
        }

        let spread = SpreadMultipliers::build(&config.direction_multipliers, &config.slope_multipliers)?;
        if spread.has_slope() && inputs.dem.is_none() {
            return Err(SpatialError::MissingRaster {
                name: "elevation".into(),
            });
        }

        let cells = inputs.to_cells();
        info!(
            rows = metadata.rows,
            cols = metadata.cols,
            cells = cells.len(),
            "raster landscape built"
        );
        Ok(Self {
            metadata,
            cells,
            elevation: inputs.dem,
            multipliers,
            initiation,
            adjacency,
            neighbourhoods,
            spread,
            warnings,
        })
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn warnings(&self) -> &[ConsistencyWarning] {
        &self.warnings
    }

    pub fn position(&self, cell: CellId) -> GridPosition {
        GridPosition::from_cell(cell, self.metadata.cols)
    }

    /// Current neighbourhood value of `cell` for an adjacency group.
    pub fn neighbourhood_value(&self, group: TransitionGroupId, cell: CellId) -> Option<f64> {
        self.neighbourhoods.value(group, (cell.0 - 1).max(0) as usize)
    }

    fn slope(&self, from: GridPosition, to: GridPosition, direction: Direction) -> f64 {
        let Some(dem) = &self.elevation else {
            return 0.0;
        };
        let (Some(z0), Some(z1)) = (dem.get_at(from), dem.get_at(to)) else {
            return 0.0;
        };
        if z0.is_nan() || z1.is_nan() {
            return 0.0;
        }
        let mut distance = self.metadata.cell_size;
        if direction.is_diagonal() {
            distance *= std::f64::consts::SQRT_2;
        }
        slope_degrees(z0, z1, distance)
    }
}

impl SpatialModel for RasterLandscape {
    fn cell_area(&self) -> f64 {
        self.metadata.cell_area()
    }

    fn initial_cells(&self) -> Vec<CellInit> {
        self.cells.clone()
    }

    fn neighbours(&self, cell: CellId) -> Vec<CellId> {
        let (rows, cols) = (self.metadata.rows, self.metadata.cols);
        let centre = self.position(cell);
        Direction::all()
            .into_iter()
            .filter_map(|d| centre.offset(d.offset()).index(rows, cols))
            .map(|i| CellId(i as i32 + 1))
            .collect()
    }

    fn cell_at_distance(&self, from: CellId, distance: f64, angle: f64) -> Option<CellId> {
        let size = self.metadata.cell_size;
        if !(size > 0.0) {
            return None;
        }
        let dr = (-distance * angle.cos() / size).round() as i32;
        let dc = (distance * angle.sin() / size).round() as i32;
        self.position(from)
            .offset((dr, dc))
            .index(self.metadata.rows, self.metadata.cols)
            .map(|i| CellId(i as i32 + 1))
    }

    fn spatial_multiplier(&self, group: TransitionGroupId, cell: &Cell, iteration: i32, timestep: i32) -> f64 {
        self.multipliers.multiplier(group, cell.id, iteration, timestep)
    }

    fn initiation_multiplier(&self, group: TransitionGroupId, cell: &Cell, iteration: i32, timestep: i32) -> f64 {
        self.initiation.multiplier(group, cell.id, iteration, timestep)
    }

    fn adjacency_multiplier(&self, group: TransitionGroupId, cell: &Cell, iteration: i32, timestep: i32) -> f64 {
        let Some(value) = self.neighbourhood_value(group, cell.id) else {
            return 1.0;
        };
        self.adjacency
            .lookup(group, cell, value, iteration, timestep)
            .unwrap_or(1.0)
    }

    fn spread_multiplier(&self, group: TransitionGroupId, from: &Cell, to: &Cell, iteration: i32, timestep: i32) -> f64 {
        if self.spread.is_empty() {
            return 1.0;
        }
        let (p0, p1) = (self.position(from.id), self.position(to.id));
        let Some(direction) = Direction::between(p0, p1) else {
            return 1.0;
        };
        let mut m = self
            .spread
            .direction_multiplier(group, to, direction, iteration, timestep);
        if self.spread.has_slope() {
            let slope = self.slope(p0, p1, direction);
            m *= self.spread.slope_multiplier(group, to, slope, iteration, timestep);
        }
        m
    }

    fn before_timestep(&mut self, landscape: &LandscapeView<'_>) {
        self.neighbourhoods.refresh(landscape);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::AdjacencyTarget;
    use stsim_core::engine::Simulation;
    use stsim_core::output::SummaryCollector;
    use stsim_core::test_utils::*;

    fn meta(rows: usize, cols: usize) -> RasterMetadata {
        RasterMetadata::new(rows, cols, 1.0)
    }

    /// Young Forest everywhere, Old where `old` holds.
    fn inputs(rows: usize, cols: usize, old: &[usize]) -> InputRasters {
        let states = (0..rows * cols)
            .map(|i| if old.contains(&i) { OLD.0 } else { YOUNG.0 })
            .collect();
        InputRasters::new(
            Raster::filled(meta(rows, cols), FOREST.0),
            Raster::new("state", meta(rows, cols), states).unwrap(),
        )
    }

    #[test]
    fn corner_has_three_neighbours() {
        let land = RasterLandscape::new(inputs(3, 3, &[])).unwrap();
        let mut n = land.neighbours(CellId(1));
        n.sort();
        assert_eq!(n, vec![CellId(2), CellId(4), CellId(5)]);
        assert_eq!(land.neighbours(CellId(5)).len(), 8);
    }

    #[test]
    fn cell_area_from_cell_size() {
        let mut input = inputs(1, 1, &[]);
        input.stratum.metadata.cell_size = 30.0;
        input.state_class.metadata.cell_size = 30.0;
        let land = RasterLandscape::new(input).unwrap();
        assert_eq!(land.cell_area(), 900.0);
    }

    #[test]
    fn missing_adjacency_multipliers_warn() {
        let config = LandscapeConfig {
            adjacency_settings: vec![AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD))],
            ..Default::default()
        };
        let land = RasterLandscape::build(inputs(2, 2, &[]), &config, &BTreeMap::new()).unwrap();
        assert_eq!(
            land.warnings(),
            &[ConsistencyWarning::MissingAdjacencyMultipliers { group: FIRE_GROUP }]
        );
        let cell = Cell::new(CellId(1), FOREST, YOUNG, 0);
        assert_eq!(land.adjacency_multiplier(FIRE_GROUP, &cell, 1, 1), 1.0);
    }

    #[test]
    fn slope_multipliers_need_elevation() {
        let config = LandscapeConfig {
            slope_multipliers: vec![SlopeMultiplier::new(FIRE_GROUP, 0, 1.0)],
            ..Default::default()
        };
        let err = RasterLandscape::build(inputs(1, 2, &[]), &config, &BTreeMap::new()).unwrap_err();
        assert_eq!(err, SpatialError::MissingRaster { name: "elevation".into() });
    }

    #[test]
    fn spread_combines_direction_and_slope() {
        let mut input = inputs(1, 2, &[]);
        input.dem = Some(Raster::new("dem", meta(1, 2), vec![0.0, 1.0]).unwrap());
        let config = LandscapeConfig {
            direction_multipliers: vec![DirectionMultiplier::new(FIRE_GROUP, Direction::East, 2.0)],
            slope_multipliers: vec![
                SlopeMultiplier::new(FIRE_GROUP, 0, 1.0),
                SlopeMultiplier::new(FIRE_GROUP, 45, 3.0),
            ],
            ..Default::default()
        };
        let land = RasterLandscape::build(input, &config, &BTreeMap::new()).unwrap();
        let west = Cell::new(CellId(1), FOREST, YOUNG, 0);
        let east = Cell::new(CellId(2), FOREST, YOUNG, 0);
        // East and uphill at 45 degrees.
        assert!((land.spread_multiplier(FIRE_GROUP, &west, &east, 1, 1) - 6.0).abs() < 1e-9);
        // West and downhill, clamped to the 0 degree point.
        assert!((land.spread_multiplier(FIRE_GROUP, &east, &west, 1, 1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_spatial_multiplier_blocks_transition() {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1.0));
        let scenario = b.build().unwrap();

        let mut files = BTreeMap::new();
        files.insert(
            "block.json".to_string(),
            Raster::new("block.json", meta(2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        );
        let config = LandscapeConfig {
            spatial_multipliers: vec![SpatialMultiplierRecord::new(FIRE_GROUP, "block.json")],
            ..Default::default()
        };
        let land = RasterLandscape::build(inputs(2, 2, &[]), &config, &files).unwrap();

        let mut sim = Simulation::new(&scenario, 3).with_spatial_model(Box::new(land));
        let mut summary = SummaryCollector::new();
        sim.run_iteration(1, &mut summary).unwrap();
        assert_eq!(summary.state_amount(1, 1, OLD), 2.0);
        assert_eq!(summary.state_amount(1, 1, YOUNG), 2.0);
    }

    #[test]
    fn distance_lands_on_raster_cells() {
        let mut input = inputs(5, 5, &[]);
        input.stratum.metadata.cell_size = 10.0;
        input.state_class.metadata.cell_size = 10.0;
        let land = RasterLandscape::new(input).unwrap();
        // North of the centre, then east.
        assert_eq!(land.cell_at_distance(CellId(13), 20.0, 0.0), Some(CellId(3)));
        assert_eq!(
            land.cell_at_distance(CellId(13), 10.0, std::f64::consts::FRAC_PI_2),
            Some(CellId(14))
        );
        assert_eq!(land.cell_at_distance(CellId(1), 10.0, 0.0), None);
    }

    #[test]
    fn initiation_raster_must_match_rows_and_columns() {
        let mut files = BTreeMap::new();
        files.insert(
            "start.json".to_string(),
            Raster::new("start.json", meta(3, 3), vec![1.0; 9]).unwrap(),
        );
        let config = LandscapeConfig {
            initiation_multipliers: vec![SpatialMultiplierRecord::new(FIRE_GROUP, "start.json")],
            mismatch_policy: MismatchPolicy::SkipForResolutionScenario,
            ..Default::default()
        };
        let err = RasterLandscape::build(inputs(2, 2, &[]), &config, &files).unwrap_err();
        assert!(matches!(err, SpatialError::RowColumnMismatch { .. }));
    }

    #[test]
    fn zero_initiation_blocks_seed_but_not_spatial_multiplier() {
        let mut b = make_spatial_builder(1);
        b.add_transition(fire(1.0));
        let scenario = b.build().unwrap();

        let mut files = BTreeMap::new();
        files.insert(
            "start.json".to_string(),
            Raster::new("start.json", meta(2, 2), vec![0.0, 1.0, 0.0, 1.0]).unwrap(),
        );
        let config = LandscapeConfig {
            initiation_multipliers: vec![SpatialMultiplierRecord::new(FIRE_GROUP, "start.json")],
            ..Default::default()
        };
        let land = RasterLandscape::build(inputs(2, 2, &[]), &config, &files).unwrap();
        let cell = Cell::new(CellId(1), FOREST, YOUNG, 0);
        assert_eq!(land.initiation_multiplier(FIRE_GROUP, &cell, 1, 1), 0.0);
        assert_eq!(land.spatial_multiplier(FIRE_GROUP, &cell, 1, 1), 1.0);

        let mut sim = Simulation::new(&scenario, 3).with_spatial_model(Box::new(land));
        let mut summary = SummaryCollector::new();
        sim.run_iteration(1, &mut summary).unwrap();
        assert_eq!(summary.state_amount(1, 1, OLD), 2.0);
    }

    #[test]
    fn adjacency_spreads_one_cell_per_timestep() {
        let mut b = make_spatial_builder(3);
        b.add_transition(fire(1.0));
        let scenario = b.build().unwrap();

        let mut setting = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
        setting.radius = Some(1.0);
        let config = LandscapeConfig {
            adjacency_settings: vec![setting],
            adjacency_multipliers: vec![
                AdjacencyMultiplier::new(FIRE_GROUP, 0.0, 0.0),
                AdjacencyMultiplier::new(FIRE_GROUP, 0.1, 1.0),
            ],
            ..Default::default()
        };
        // A 1x6 strip, Old at the western end.
        let land = RasterLandscape::build(inputs(1, 6, &[0]), &config, &BTreeMap::new()).unwrap();
        assert!(land.warnings().is_empty());

        let mut sim = Simulation::new(&scenario, 11).with_spatial_model(Box::new(land));
        let mut summary = SummaryCollector::new();
        sim.run_iteration(1, &mut summary).unwrap();
        for ts in 0..=3 {
            assert_eq!(summary.state_amount(1, ts, OLD), f64::from(ts + 1));
        }
    }
}
