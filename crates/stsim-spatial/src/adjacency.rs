//! Transition adjacency multipliers.
//!
//! An adjacency setting ties a transition group to a neighbourhood
//! measure: the fraction of neighbouring cells in a state class, or the
//! mean value of a state attribute over the neighbours. The measure is
//! refreshed every `update_frequency` timesteps and looked up in a
//! threshold table to give the cell's multiplier for the group.

use crate::{GridPosition, SpatialError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use stsim_core::cell::Cell;
use stsim_core::id::{AttributeTypeId, StateClassId, StratumId, TransitionGroupId};
use stsim_core::keymap::{CompositeKey, KeyMap, KeySegment};
use stsim_core::spatial::LandscapeView;
use tracing::trace;

/// Threshold used when an adjacency multiplier row gives none.
pub const DEFAULT_THRESHOLD: f64 = 8.0 / 9.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What a neighbourhood is measured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjacencyTarget {
    StateClass(StateClassId),
    StateAttribute(AttributeTypeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacencySetting {
    pub group: TransitionGroupId,
    pub target: AdjacencyTarget,
    /// Neighbourhood radius in map units. Defaults to the diagonal of one
    /// cell, rounded up.
    #[serde(default)]
    pub radius: Option<f64>,
    /// Timesteps between neighbourhood refreshes. Defaults to 1.
    #[serde(default)]
    pub update_frequency: Option<i32>,
}

impl AdjacencySetting {
    pub fn new(group: TransitionGroupId, target: AdjacencyTarget) -> Self {
        Self {
            group,
            target,
            radius: None,
            update_frequency: None,
        }
    }

    pub fn radius_or_default(&self, cell_size: f64) -> f64 {
        self.radius
            .unwrap_or_else(|| (2.0 * cell_size * cell_size).sqrt().ceil())
    }

    pub fn frequency(&self) -> i32 {
        self.update_frequency.unwrap_or(1).max(1)
    }
}

/// One row of the adjacency multiplier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacencyMultiplier {
    pub group: TransitionGroupId,
    #[serde(default)]
    pub stratum: Option<StratumId>,
    #[serde(default)]
    pub secondary_stratum: Option<StratumId>,
    #[serde(default)]
    pub tertiary_stratum: Option<StratumId>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    /// Lower bound of the neighbourhood value this row applies from.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub amount: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl AdjacencyMultiplier {
    pub fn new(group: TransitionGroupId, threshold: f64, amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            iteration: None,
            timestep: None,
            threshold,
            amount,
        }
    }
}

/// Threshold tables keyed by group and strata.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyMultipliers {
    /// (threshold, amount) sorted by threshold.
    map: KeyMap<Vec<(f64, f64)>, 4>,
    groups: BTreeSet<TransitionGroupId>,
}

impl AdjacencyMultipliers {
    pub fn build(records: &[AdjacencyMultiplier]) -> Result<Self, SpatialError> {
        let mut out = Self::default();
        for r in records {
            let key = CompositeKey::new(
                [
                    KeySegment::of(Some(r.group)),
                    KeySegment::of(r.stratum),
                    KeySegment::of(r.secondary_stratum),
                    KeySegment::of(r.tertiary_stratum),
                ],
                r.iteration,
                r.timestep,
            );
            let display = key.to_string();
            let table = out.map.get_or_insert_with(key, Vec::new);
            let pos = table.partition_point(|(t, _)| *t < r.threshold);
            if table.get(pos).is_some_and(|(t, _)| *t == r.threshold) {
                return Err(SpatialError::Duplicate {
                    key: format!("{display} threshold={}", r.threshold),
                });
            }
            table.insert(pos, (r.threshold, r.amount));
            out.groups.insert(r.group);
        }
        Ok(out)
    }

    pub fn has_group(&self, group: TransitionGroupId) -> bool {
        self.groups.contains(&group)
    }

    /// Amount of the largest threshold not above `value`. `None` when no
    /// table matches or `value` is below every threshold.
    pub fn lookup(&self, group: TransitionGroupId, cell: &Cell, value: f64, iteration: i32, timestep: i32) -> Option<f64> {
        let table = self.map.lookup(
            [
                Some(group.0),
                Some(cell.stratum.0),
                cell.secondary_stratum.map(|s| s.0),
                cell.tertiary_stratum.map(|s| s.0),
            ],
            iteration,
            timestep,
        )?;
        let pos = table.partition_point(|(t, _)| *t <= value);
        pos.checked_sub(1).map(|i| table[i].1)
    }
}

// ---------------------------------------------------------------------------
// Neighbourhood values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Neighbourhood {
    setting: AdjacencySetting,
    /// Offsets within the radius, excluding the centre.
    offsets: Vec<(i32, i32)>,
    /// Neighbourhood value per raster index.
    values: Vec<f64>,
    last_update: Option<(i32, i32)>,
}

impl Neighbourhood {
    fn is_due(&self, iteration: i32, timestep: i32) -> bool {
        match self.last_update {
            None => true,
            Some((it, ts)) => it != iteration || timestep - ts >= self.setting.frequency(),
        }
    }
}

/// Neighbourhood values of every adjacency setting, refreshed on each
/// setting's update frequency.
#[derive(Debug, Clone, Default)]
pub struct NeighbourhoodCache {
    rows: usize,
    cols: usize,
    by_group: BTreeMap<TransitionGroupId, Neighbourhood>,
}

impl NeighbourhoodCache {
    pub fn new(settings: &[AdjacencySetting], rows: usize, cols: usize, cell_size: f64) -> Result<Self, SpatialError> {
        let mut by_group = BTreeMap::new();
        for setting in settings {
            let radius = setting.radius_or_default(cell_size) / cell_size;
            let reach = radius.floor() as i32;
            let centre = GridPosition::new(0, 0);
            let mut offsets = Vec::new();
            for dr in -reach..=reach {
                for dc in -reach..=reach {
                    let pos = GridPosition::new(dr, dc);
                    if pos != centre && centre.euclidean_distance(&pos) <= radius + 1e-9 {
                        offsets.push((dr, dc));
                    }
                }
            }
            let hood = Neighbourhood {
                setting: setting.clone(),
                offsets,
                values: vec![0.0; rows * cols],
                last_update: None,
            };
            if by_group.insert(setting.group, hood).is_some() {
                return Err(SpatialError::Duplicate {
                    key: format!("adjacency setting for group {}", setting.group),
                });
            }
        }
        Ok(Self { rows, cols, by_group })
    }

    pub fn groups(&self) -> impl Iterator<Item = TransitionGroupId> + '_ {
        self.by_group.keys().copied()
    }

    pub fn has_group(&self, group: TransitionGroupId) -> bool {
        self.by_group.contains_key(&group)
    }

    /// Current neighbourhood value of a raster cell for `group`.
    pub fn value(&self, group: TransitionGroupId, index: usize) -> Option<f64> {
        self.by_group.get(&group)?.values.get(index).copied()
    }

    /// Recompute the neighbourhoods whose update is due.
    pub fn refresh(&mut self, view: &LandscapeView<'_>) {
        let (rows, cols) = (self.rows, self.cols);
        for hood in self.by_group.values_mut() {
            if !hood.is_due(view.iteration, view.timestep) {
                continue;
            }
            // Per raster index: the cell's contribution, None where no
            // cell is simulated.
            let mut measure: Vec<Option<f64>> = vec![None; rows * cols];
            for cell in view.cells.iter() {
                let index = (cell.id.0 - 1) as usize;
                if index >= measure.len() {
                    continue;
                }
                measure[index] = Some(match hood.setting.target {
                    AdjacencyTarget::StateClass(sc) => {
                        if cell.state_class == sc {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    AdjacencyTarget::StateAttribute(attr) => view.state_attribute(attr, cell).unwrap_or(0.0),
                });
            }

            for (index, value) in hood.values.iter_mut().enumerate() {
                let centre = GridPosition::from_index(index, cols);
                let (mut sum, mut count) = (0.0, 0usize);
                for &offset in &hood.offsets {
                    if let Some(i) = centre.offset(offset).index(rows, cols)
                        && let Some(m) = measure[i]
                    {
                        sum += m;
                        count += 1;
                    }
                }
                *value = if count == 0 { 0.0 } else { sum / count as f64 };
            }
            hood.last_update = Some((view.iteration, view.timestep));
            trace!(
                group = %hood.setting.group,
                iteration = view.iteration,
                timestep = view.timestep,
                "neighbourhood refreshed"
            );
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stsim_core::cell::CellCollection;
    use stsim_core::id::CellId;
    use stsim_core::test_utils::*;

    fn cell(id: i32, state_class: StateClassId) -> Cell {
        Cell::new(CellId(id), FOREST, state_class, 0)
    }

    #[test]
    fn default_radius_is_rounded_diagonal() {
        let s = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
        assert_eq!(s.radius_or_default(30.0), 43.0);
        assert_eq!(s.frequency(), 1);
    }

    #[test]
    fn lookup_takes_largest_threshold_not_above_value() {
        let records = [
            AdjacencyMultiplier::new(FIRE_GROUP, 0.5, 2.0),
            AdjacencyMultiplier::new(FIRE_GROUP, 0.0, 1.0),
            AdjacencyMultiplier::new(FIRE_GROUP, 0.8, 4.0),
        ];
        let m = AdjacencyMultipliers::build(&records).unwrap();
        let c = cell(1, YOUNG);
        assert_eq!(m.lookup(FIRE_GROUP, &c, 0.0, 1, 1), Some(1.0));
        assert_eq!(m.lookup(FIRE_GROUP, &c, 0.6, 1, 1), Some(2.0));
        assert_eq!(m.lookup(FIRE_GROUP, &c, 0.8, 1, 1), Some(4.0));
        assert_eq!(m.lookup(HARVEST_GROUP, &c, 0.8, 1, 1), None);
    }

    #[test]
    fn value_below_every_threshold_has_no_multiplier() {
        let m = AdjacencyMultipliers::build(&[AdjacencyMultiplier::new(FIRE_GROUP, 0.5, 3.0)]).unwrap();
        assert_eq!(m.lookup(FIRE_GROUP, &cell(1, YOUNG), 0.25, 1, 1), None);
    }

    #[test]
    fn stratum_specific_table_wins() {
        let mut burned = AdjacencyMultiplier::new(FIRE_GROUP, 0.0, 9.0);
        burned.stratum = Some(BURN_STRATUM);
        let m = AdjacencyMultipliers::build(&[AdjacencyMultiplier::new(FIRE_GROUP, 0.0, 1.0), burned]).unwrap();
        let mut c = cell(1, YOUNG);
        assert_eq!(m.lookup(FIRE_GROUP, &c, 0.5, 1, 1), Some(1.0));
        c.stratum = BURN_STRATUM;
        assert_eq!(m.lookup(FIRE_GROUP, &c, 0.5, 1, 1), Some(9.0));
    }

    #[test]
    fn duplicate_threshold_is_rejected() {
        let records = [
            AdjacencyMultiplier::new(FIRE_GROUP, 0.5, 1.0),
            AdjacencyMultiplier::new(FIRE_GROUP, 0.5, 2.0),
        ];
        assert!(matches!(
            AdjacencyMultipliers::build(&records),
            Err(SpatialError::Duplicate { .. })
        ));
    }

    #[test]
    fn state_class_fraction_over_queen_neighbourhood() {
        // 3x3 grid, Old in the four corners.
        let scenario = make_spatial_builder(1).build().unwrap();
        let mut cells = CellCollection::new();
        for id in 1..=9 {
            let sc = if [1, 3, 7, 9].contains(&id) { OLD } else { YOUNG };
            cells.push(cell(id, sc)).unwrap();
        }
        let values = scenario.initial_samples();
        let view = LandscapeView {
            scenario: &scenario,
            cells: &cells,
            values: &values,
            iteration: 1,
            timestep: 1,
        };

        let mut setting = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
        setting.radius = Some(1.5);
        let mut cache = NeighbourhoodCache::new(&[setting], 3, 3, 1.0).unwrap();
        cache.refresh(&view);

        // Centre: 4 of 8 neighbours are Old.
        assert_eq!(cache.value(FIRE_GROUP, 4), Some(0.5));
        // Corner (0,0): neighbours (0,1), (1,0), (1,1), none Old.
        assert_eq!(cache.value(FIRE_GROUP, 0), Some(0.0));
        // Edge (0,1): neighbours (0,0), (0,2), (1,0), (1,1), (1,2); two Old.
        assert_eq!(cache.value(FIRE_GROUP, 1), Some(0.4));
    }

    #[test]
    fn refresh_respects_update_frequency() {
        let scenario = make_spatial_builder(5).build().unwrap();
        let mut cells = CellCollection::new();
        cells.push(cell(1, OLD)).unwrap();
        cells.push(cell(2, YOUNG)).unwrap();
        let values = scenario.initial_samples();

        let mut setting = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
        setting.radius = Some(1.0);
        setting.update_frequency = Some(2);
        let mut cache = NeighbourhoodCache::new(&[setting], 1, 2, 1.0).unwrap();
        let refresh = |cache: &mut NeighbourhoodCache, cells: &CellCollection, timestep| {
            cache.refresh(&LandscapeView {
                scenario: &scenario,
                cells,
                values: &values,
                iteration: 1,
                timestep,
            });
        };

        refresh(&mut cache, &cells, 1);
        assert_eq!(cache.value(FIRE_GROUP, 1), Some(1.0));

        // Cell 1 turns Young; the timestep 2 refresh is not due yet.
        let mut young = CellCollection::new();
        young.push(cell(1, YOUNG)).unwrap();
        young.push(cell(2, YOUNG)).unwrap();
        refresh(&mut cache, &young, 2);
        assert_eq!(cache.value(FIRE_GROUP, 1), Some(1.0));
        refresh(&mut cache, &young, 3);
        assert_eq!(cache.value(FIRE_GROUP, 1), Some(0.0));
    }

    #[test]
    fn duplicate_setting_is_rejected() {
        let s = AdjacencySetting::new(FIRE_GROUP, AdjacencyTarget::StateClass(OLD));
        assert!(NeighbourhoodCache::new(&[s.clone(), s], 2, 2, 1.0).is_err());
    }
}
