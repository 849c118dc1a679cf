//! Direction and slope multipliers applied to patch spread moves.

use crate::{Direction, SpatialError};
use serde::{Deserialize, Serialize};
use stsim_core::cell::Cell;
use stsim_core::id::{StratumId, TransitionGroupId};
use stsim_core::keymap::{CompositeKey, KeyMap, KeySegment};

/// Multiplier for spreading in a compass direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionMultiplier {
    pub group: TransitionGroupId,
    #[serde(default)]
    pub stratum: Option<StratumId>,
    #[serde(default)]
    pub secondary_stratum: Option<StratumId>,
    #[serde(default)]
    pub tertiary_stratum: Option<StratumId>,
    pub direction: Direction,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub amount: f64,
}

impl DirectionMultiplier {
    pub fn new(group: TransitionGroupId, direction: Direction, amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            direction,
            iteration: None,
            timestep: None,
            amount,
        }
    }
}

/// Multiplier at a slope, in whole degrees. Positive slopes run uphill
/// from the spreading cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeMultiplier {
    pub group: TransitionGroupId,
    #[serde(default)]
    pub stratum: Option<StratumId>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub slope: i32,
    pub amount: f64,
}

impl SlopeMultiplier {
    pub fn new(group: TransitionGroupId, slope: i32, amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            iteration: None,
            timestep: None,
            slope,
            amount,
        }
    }
}

/// Slope in degrees of a move between two cell centres `distance` apart.
pub fn slope_degrees(from_elevation: f64, to_elevation: f64, distance: f64) -> f64 {
    if distance <= 0.0 {
        return 0.0;
    }
    ((to_elevation - from_elevation) / distance).atan().to_degrees()
}

/// Piecewise-linear lookup over `(slope, amount)` points sorted by slope,
/// clamped to the first and last amounts.
fn interpolate(points: &[(i32, f64)], slope: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if slope <= f64::from(first.0) {
        return Some(first.1);
    }
    if slope >= f64::from(last.0) {
        return Some(last.1);
    }
    let upper = points.partition_point(|(s, _)| f64::from(*s) < slope);
    let (s1, a1) = points[upper - 1];
    let (s2, a2) = points[upper];
    let t = (slope - f64::from(s1)) / f64::from(s2 - s1);
    Some(a1 + t * (a2 - a1))
}

#[derive(Debug, Clone, Default)]
pub struct SpreadMultipliers {
    direction: KeyMap<f64, 5>,
    slope: KeyMap<Vec<(i32, f64)>, 2>,
}

impl SpreadMultipliers {
    pub fn build(directions: &[DirectionMultiplier], slopes: &[SlopeMultiplier]) -> Result<Self, SpatialError> {
        let mut out = Self::default();
        for d in directions {
            let key = CompositeKey::new(
                [
                    KeySegment::of(Some(d.group)),
                    KeySegment::of(d.stratum),
                    KeySegment::of(d.secondary_stratum),
                    KeySegment::of(d.tertiary_stratum),
                    KeySegment::of(Some(d.direction.key())),
                ],
                d.iteration,
                d.timestep,
            );
            out.direction.insert(key, d.amount)?;
        }
        for s in slopes {
            let key = CompositeKey::new(
                [KeySegment::of(Some(s.group)), KeySegment::of(s.stratum)],
                s.iteration,
                s.timestep,
            );
            let display = key.to_string();
            let points = out.slope.get_or_insert_with(key, Vec::new);
            match points.binary_search_by_key(&s.slope, |(slope, _)| *slope) {
                Ok(_) => {
                    return Err(SpatialError::Duplicate {
                        key: format!("{display} slope={}", s.slope),
                    });
                }
                Err(pos) => points.insert(pos, (s.slope, s.amount)),
            }
        }
        Ok(out)
    }

    pub fn has_slope(&self) -> bool {
        !self.slope.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.direction.is_empty() && self.slope.is_empty()
    }

    pub fn direction_multiplier(
        &self,
        group: TransitionGroupId,
        to: &Cell,
        direction: Direction,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        self.direction
            .lookup(
                [
                    Some(group.0),
                    Some(to.stratum.0),
                    to.secondary_stratum.map(|s| s.0),
                    to.tertiary_stratum.map(|s| s.0),
                    Some(direction.key()),
                ],
                iteration,
                timestep,
            )
            .copied()
            .unwrap_or(1.0)
    }

    pub fn slope_multiplier(&self, group: TransitionGroupId, to: &Cell, slope: f64, iteration: i32, timestep: i32) -> f64 {
        self.slope
            .lookup([Some(group.0), Some(to.stratum.0)], iteration, timestep)
            .and_then(|points| interpolate(points, slope))
            .unwrap_or(1.0)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stsim_core::id::CellId;
    use stsim_core::test_utils::*;

    fn cell() -> Cell {
        Cell::new(CellId(1), FOREST, YOUNG, 0)
    }

    #[test]
    fn slope_of_flat_and_uphill_moves() {
        assert_eq!(slope_degrees(10.0, 10.0, 30.0), 0.0);
        assert!((slope_degrees(0.0, 30.0, 30.0) - 45.0).abs() < 1e-9);
        assert!((slope_degrees(30.0, 0.0, 30.0) + 45.0).abs() < 1e-9);
    }

    #[test]
    fn unmatched_direction_is_neutral() {
        let m = SpreadMultipliers::build(&[DirectionMultiplier::new(FIRE_GROUP, Direction::North, 2.0)], &[]).unwrap();
        assert_eq!(m.direction_multiplier(FIRE_GROUP, &cell(), Direction::North, 1, 1), 2.0);
        assert_eq!(m.direction_multiplier(FIRE_GROUP, &cell(), Direction::South, 1, 1), 1.0);
        assert_eq!(m.direction_multiplier(HARVEST_GROUP, &cell(), Direction::North, 1, 1), 1.0);
    }

    #[test]
    fn stratum_specific_direction_wins() {
        let mut forest = DirectionMultiplier::new(FIRE_GROUP, Direction::East, 3.0);
        forest.stratum = Some(FOREST);
        let records = [DirectionMultiplier::new(FIRE_GROUP, Direction::East, 0.5), forest];
        let m = SpreadMultipliers::build(&records, &[]).unwrap();
        assert_eq!(m.direction_multiplier(FIRE_GROUP, &cell(), Direction::East, 1, 1), 3.0);
        let burned = Cell::new(CellId(2), BURN_STRATUM, YOUNG, 0);
        assert_eq!(m.direction_multiplier(FIRE_GROUP, &burned, Direction::East, 1, 1), 0.5);
    }

    #[test]
    fn slope_interpolates_and_clamps() {
        let records = [
            SlopeMultiplier::new(FIRE_GROUP, -30, 0.5),
            SlopeMultiplier::new(FIRE_GROUP, 0, 1.0),
            SlopeMultiplier::new(FIRE_GROUP, 30, 2.0),
        ];
        let m = SpreadMultipliers::build(&[], &records).unwrap();
        let c = cell();
        assert_eq!(m.slope_multiplier(FIRE_GROUP, &c, 0.0, 1, 1), 1.0);
        assert!((m.slope_multiplier(FIRE_GROUP, &c, 15.0, 1, 1) - 1.5).abs() < 1e-12);
        assert!((m.slope_multiplier(FIRE_GROUP, &c, -15.0, 1, 1) - 0.75).abs() < 1e-12);
        assert_eq!(m.slope_multiplier(FIRE_GROUP, &c, 60.0, 1, 1), 2.0);
        assert_eq!(m.slope_multiplier(FIRE_GROUP, &c, -60.0, 1, 1), 0.5);
        assert_eq!(m.slope_multiplier(HARVEST_GROUP, &c, 10.0, 1, 1), 1.0);
    }

    #[test]
    fn duplicate_slope_point_is_rejected() {
        let records = [
            SlopeMultiplier::new(FIRE_GROUP, 10, 0.5),
            SlopeMultiplier::new(FIRE_GROUP, 10, 1.0),
        ];
        assert!(matches!(
            SpreadMultipliers::build(&[], &records),
            Err(SpatialError::Duplicate { .. })
        ));
    }

    #[test]
    fn duplicate_direction_is_rejected() {
        let records = [
            DirectionMultiplier::new(FIRE_GROUP, Direction::West, 0.5),
            DirectionMultiplier::new(FIRE_GROUP, Direction::West, 1.0),
        ];
        assert!(SpreadMultipliers::build(&records, &[]).is_err());
    }
}
