//! Transition multipliers and the external multiplier hook.
//!
//! Temporal multipliers are configured per multiplier type. Each type has
//! its own map; the multiplier for a transition type is the product, over
//! every multiplier type and every group the transition type belongs to,
//! of the resolved value (1.0 where nothing resolves).

use crate::cell::Cell;
use crate::distribution::{DistributionValue, SampledValues, ValueSlot};
use crate::id::*;
use crate::keymap::{CompositeKey, KeyMap, KeySegment, MapError};
use serde::{Deserialize, Serialize};

/// A temporal multiplier record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMultiplierValue {
    /// `None` is the default multiplier type.
    pub multiplier_type: Option<MultiplierTypeId>,
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub value: DistributionValue,
}

impl TransitionMultiplierValue {
    pub fn new(group: TransitionGroupId, value: f64) -> Self {
        Self {
            multiplier_type: None,
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            timestep: None,
            value: DistributionValue::fixed(value),
        }
    }

    fn key(&self) -> CompositeKey<5> {
        CompositeKey::new(
            [
                KeySegment::Is(self.group.0),
                KeySegment::of(self.stratum),
                KeySegment::of(self.secondary_stratum),
                KeySegment::of(self.tertiary_stratum),
                KeySegment::of(self.state_class),
            ],
            self.iteration,
            self.timestep,
        )
    }
}

/// Temporal multiplier maps, one per multiplier type, in type order.
#[derive(Debug, Clone, Default)]
pub struct TemporalMultipliers {
    maps: Vec<(Option<MultiplierTypeId>, KeyMap<ValueSlot, 5>)>,
}

impl TemporalMultipliers {
    pub(crate) fn insert(&mut self, record: &TransitionMultiplierValue, slot: ValueSlot) -> Result<(), MapError> {
        let pos = match self.maps.binary_search_by_key(&record.multiplier_type, |(t, _)| *t) {
            Ok(pos) => pos,
            Err(pos) => {
                self.maps.insert(pos, (record.multiplier_type, KeyMap::new()));
                pos
            }
        };
        self.maps[pos].1.insert(record.key(), slot)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Product of every resolved multiplier for a transition whose type
    /// belongs to `groups`.
    pub fn multiplier(
        &self,
        groups: &[TransitionGroupId],
        cell: &Cell,
        iteration: i32,
        timestep: i32,
        values: &SampledValues,
    ) -> f64 {
        let mut product = 1.0;
        for (_, map) in &self.maps {
            for group in groups {
                let dims = [
                    Some(group.0),
                    Some(cell.stratum.0),
                    cell.secondary_stratum.map(|s| s.0),
                    cell.tertiary_stratum.map(|s| s.0),
                    Some(cell.state_class.0),
                ];
                if let Some(&slot) = map.lookup(dims, iteration, timestep) {
                    product *= values.get(slot);
                }
            }
        }
        product
    }
}

/// Caller-supplied multipliers, applied at fixed points of the chain.
/// Both default to a neutral 1.0.
pub trait ExternalMultiplier {
    fn transition_multiplier(
        &self,
        _transition_type: TransitionTypeId,
        _cell: &Cell,
        _iteration: i32,
        _timestep: i32,
    ) -> f64 {
        1.0
    }

    fn spatial_multiplier(
        &self,
        _group: TransitionGroupId,
        _cell: &Cell,
        _iteration: i32,
        _timestep: i32,
    ) -> f64 {
        1.0
    }
}

/// The weight of one candidate transition for a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    /// `probability × proportion × composed multiplier`.
    pub value: f64,
    /// A probability override of 1.0 applies to this candidate.
    pub force: bool,
}

impl Weight {
    pub fn forced() -> Self {
        Self {
            value: 0.0,
            force: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> Cell {
        Cell::new(CellId(1), StratumId(1), StateClassId(2), 0)
    }

    #[test]
    fn unconfigured_multiplier_is_neutral() {
        let m = TemporalMultipliers::default();
        let values = SampledValues::new(&[]);
        assert_eq!(m.multiplier(&[TransitionGroupId(1)], &cell(), 1, 1, &values), 1.0);
    }

    #[test]
    fn product_over_types_and_groups() {
        let mut m = TemporalMultipliers::default();
        let a = TransitionMultiplierValue::new(TransitionGroupId(1), 0.5);
        let mut b = TransitionMultiplierValue::new(TransitionGroupId(2), 0.4);
        b.multiplier_type = Some(MultiplierTypeId(3));
        let c = TransitionMultiplierValue::new(TransitionGroupId(2), 2.0);
        m.insert(&a, ValueSlot(0)).unwrap();
        m.insert(&b, ValueSlot(1)).unwrap();
        m.insert(&c, ValueSlot(2)).unwrap();
        let values = SampledValues::new(&[a.value, b.value, c.value]);

        let groups = [TransitionGroupId(1), TransitionGroupId(2)];
        let got = m.multiplier(&groups, &cell(), 1, 1, &values);
        assert!((got - 0.5 * 2.0 * 0.4).abs() < 1e-12);
    }

    #[test]
    fn timestep_specific_record_applies_only_then() {
        let mut m = TemporalMultipliers::default();
        let mut r = TransitionMultiplierValue::new(TransitionGroupId(1), 0.0);
        r.timestep = Some(5);
        m.insert(&r, ValueSlot(0)).unwrap();
        let values = SampledValues::new(&[r.value]);
        assert_eq!(m.multiplier(&[TransitionGroupId(1)], &cell(), 1, 5, &values), 0.0);
        assert_eq!(m.multiplier(&[TransitionGroupId(1)], &cell(), 1, 6, &values), 1.0);
    }

    #[test]
    fn duplicate_record_rejected() {
        let mut m = TemporalMultipliers::default();
        let r = TransitionMultiplierValue::new(TransitionGroupId(1), 0.5);
        m.insert(&r, ValueSlot(0)).unwrap();
        assert!(m.insert(&r, ValueSlot(1)).is_err());
    }
}
