//! State and transition attribute values.
//!
//! Attribute values attach a per-cell quantity to a cell's state (state
//! attributes) or to a firing transition (transition attributes). Several
//! records may share a key and differ only in their age window; a lookup
//! returns the first record whose window contains the cell's age.

use crate::ages::UNBOUNDED;
use crate::distribution::{DistributionValue, SampledValues, ValueSlot};
use crate::id::*;
use crate::keymap::{CompositeKey, KeyMap, KeySegment};
use serde::{Deserialize, Serialize};

/// A value attached to cells in a given state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAttributeValue {
    pub attribute_type: AttributeTypeId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub age_min: i32,
    pub age_max: i32,
    pub value: DistributionValue,
}

impl StateAttributeValue {
    pub fn new(attribute_type: AttributeTypeId, value: f64) -> Self {
        Self {
            attribute_type,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            timestep: None,
            age_min: 0,
            age_max: UNBOUNDED,
            value: DistributionValue::fixed(value),
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<5> {
        CompositeKey::new(
            [
                KeySegment::Is(self.attribute_type.0),
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

/// A value produced when a transition of a group fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAttributeValue {
    pub attribute_type: AttributeTypeId,
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub age_min: i32,
    pub age_max: i32,
    pub value: DistributionValue,
}

impl TransitionAttributeValue {
    pub fn new(attribute_type: AttributeTypeId, group: TransitionGroupId, value: f64) -> Self {
        Self {
            attribute_type,
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            timestep: None,
            age_min: 0,
            age_max: UNBOUNDED,
            value: DistributionValue::fixed(value),
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<6> {
        CompositeKey::new(
            [
                KeySegment::Is(self.attribute_type.0),
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

// ---------------------------------------------------------------------------
// Age-bounded lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct AgeBounded {
    age_min: i32,
    age_max: i32,
    slot: ValueSlot,
}

/// Attribute records sharing one key, each with its own age window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgeBoundedValues {
    records: Vec<AgeBounded>,
}

impl AgeBoundedValues {
    pub(crate) fn push(&mut self, age_min: i32, age_max: i32, slot: ValueSlot) {
        self.records.push(AgeBounded {
            age_min,
            age_max,
            slot,
        });
    }

    /// Slot of the first record whose window holds `age`.
    pub fn slot_for_age(&self, age: i32) -> Option<ValueSlot> {
        self.records
            .iter()
            .find(|r| age >= r.age_min && age <= r.age_max)
            .map(|r| r.slot)
    }

    /// Whether two records of this key have overlapping age windows.
    pub(crate) fn has_overlap(&self) -> bool {
        self.records.iter().enumerate().any(|(i, a)| {
            self.records[i + 1..]
                .iter()
                .any(|b| a.age_min <= b.age_max && b.age_min <= a.age_max)
        })
    }
}

/// Attribute lookup table: `N` key dimensions to age-bounded records.
pub type AttributeValueMap<const N: usize> = KeyMap<AgeBoundedValues, N>;

/// Resolve an attribute value for a query, returning the current sample.
pub fn lookup_attribute<const N: usize>(
    map: &AttributeValueMap<N>,
    dims: [Option<i32>; N],
    iteration: i32,
    timestep: i32,
    age: i32,
    values: &SampledValues,
) -> Option<f64> {
    map.lookup(dims, iteration, timestep)
        .and_then(|records| records.slot_for_age(age))
        .map(|slot| values.get(slot))
}
