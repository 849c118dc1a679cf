//! Scenario assembly: configuration records to immutable lookup maps.
//!
//! [`ScenarioBuilder`] collects records in any order. [`ScenarioBuilder::build`]
//! validates every record against the [`Registry`], assigns value slots to
//! stochastic fields, and fills the configuration maps. The resulting
//! [`Scenario`] only exposes queries and is shared read-only by every
//! iteration of a run.

use crate::attribute::{
    AgeBoundedValues, AttributeValueMap, StateAttributeValue, TransitionAttributeValue, lookup_attribute,
};
use crate::cell::Cell;
use crate::config::{InitialConditions, RunControl};
use crate::distribution::{DistributionProvider, DistributionValue, SampledValues, ValueSlot};
use crate::error::{ConfigError, ConsistencyWarning};
use crate::id::*;
use crate::keymap::{CompositeKey, KeyMap, KeySegment, MapError};
use crate::multiplier::{TemporalMultipliers, TransitionMultiplierValue};
use crate::patch::{
    PatchPrioritizationKind, SizeClasses, SizeDistributionMap, SpreadDistributionMap, TransitionPatchPrioritization,
    TransitionSizeDistribution, TransitionSizePrioritization, TransitionSpreadDistribution,
};
use crate::registry::Registry;
use crate::rng::SimRng;
use crate::target::{
    TransitionAttributeTarget, TransitionAttributeTargetPrioritization, TransitionTarget,
    TransitionTargetPrioritization,
};
use crate::transition::{DeterministicTransition, Transition, TransitionOrder, TstGroup, TstRandomize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

pub const DETERMINISTIC_TRANSITIONS: &str = "Deterministic Transitions";
pub const PROBABILISTIC_TRANSITIONS: &str = "Probabilistic Transitions";
pub const TRANSITION_ORDER: &str = "Transition Order";
pub const TST_GROUPS: &str = "Time Since Transition Groups";
pub const TST_RANDOMIZE: &str = "Time Since Transition Randomize";
pub const MULTIPLIER_VALUES: &str = "Transition Multiplier Values";
pub const TRANSITION_TARGETS: &str = "Transition Targets";
pub const TARGET_PRIORITIZATIONS: &str = "Transition Target Prioritizations";
pub const ATTRIBUTE_TARGETS: &str = "Transition Attribute Targets";
pub const ATTRIBUTE_TARGET_PRIORITIZATIONS: &str = "Transition Attribute Target Prioritizations";
pub const STATE_ATTRIBUTE_VALUES: &str = "State Attribute Values";
pub const TRANSITION_ATTRIBUTE_VALUES: &str = "Transition Attribute Values";
pub const SIZE_DISTRIBUTIONS: &str = "Transition Size Distributions";
pub const SIZE_PRIORITIZATIONS: &str = "Transition Size Prioritizations";
pub const PATCH_PRIORITIZATIONS: &str = "Transition Patch Prioritizations";
pub const SPREAD_DISTRIBUTIONS: &str = "Transition Spread Distributions";

fn duplicate(table: &str, err: MapError) -> ConfigError {
    match err {
        MapError::Duplicate { key } => ConfigError::Duplicate {
            table: table.to_string(),
            key,
        },
    }
}

fn strata_dims(cell: &Cell) -> [Option<i32>; 3] {
    [
        Some(cell.stratum.0),
        cell.secondary_stratum.map(|s| s.0),
        cell.tertiary_stratum.map(|s| s.0),
    ]
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects configuration records for a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    registry: Registry,
    run_control: RunControl,
    initial_conditions: Option<InitialConditions>,
    provider: DistributionProvider,
    transitions: Vec<Transition>,
    deterministic: Vec<DeterministicTransition>,
    orders: Vec<TransitionOrder>,
    tst_groups: Vec<TstGroup>,
    tst_randomize: Vec<TstRandomize>,
    multipliers: Vec<TransitionMultiplierValue>,
    targets: Vec<TransitionTarget>,
    prioritizations: Vec<TransitionTargetPrioritization>,
    attribute_targets: Vec<TransitionAttributeTarget>,
    attribute_prioritizations: Vec<TransitionAttributeTargetPrioritization>,
    state_attributes: Vec<StateAttributeValue>,
    transition_attributes: Vec<TransitionAttributeValue>,
    size_distributions: Vec<TransitionSizeDistribution>,
    size_prioritizations: Vec<TransitionSizePrioritization>,
    patch_prioritizations: Vec<TransitionPatchPrioritization>,
    spread_distributions: Vec<TransitionSpreadDistribution>,
}

impl ScenarioBuilder {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            run_control: RunControl::default(),
            initial_conditions: None,
            provider: DistributionProvider::new(),
            transitions: Vec::new(),
            deterministic: Vec::new(),
            orders: Vec::new(),
            tst_groups: Vec::new(),
            tst_randomize: Vec::new(),
            multipliers: Vec::new(),
            targets: Vec::new(),
            prioritizations: Vec::new(),
            attribute_targets: Vec::new(),
            attribute_prioritizations: Vec::new(),
            state_attributes: Vec::new(),
            transition_attributes: Vec::new(),
            size_distributions: Vec::new(),
            size_prioritizations: Vec::new(),
            patch_prioritizations: Vec::new(),
            spread_distributions: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn run_control(&mut self, run_control: RunControl) -> &mut Self {
        self.run_control = run_control;
        self
    }

    pub fn initial_conditions(&mut self, initial_conditions: InitialConditions) -> &mut Self {
        self.initial_conditions = Some(initial_conditions);
        self
    }

    pub fn distribution_provider(&mut self, provider: DistributionProvider) -> &mut Self {
        self.provider = provider;
        self
    }

    pub fn add_transition(&mut self, t: Transition) -> &mut Self {
        self.transitions.push(t);
        self
    }

    pub fn add_deterministic(&mut self, dt: DeterministicTransition) -> &mut Self {
        self.deterministic.push(dt);
        self
    }

    pub fn add_transition_order(&mut self, order: TransitionOrder) -> &mut Self {
        self.orders.push(order);
        self
    }

    pub fn add_tst_group(&mut self, g: TstGroup) -> &mut Self {
        self.tst_groups.push(g);
        self
    }

    pub fn add_tst_randomize(&mut self, r: TstRandomize) -> &mut Self {
        self.tst_randomize.push(r);
        self
    }

    pub fn add_multiplier(&mut self, m: TransitionMultiplierValue) -> &mut Self {
        self.multipliers.push(m);
        self
    }

    pub fn add_target(&mut self, t: TransitionTarget) -> &mut Self {
        self.targets.push(t);
        self
    }

    pub fn add_prioritization(&mut self, p: TransitionTargetPrioritization) -> &mut Self {
        self.prioritizations.push(p);
        self
    }

    pub fn add_attribute_target(&mut self, t: TransitionAttributeTarget) -> &mut Self {
        self.attribute_targets.push(t);
        self
    }

    pub fn add_attribute_prioritization(&mut self, p: TransitionAttributeTargetPrioritization) -> &mut Self {
        self.attribute_prioritizations.push(p);
        self
    }

    pub fn add_state_attribute(&mut self, v: StateAttributeValue) -> &mut Self {
        self.state_attributes.push(v);
        self
    }

    pub fn add_transition_attribute(&mut self, v: TransitionAttributeValue) -> &mut Self {
        self.transition_attributes.push(v);
        self
    }

    pub fn add_size_distribution(&mut self, s: TransitionSizeDistribution) -> &mut Self {
        self.size_distributions.push(s);
        self
    }

    pub fn add_size_prioritization(&mut self, p: TransitionSizePrioritization) -> &mut Self {
        self.size_prioritizations.push(p);
        self
    }

    pub fn add_patch_prioritization(&mut self, p: TransitionPatchPrioritization) -> &mut Self {
        self.patch_prioritizations.push(p);
        self
    }

    pub fn add_spread_distribution(&mut self, d: TransitionSpreadDistribution) -> &mut Self {
        self.spread_distributions.push(d);
        self
    }

    // -----------------------------------------------------------------------
    // Reference checks
    // -----------------------------------------------------------------------

    fn check_stratum(&self, table: &str, id: Option<StratumId>) -> Result<(), ConfigError> {
        match id {
            Some(s) if !self.registry.has_stratum(s) => Err(ConfigError::UnknownReference {
                table: table.to_string(),
                kind: "stratum",
                id: s.0,
            }),
            _ => Ok(()),
        }
    }

    fn check_state_class(&self, table: &str, id: Option<StateClassId>) -> Result<(), ConfigError> {
        match id {
            Some(s) if !self.registry.has_state_class(s) => Err(ConfigError::UnknownReference {
                table: table.to_string(),
                kind: "state class",
                id: s.0,
            }),
            _ => Ok(()),
        }
    }

    fn check_type(&self, table: &str, id: TransitionTypeId) -> Result<(), ConfigError> {
        if self.registry.has_transition_type(id) {
            Ok(())
        } else {
            Err(ConfigError::UnknownReference {
                table: table.to_string(),
                kind: "transition type",
                id: id.0,
            })
        }
    }

    fn check_group(&self, table: &str, id: TransitionGroupId) -> Result<(), ConfigError> {
        if self.registry.group(id).is_some() {
            Ok(())
        } else {
            Err(ConfigError::UnknownReference {
                table: table.to_string(),
                kind: "transition group",
                id: id.0,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Validate every record and freeze the scenario.
    pub fn build(self) -> Result<Scenario, ConfigError> {
        self.run_control.validate()?;
        if !self.run_control.is_spatial {
            match &self.initial_conditions {
                Some(ic) => ic.validate()?,
                None => {
                    return Err(ConfigError::MissingRequired {
                        table: "Initial Conditions Non Spatial".into(),
                        detail: "a non-spatial run needs initial conditions".into(),
                    });
                }
            }
        }
        if let Some(ic) = &self.initial_conditions {
            for row in &ic.rows {
                self.check_stratum("Initial Conditions Non Spatial Distribution", Some(row.stratum))?;
                self.check_state_class("Initial Conditions Non Spatial Distribution", Some(row.state_class))?;
            }
        }

        let mut warnings: Vec<ConsistencyWarning> = self.registry.warnings().to_vec();
        let mut values: Vec<DistributionValue> = Vec::new();
        let mut slot_for = |table: &str, v: &DistributionValue, provider: &DistributionProvider| {
            provider.validate(table, v)?;
            values.push(*v);
            Ok::<ValueSlot, ConfigError>(ValueSlot(values.len() as u32 - 1))
        };

        // Probabilistic transitions.
        let mut transition_map: KeyMap<Vec<usize>, 2> = KeyMap::new();
        for (i, t) in self.transitions.iter().enumerate() {
            t.validate(PROBABILISTIC_TRANSITIONS)?;
            self.check_stratum(PROBABILISTIC_TRANSITIONS, t.stratum_source)?;
            self.check_stratum(PROBABILISTIC_TRANSITIONS, t.stratum_dest)?;
            self.check_state_class(PROBABILISTIC_TRANSITIONS, Some(t.state_class_source))?;
            self.check_state_class(PROBABILISTIC_TRANSITIONS, t.state_class_dest)?;
            self.check_type(PROBABILISTIC_TRANSITIONS, t.transition_type)?;
            let key = CompositeKey::new(
                [KeySegment::of(t.stratum_source), KeySegment::Is(t.state_class_source.0)],
                t.iteration,
                t.timestep,
            );
            transition_map.get_or_insert_with(key, Vec::new).push(i);
        }

        // Deterministic transitions.
        let mut dt_map: KeyMap<usize, 2> = KeyMap::new();
        for (i, dt) in self.deterministic.iter().enumerate() {
            self.check_stratum(DETERMINISTIC_TRANSITIONS, dt.stratum_source)?;
            self.check_stratum(DETERMINISTIC_TRANSITIONS, dt.stratum_dest)?;
            self.check_state_class(DETERMINISTIC_TRANSITIONS, Some(dt.state_class_source))?;
            self.check_state_class(DETERMINISTIC_TRANSITIONS, Some(dt.state_class_dest))?;
            if dt.age_min > dt.age_max || dt.age_min < 0 {
                return Err(ConfigError::Invalid {
                    table: DETERMINISTIC_TRANSITIONS.into(),
                    detail: format!("invalid age window {}..={}", dt.age_min, dt.age_max),
                });
            }
            let key = CompositeKey::new(
                [KeySegment::of(dt.stratum_source), KeySegment::Is(dt.state_class_source.0)],
                dt.iteration,
                dt.timestep,
            );
            dt_map
                .insert(key, i)
                .map_err(|e| duplicate(DETERMINISTIC_TRANSITIONS, e))?;
        }

        // Transition order.
        let mut order_map: KeyMap<Vec<(TransitionGroupId, f64)>, 0> = KeyMap::new();
        for o in &self.orders {
            self.check_group(TRANSITION_ORDER, o.group)?;
            if !self.registry.primary_groups().contains(&o.group) {
                let w = ConsistencyWarning::OrderForNonPrimaryGroup { group: o.group };
                warn!(group = %o.group, "{w}");
                warnings.push(w);
                continue;
            }
            let entry = order_map.get_or_insert_with(CompositeKey::new([], o.iteration, o.timestep), Vec::new);
            if entry.iter().any(|(g, _)| *g == o.group) {
                return Err(ConfigError::Duplicate {
                    table: TRANSITION_ORDER.into(),
                    key: format!("group {}", o.group),
                });
            }
            entry.push((o.group, o.order));
        }

        // TST groups and randomization.
        let mut tst_group_map: KeyMap<TransitionGroupId, 4> = KeyMap::new();
        let mut tst_tracked: BTreeSet<TransitionGroupId> = BTreeSet::new();
        for g in &self.tst_groups {
            self.check_type(TST_GROUPS, g.transition_type)?;
            self.check_group(TST_GROUPS, g.group)?;
            self.check_stratum(TST_GROUPS, g.stratum)?;
            let key = CompositeKey::new(
                [
                    KeySegment::Is(g.transition_type.0),
                    KeySegment::of(g.stratum),
                    KeySegment::of(g.secondary_stratum),
                    KeySegment::of(g.tertiary_stratum),
                ],
                None,
                None,
            );
            tst_group_map.insert(key, g.group).map_err(|e| duplicate(TST_GROUPS, e))?;
            tst_tracked.insert(g.group);
        }
        if self.tst_groups.is_empty() {
            tst_tracked.extend(self.registry.primary_groups().iter().copied());
        }

        let mut tst_randomize_map: KeyMap<(i32, i32), 5> = KeyMap::new();
        for r in &self.tst_randomize {
            if r.min > r.max || r.min < 0 {
                return Err(ConfigError::Invalid {
                    table: TST_RANDOMIZE.into(),
                    detail: format!("invalid range {}..={}", r.min, r.max),
                });
            }
            if let Some(g) = r.group {
                self.check_group(TST_RANDOMIZE, g)?;
            }
            self.check_stratum(TST_RANDOMIZE, r.stratum)?;
            self.check_state_class(TST_RANDOMIZE, r.state_class)?;
            let key = CompositeKey::new(
                [
                    KeySegment::of(r.group),
                    KeySegment::of(r.stratum),
                    KeySegment::of(r.secondary_stratum),
                    KeySegment::of(r.tertiary_stratum),
                    KeySegment::of(r.state_class),
                ],
                r.iteration,
                None,
            );
            tst_randomize_map
                .insert(key, (r.min, r.max))
                .map_err(|e| duplicate(TST_RANDOMIZE, e))?;
        }

        // Temporal multipliers.
        let mut multipliers = TemporalMultipliers::default();
        for m in &self.multipliers {
            self.check_group(MULTIPLIER_VALUES, m.group)?;
            self.check_stratum(MULTIPLIER_VALUES, m.stratum)?;
            self.check_state_class(MULTIPLIER_VALUES, m.state_class)?;
            let slot = slot_for(MULTIPLIER_VALUES, &m.value, &self.provider)?;
            multipliers
                .insert(m, slot)
                .map_err(|e| duplicate(MULTIPLIER_VALUES, e))?;
        }

        // Targets.
        let mut targets = Vec::with_capacity(self.targets.len());
        let mut target_map: KeyMap<usize, 4> = KeyMap::new();
        for (i, t) in self.targets.iter().enumerate() {
            self.check_group(TRANSITION_TARGETS, t.group)?;
            self.check_stratum(TRANSITION_TARGETS, t.stratum)?;
            let slot = if t.is_disabled() {
                None
            } else {
                Some(slot_for(TRANSITION_TARGETS, &t.amount, &self.provider)?)
            };
            targets.push(slot);
            target_map
                .insert(t.key(), i)
                .map_err(|e| duplicate(TRANSITION_TARGETS, e))?;
        }

        let mut prioritization_maps: HashMap<TransitionGroupId, KeyMap<usize, 4>> = HashMap::new();
        for (i, p) in self.prioritizations.iter().enumerate() {
            p.validate(TARGET_PRIORITIZATIONS)?;
            self.check_group(TARGET_PRIORITIZATIONS, p.group)?;
            self.check_stratum(TARGET_PRIORITIZATIONS, p.stratum)?;
            self.check_state_class(TARGET_PRIORITIZATIONS, p.state_class)?;
            prioritization_maps
                .entry(p.group)
                .or_default()
                .insert(p.key(), i)
                .map_err(|e| duplicate(TARGET_PRIORITIZATIONS, e))?;
        }

        // Attribute targets.
        let mut attribute_targets = Vec::with_capacity(self.attribute_targets.len());
        let mut attribute_target_map: KeyMap<usize, 4> = KeyMap::new();
        for (i, t) in self.attribute_targets.iter().enumerate() {
            self.check_stratum(ATTRIBUTE_TARGETS, t.stratum)?;
            let slot = if t.is_disabled() {
                None
            } else {
                Some(slot_for(ATTRIBUTE_TARGETS, &t.amount, &self.provider)?)
            };
            attribute_targets.push(slot);
            attribute_target_map
                .insert(t.key(), i)
                .map_err(|e| duplicate(ATTRIBUTE_TARGETS, e))?;
        }

        let mut attribute_prioritization_map: KeyMap<usize, 5> = KeyMap::new();
        for (i, p) in self.attribute_prioritizations.iter().enumerate() {
            p.validate(ATTRIBUTE_TARGET_PRIORITIZATIONS)?;
            self.check_stratum(ATTRIBUTE_TARGET_PRIORITIZATIONS, p.stratum)?;
            self.check_state_class(ATTRIBUTE_TARGET_PRIORITIZATIONS, p.state_class)?;
            attribute_prioritization_map
                .insert(p.key(), i)
                .map_err(|e| duplicate(ATTRIBUTE_TARGET_PRIORITIZATIONS, e))?;
        }

        // Attribute values.
        let mut state_attributes: AttributeValueMap<5> = KeyMap::new();
        let mut state_attribute_types: BTreeSet<AttributeTypeId> = BTreeSet::new();
        for v in &self.state_attributes {
            self.check_stratum(STATE_ATTRIBUTE_VALUES, v.stratum)?;
            self.check_state_class(STATE_ATTRIBUTE_VALUES, v.state_class)?;
            let slot = slot_for(STATE_ATTRIBUTE_VALUES, &v.value, &self.provider)?;
            let records = state_attributes.get_or_insert_with(v.key(), AgeBoundedValues::default);
            records.push(v.age_min, v.age_max, slot);
            if records.has_overlap() {
                return Err(ConfigError::Duplicate {
                    table: STATE_ATTRIBUTE_VALUES.into(),
                    key: format!("{} ages {}..={}", v.key(), v.age_min, v.age_max),
                });
            }
            state_attribute_types.insert(v.attribute_type);
        }

        let mut transition_attributes: AttributeValueMap<6> = KeyMap::new();
        let mut group_attribute_types: HashMap<TransitionGroupId, Vec<AttributeTypeId>> = HashMap::new();
        for v in &self.transition_attributes {
            self.check_group(TRANSITION_ATTRIBUTE_VALUES, v.group)?;
            self.check_stratum(TRANSITION_ATTRIBUTE_VALUES, v.stratum)?;
            self.check_state_class(TRANSITION_ATTRIBUTE_VALUES, v.state_class)?;
            let slot = slot_for(TRANSITION_ATTRIBUTE_VALUES, &v.value, &self.provider)?;
            let records = transition_attributes.get_or_insert_with(v.key(), AgeBoundedValues::default);
            records.push(v.age_min, v.age_max, slot);
            if records.has_overlap() {
                return Err(ConfigError::Duplicate {
                    table: TRANSITION_ATTRIBUTE_VALUES.into(),
                    key: format!("{} ages {}..={}", v.key(), v.age_min, v.age_max),
                });
            }
            let types = group_attribute_types.entry(v.group).or_default();
            if !types.contains(&v.attribute_type) {
                types.push(v.attribute_type);
                types.sort();
            }
        }

        // Patch size distributions.
        let mut size_distributions: SizeDistributionMap = KeyMap::new();
        let mut size_groups: BTreeSet<TransitionGroupId> = BTreeSet::new();
        for s in &self.size_distributions {
            s.validate(SIZE_DISTRIBUTIONS)?;
            self.check_group(SIZE_DISTRIBUTIONS, s.group)?;
            self.check_stratum(SIZE_DISTRIBUTIONS, s.stratum)?;
            size_distributions
                .get_or_insert_with(s.key(), SizeClasses::default)
                .push(s.max_area, s.relative_amount);
            size_groups.insert(s.group);
        }

        let mut size_prioritizations: KeyMap<usize, 2> = KeyMap::new();
        for (i, p) in self.size_prioritizations.iter().enumerate() {
            if let Some(g) = p.group {
                self.check_group(SIZE_PRIORITIZATIONS, g)?;
            }
            self.check_stratum(SIZE_PRIORITIZATIONS, p.stratum)?;
            size_prioritizations
                .insert(p.key(), i)
                .map_err(|e| duplicate(SIZE_PRIORITIZATIONS, e))?;
        }

        let mut patch_prioritizations: KeyMap<PatchPrioritizationKind, 1> = KeyMap::new();
        for p in &self.patch_prioritizations {
            self.check_group(PATCH_PRIORITIZATIONS, p.group)?;
            patch_prioritizations
                .insert(p.key(), p.kind)
                .map_err(|e| duplicate(PATCH_PRIORITIZATIONS, e))?;
        }

        // Spread distance classes.
        let mut spread_distributions: SpreadDistributionMap = KeyMap::new();
        for d in &self.spread_distributions {
            d.validate(SPREAD_DISTRIBUTIONS)?;
            self.check_group(SPREAD_DISTRIBUTIONS, d.group)?;
            self.check_stratum(SPREAD_DISTRIBUTIONS, d.stratum)?;
            self.check_state_class(SPREAD_DISTRIBUTIONS, Some(d.state_class))?;
            spread_distributions
                .get_or_insert_with(d.key(), SizeClasses::default)
                .push(d.max_distance, d.relative_amount);
        }

        debug!(
            transitions = self.transitions.len(),
            deterministic = self.deterministic.len(),
            values = values.len(),
            warnings = warnings.len(),
            "scenario built"
        );

        Ok(Scenario {
            registry: self.registry,
            run_control: self.run_control,
            initial_conditions: self.initial_conditions,
            provider: self.provider,
            values,
            transitions: self.transitions,
            transition_map,
            deterministic: self.deterministic,
            dt_map,
            order_map,
            tst_group_map,
            tst_tracked: tst_tracked.into_iter().collect(),
            tst_randomize_map,
            multipliers,
            targets,
            target_map,
            prioritizations: self.prioritizations,
            prioritization_maps,
            attribute_targets,
            attribute_target_map,
            attribute_prioritizations: self.attribute_prioritizations,
            attribute_prioritization_map,
            state_attributes,
            state_attribute_types: state_attribute_types.into_iter().collect(),
            transition_attributes,
            group_attribute_types,
            size_distributions,
            size_groups: size_groups.into_iter().collect(),
            size_prioritizations: self.size_prioritizations,
            size_prioritization_map: size_prioritizations,
            patch_prioritizations,
            spread_distributions,
            warnings,
        })
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A validated, immutable scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    registry: Registry,
    run_control: RunControl,
    initial_conditions: Option<InitialConditions>,
    provider: DistributionProvider,
    values: Vec<DistributionValue>,
    transitions: Vec<Transition>,
    transition_map: KeyMap<Vec<usize>, 2>,
    deterministic: Vec<DeterministicTransition>,
    dt_map: KeyMap<usize, 2>,
    order_map: KeyMap<Vec<(TransitionGroupId, f64)>, 0>,
    tst_group_map: KeyMap<TransitionGroupId, 4>,
    tst_tracked: Vec<TransitionGroupId>,
    tst_randomize_map: KeyMap<(i32, i32), 5>,
    multipliers: TemporalMultipliers,
    /// `None` for a disabled target.
    targets: Vec<Option<ValueSlot>>,
    target_map: KeyMap<usize, 4>,
    prioritizations: Vec<TransitionTargetPrioritization>,
    prioritization_maps: HashMap<TransitionGroupId, KeyMap<usize, 4>>,
    attribute_targets: Vec<Option<ValueSlot>>,
    attribute_target_map: KeyMap<usize, 4>,
    attribute_prioritizations: Vec<TransitionAttributeTargetPrioritization>,
    attribute_prioritization_map: KeyMap<usize, 5>,
    state_attributes: AttributeValueMap<5>,
    state_attribute_types: Vec<AttributeTypeId>,
    transition_attributes: AttributeValueMap<6>,
    group_attribute_types: HashMap<TransitionGroupId, Vec<AttributeTypeId>>,
    size_distributions: SizeDistributionMap,
    size_groups: Vec<TransitionGroupId>,
    size_prioritizations: Vec<TransitionSizePrioritization>,
    size_prioritization_map: KeyMap<usize, 2>,
    patch_prioritizations: KeyMap<PatchPrioritizationKind, 1>,
    spread_distributions: SpreadDistributionMap,
    warnings: Vec<ConsistencyWarning>,
}

impl Scenario {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn run_control(&self) -> &RunControl {
        &self.run_control
    }

    pub fn initial_conditions(&self) -> Option<&InitialConditions> {
        self.initial_conditions.as_ref()
    }

    pub fn provider(&self) -> &DistributionProvider {
        &self.provider
    }

    /// Every stochastic value, indexed by slot.
    pub fn values(&self) -> &[DistributionValue] {
        &self.values
    }

    /// Fresh samples table holding each value's initial sample.
    pub fn initial_samples(&self) -> SampledValues {
        SampledValues::new(&self.values)
    }

    pub fn warnings(&self) -> &[ConsistencyWarning] {
        &self.warnings
    }

    // -- Transitions --

    pub fn transition(&self, index: usize) -> &Transition {
        &self.transitions[index]
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Indices of the pathways configured for a stratum and state class.
    pub fn transitions_for(&self, stratum: StratumId, state_class: StateClassId, iteration: i32, timestep: i32) -> &[usize] {
        self.transition_map
            .lookup([Some(stratum.0), Some(state_class.0)], iteration, timestep)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn deterministic_for(
        &self,
        stratum: StratumId,
        state_class: StateClassId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&DeterministicTransition> {
        self.dt_map
            .lookup([Some(stratum.0), Some(state_class.0)], iteration, timestep)
            .map(|&i| &self.deterministic[i])
    }

    /// Age window of a state; `None` when no deterministic transition
    /// exists for it.
    pub fn age_window(&self, stratum: StratumId, state_class: StateClassId, iteration: i32, timestep: i32) -> Option<(i32, i32)> {
        self.deterministic_for(stratum, state_class, iteration, timestep)
            .map(|dt| (dt.age_min, dt.age_max))
    }

    /// Primary groups in processing order for a timestep: shuffled, then
    /// stably sorted by configured order, unordered groups last.
    pub fn ordered_groups(&self, iteration: i32, timestep: i32, rng: &mut SimRng) -> Vec<TransitionGroupId> {
        let mut groups: Vec<TransitionGroupId> = self
            .registry
            .primary_groups()
            .iter()
            .copied()
            .filter(|g| !self.registry.primary_types(*g).is_empty())
            .collect();
        rng.shuffle(&mut groups);
        if let Some(orders) = self.order_map.lookup([], iteration, timestep) {
            let order_of = |g: &TransitionGroupId| {
                orders
                    .iter()
                    .find(|(og, _)| og == g)
                    .map_or(f64::INFINITY, |(_, o)| *o)
            };
            groups.sort_by(|a, b| order_of(a).total_cmp(&order_of(b)));
        }
        groups
    }

    // -- Time since transition --

    /// Groups that carry a TST counter on every cell.
    pub fn tst_tracked_groups(&self) -> &[TransitionGroupId] {
        &self.tst_tracked
    }

    /// Groups whose TST a transition type reads and updates for a cell.
    pub fn tst_groups_for(&self, transition_type: TransitionTypeId, cell: &Cell) -> Vec<TransitionGroupId> {
        if self.tst_group_map.is_empty() {
            return self.registry.primary_groups_for_type(transition_type).to_vec();
        }
        let [s, sec, ter] = strata_dims(cell);
        self.tst_group_map
            .lookup([Some(transition_type.0), s, sec, ter], 0, 0)
            .map(|g| vec![*g])
            .unwrap_or_default()
    }

    /// Initial TST range for a group on a cell. Defaults to zero.
    pub fn tst_initial_range(&self, group: TransitionGroupId, cell: &Cell, iteration: i32) -> (i32, i32) {
        let [s, sec, ter] = strata_dims(cell);
        self.tst_randomize_map
            .lookup([Some(group.0), s, sec, ter, Some(cell.state_class.0)], iteration, 0)
            .copied()
            .unwrap_or((0, 0))
    }

    // -- Multipliers --

    pub fn temporal_multiplier(
        &self,
        transition_type: TransitionTypeId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
        values: &SampledValues,
    ) -> f64 {
        if self.multipliers.is_empty() {
            return 1.0;
        }
        self.multipliers.multiplier(
            self.registry.groups_for_type(transition_type),
            cell,
            iteration,
            timestep,
            values,
        )
    }

    // -- Targets --

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// The enabled target covering a cell for a group.
    pub fn target_index(&self, group: TransitionGroupId, cell: &Cell, iteration: i32, timestep: i32) -> Option<usize> {
        if self.targets.is_empty() {
            return None;
        }
        let [s, sec, ter] = strata_dims(cell);
        self.target_map
            .lookup([Some(group.0), s, sec, ter], iteration, timestep)
            .copied()
            .filter(|&i| self.targets[i].is_some())
    }

    pub fn target_amount(&self, target: usize, values: &SampledValues) -> f64 {
        self.targets[target].map_or(0.0, |s| values.get(s))
    }

    pub fn has_prioritizations(&self, group: TransitionGroupId) -> bool {
        self.prioritization_maps.contains_key(&group)
    }

    /// The prioritization covering a cell for a group, with its index.
    pub fn prioritization(
        &self,
        group: TransitionGroupId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> Option<(usize, &TransitionTargetPrioritization)> {
        let map = self.prioritization_maps.get(&group)?;
        let [s, sec, ter] = strata_dims(cell);
        map.lookup([s, sec, ter, Some(cell.state_class.0)], iteration, timestep)
            .map(|&i| (i, &self.prioritizations[i]))
    }

    // -- Attribute targets --

    pub fn has_attribute_targets(&self) -> bool {
        !self.attribute_targets.is_empty()
    }

    pub fn attribute_target_count(&self) -> usize {
        self.attribute_targets.len()
    }

    pub fn attribute_target_index(
        &self,
        attribute: AttributeTypeId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> Option<usize> {
        let [s, sec, ter] = strata_dims(cell);
        self.attribute_target_map
            .lookup([Some(attribute.0), s, sec, ter], iteration, timestep)
            .copied()
            .filter(|&i| self.attribute_targets[i].is_some())
    }

    pub fn attribute_target_amount(&self, target: usize, values: &SampledValues) -> f64 {
        self.attribute_targets[target].map_or(0.0, |s| values.get(s))
    }

    pub fn attribute_prioritization(
        &self,
        attribute: AttributeTypeId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> Option<&TransitionAttributeTargetPrioritization> {
        let [s, sec, ter] = strata_dims(cell);
        self.attribute_prioritization_map
            .lookup(
                [Some(attribute.0), s, sec, ter, Some(cell.state_class.0)],
                iteration,
                timestep,
            )
            .map(|&i| &self.attribute_prioritizations[i])
    }

    // -- Attribute values --

    pub fn state_attribute_types(&self) -> &[AttributeTypeId] {
        &self.state_attribute_types
    }

    pub fn state_attribute_value(
        &self,
        attribute: AttributeTypeId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
        values: &SampledValues,
    ) -> Option<f64> {
        let [s, sec, ter] = strata_dims(cell);
        lookup_attribute(
            &self.state_attributes,
            [Some(attribute.0), s, sec, ter, Some(cell.state_class.0)],
            iteration,
            timestep,
            cell.age,
            values,
        )
    }

    /// Attribute types produced by transitions of a group.
    pub fn transition_attribute_types(&self, group: TransitionGroupId) -> &[AttributeTypeId] {
        self.group_attribute_types
            .get(&group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn transition_attribute_value(
        &self,
        attribute: AttributeTypeId,
        group: TransitionGroupId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
        values: &SampledValues,
    ) -> Option<f64> {
        let [s, sec, ter] = strata_dims(cell);
        lookup_attribute(
            &self.transition_attributes,
            [Some(attribute.0), Some(group.0), s, sec, ter, Some(cell.state_class.0)],
            iteration,
            timestep,
            cell.age,
            values,
        )
    }

    // -- Patch sizes --

    pub fn has_size_distribution(&self, group: TransitionGroupId) -> bool {
        self.size_groups.contains(&group)
    }

    pub fn size_classes(
        &self,
        group: TransitionGroupId,
        stratum: StratumId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&SizeClasses> {
        self.size_distributions
            .lookup([Some(group.0), Some(stratum.0)], iteration, timestep)
    }

    pub fn size_prioritization(
        &self,
        group: TransitionGroupId,
        stratum: StratumId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&TransitionSizePrioritization> {
        self.size_prioritization_map
            .lookup([Some(group.0), Some(stratum.0)], iteration, timestep)
            .map(|&i| &self.size_prioritizations[i])
    }

    pub fn patch_prioritization(&self, group: TransitionGroupId, iteration: i32, timestep: i32) -> Option<PatchPrioritizationKind> {
        self.patch_prioritizations
            .lookup([Some(group.0)], iteration, timestep)
            .copied()
    }

    /// Distance classes for a group spreading out of a cell's stratum and
    /// state class.
    pub fn spread_classes(
        &self,
        group: TransitionGroupId,
        stratum: StratumId,
        state_class: StateClassId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&SizeClasses> {
        if self.spread_distributions.is_empty() {
            return None;
        }
        self.spread_distributions
            .lookup([Some(group.0), Some(stratum.0), Some(state_class.0)], iteration, timestep)
    }
}
