use crate::error::ConsistencyWarning;
use crate::id::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// A named entity with an integer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDef<I> {
    pub id: I,
    pub name: String,
}

/// A state class definition. The optional labels are the two axes of the
/// state class naming scheme (e.g. cover type and structural stage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateClassDef {
    pub id: StateClassId,
    pub name: String,
    pub label_x: Option<String>,
    pub label_y: Option<String>,
}

/// A transition group definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionGroupDef {
    pub id: TransitionGroupId,
    pub name: String,
    /// Auto groups are synthesized one per transition type.
    pub is_auto: bool,
}

/// Explicit description of how the set of transition types changed between
/// two configuration loads. Auto groups are reconciled from this instead of
/// by diffing table contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeChangeSet {
    pub added: Vec<String>,
    /// `(old name, new name)` pairs.
    pub renamed: Vec<(String, String)>,
    pub removed: Vec<String>,
}

impl TypeChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.renamed.is_empty() && self.removed.is_empty()
    }
}

/// Name given to the auto group of a transition type.
pub fn auto_group_name(type_name: &str) -> String {
    format!("{type_name} [Type]")
}

/// Builder for constructing an immutable Registry.
/// Two-phase lifecycle: registration (and change sets) -> finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    strata: Vec<NamedDef<StratumId>>,
    secondary_strata: Vec<NamedDef<StratumId>>,
    tertiary_strata: Vec<NamedDef<StratumId>>,
    state_classes: Vec<StateClassDef>,
    transition_types: BTreeMap<TransitionTypeId, NamedDef<TransitionTypeId>>,
    groups: BTreeMap<TransitionGroupId, TransitionGroupDef>,
    multiplier_types: Vec<NamedDef<MultiplierTypeId>>,
    attribute_types: Vec<NamedDef<AttributeTypeId>>,
    distributions: Vec<NamedDef<DistributionId>>,
    /// Type-group membership rows in registration order.
    memberships: Vec<(TransitionTypeId, TransitionGroupId)>,
    simulation_groups: HashSet<TransitionGroupId>,
    next_type_id: i32,
    next_group_id: i32,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique<I>(defs: &[NamedDef<I>], kind: &'static str, name: &str) -> Result<(), RegistryError> {
        if defs.iter().any(|d| d.name == name) {
            return Err(RegistryError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn register_stratum(&mut self, name: &str) -> Result<StratumId, RegistryError> {
        Self::check_unique(&self.strata, "stratum", name)?;
        let id = StratumId(self.strata.len() as i32 + 1);
        self.strata.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    pub fn register_secondary_stratum(&mut self, name: &str) -> Result<StratumId, RegistryError> {
        Self::check_unique(&self.secondary_strata, "secondary stratum", name)?;
        let id = StratumId(self.secondary_strata.len() as i32 + 1);
        self.secondary_strata.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    pub fn register_tertiary_stratum(&mut self, name: &str) -> Result<StratumId, RegistryError> {
        Self::check_unique(&self.tertiary_strata, "tertiary stratum", name)?;
        let id = StratumId(self.tertiary_strata.len() as i32 + 1);
        self.tertiary_strata.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    pub fn register_state_class(&mut self, name: &str) -> Result<StateClassId, RegistryError> {
        self.register_state_class_labeled(name, None, None)
    }

    pub fn register_state_class_labeled(
        &mut self,
        name: &str,
        label_x: Option<&str>,
        label_y: Option<&str>,
    ) -> Result<StateClassId, RegistryError> {
        if self.state_classes.iter().any(|s| s.name == name) {
            return Err(RegistryError::DuplicateName {
                kind: "state class",
                name: name.to_string(),
            });
        }
        let id = StateClassId(self.state_classes.len() as i32 + 1);
        self.state_classes.push(StateClassDef {
            id,
            name: name.to_string(),
            label_x: label_x.map(str::to_string),
            label_y: label_y.map(str::to_string),
        });
        Ok(id)
    }

    /// Register a transition type together with its auto group.
    pub fn register_transition_type(&mut self, name: &str) -> Result<TransitionTypeId, RegistryError> {
        if self.transition_types.values().any(|t| t.name == name) {
            return Err(RegistryError::DuplicateName {
                kind: "transition type",
                name: name.to_string(),
            });
        }
        self.next_type_id += 1;
        let id = TransitionTypeId(self.next_type_id);
        self.transition_types.insert(id, NamedDef { id, name: name.to_string() });
        let group = self.insert_group(&auto_group_name(name), true);
        self.memberships.push((id, group));
        Ok(id)
    }

    /// Register a user-defined transition group.
    pub fn register_transition_group(&mut self, name: &str) -> Result<TransitionGroupId, RegistryError> {
        if self.groups.values().any(|g| g.name == name) {
            return Err(RegistryError::DuplicateName {
                kind: "transition group",
                name: name.to_string(),
            });
        }
        Ok(self.insert_group(name, false))
    }

    fn insert_group(&mut self, name: &str, is_auto: bool) -> TransitionGroupId {
        self.next_group_id += 1;
        let id = TransitionGroupId(self.next_group_id);
        self.groups.insert(
            id,
            TransitionGroupDef {
                id,
                name: name.to_string(),
                is_auto,
            },
        );
        id
    }

    /// Add a membership row. Row order decides which primary group is
    /// "found first" when a type has several.
    pub fn add_type_to_group(
        &mut self,
        transition_type: TransitionTypeId,
        group: TransitionGroupId,
    ) -> Result<(), RegistryError> {
        if !self.transition_types.contains_key(&transition_type) {
            return Err(RegistryError::UnknownId {
                kind: "transition type",
                id: transition_type.0,
            });
        }
        if !self.groups.contains_key(&group) {
            return Err(RegistryError::UnknownId {
                kind: "transition group",
                id: group.0,
            });
        }
        if !self.memberships.contains(&(transition_type, group)) {
            self.memberships.push((transition_type, group));
        }
        Ok(())
    }

    /// Mark a user-defined group as a simulation (primary) group.
    pub fn add_simulation_group(&mut self, group: TransitionGroupId) -> Result<(), RegistryError> {
        match self.groups.get(&group) {
            Some(g) if !g.is_auto => {
                self.simulation_groups.insert(group);
                Ok(())
            }
            Some(g) => Err(RegistryError::AutoGroupNotAllowed(g.name.clone())),
            None => Err(RegistryError::UnknownId {
                kind: "transition group",
                id: group.0,
            }),
        }
    }

    pub fn register_multiplier_type(&mut self, name: &str) -> Result<MultiplierTypeId, RegistryError> {
        Self::check_unique(&self.multiplier_types, "multiplier type", name)?;
        let id = MultiplierTypeId(self.multiplier_types.len() as i32 + 1);
        self.multiplier_types.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    pub fn register_attribute_type(&mut self, name: &str) -> Result<AttributeTypeId, RegistryError> {
        Self::check_unique(&self.attribute_types, "attribute type", name)?;
        let id = AttributeTypeId(self.attribute_types.len() as i32 + 1);
        self.attribute_types.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    pub fn register_distribution(&mut self, name: &str) -> Result<DistributionId, RegistryError> {
        Self::check_unique(&self.distributions, "distribution", name)?;
        let id = DistributionId(self.distributions.len() as i32 + 1);
        self.distributions.push(NamedDef { id, name: name.to_string() });
        Ok(id)
    }

    /// Apply a change set to the transition types and their auto groups.
    pub fn apply_changes(&mut self, changes: &TypeChangeSet) -> Result<(), RegistryError> {
        for name in &changes.removed {
            let id = self
                .transition_type_id(name)
                .ok_or_else(|| RegistryError::NotFound(name.clone()))?;
            self.transition_types.remove(&id);
            let auto_name = auto_group_name(name);
            let removed_groups: Vec<TransitionGroupId> = self
                .groups
                .values()
                .filter(|g| g.is_auto && g.name == auto_name)
                .map(|g| g.id)
                .collect();
            for g in &removed_groups {
                self.groups.remove(g);
            }
            self.memberships
                .retain(|(t, g)| *t != id && !removed_groups.contains(g));
        }

        for (old, new) in &changes.renamed {
            let id = self
                .transition_type_id(old)
                .ok_or_else(|| RegistryError::NotFound(old.clone()))?;
            if self.transition_type_id(new).is_some() {
                return Err(RegistryError::DuplicateName {
                    kind: "transition type",
                    name: new.clone(),
                });
            }
            if let Some(def) = self.transition_types.get_mut(&id) {
                def.name = new.clone();
            }
            let old_auto = auto_group_name(old);
            for g in self.groups.values_mut() {
                if g.is_auto && g.name == old_auto {
                    g.name = auto_group_name(new);
                }
            }
        }

        for name in &changes.added {
            self.register_transition_type(name)?;
        }
        Ok(())
    }

    fn transition_type_id(&self, name: &str) -> Option<TransitionTypeId> {
        self.transition_types
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id)
    }

    /// Finalize: resolve group memberships and primary groups.
    pub fn build(self) -> Registry {
        let mut type_groups: HashMap<TransitionTypeId, Vec<TransitionGroupId>> = HashMap::new();
        let mut type_primary: HashMap<TransitionTypeId, Vec<TransitionGroupId>> = HashMap::new();
        let mut primary_groups: Vec<TransitionGroupId> = Vec::new();
        let mut warnings = Vec::new();

        for ttype in self.transition_types.values() {
            let rows: Vec<&TransitionGroupDef> = self
                .memberships
                .iter()
                .filter(|(t, _)| *t == ttype.id)
                .filter_map(|(_, g)| self.groups.get(g))
                .collect();

            let groups = type_groups.entry(ttype.id).or_default();
            let primaries = type_primary.entry(ttype.id).or_default();

            // User-defined groups take precedence; an auto group is primary
            // only when no user-defined simulation group claims the type.
            for g in rows.iter().filter(|g| !g.is_auto) {
                groups.push(g.id);
                if self.simulation_groups.contains(&g.id) {
                    primaries.push(g.id);
                    if !primary_groups.contains(&g.id) {
                        primary_groups.push(g.id);
                    }
                }
            }
            let has_user_primary = !primaries.is_empty();
            for g in rows.iter().filter(|g| g.is_auto) {
                groups.push(g.id);
                if !has_user_primary {
                    primaries.push(g.id);
                    if !primary_groups.contains(&g.id) {
                        primary_groups.push(g.id);
                    }
                }
            }

            if primaries.len() > 1 {
                let w = ConsistencyWarning::MultiplePrimaryGroups {
                    transition_type: ttype.name.clone(),
                    groups: primaries.clone(),
                };
                warn!(transition_type = %ttype.id, groups = primaries.len(), "{w}");
                warnings.push(w);
            }
        }

        let mut group_types: HashMap<TransitionGroupId, Vec<TransitionTypeId>> = HashMap::new();
        for (t, g) in &self.memberships {
            if self.transition_types.contains_key(t) && self.groups.contains_key(g) {
                group_types.entry(*g).or_default().push(*t);
            }
        }

        let mut group_primary_types: HashMap<TransitionGroupId, Vec<TransitionTypeId>> = HashMap::new();
        for ttype in self.transition_types.keys() {
            for g in &type_primary[ttype] {
                group_primary_types.entry(*g).or_default().push(*ttype);
            }
        }

        Registry {
            strata: self.strata,
            secondary_strata: self.secondary_strata,
            tertiary_strata: self.tertiary_strata,
            state_classes: self.state_classes,
            transition_types: self.transition_types,
            groups: self.groups,
            multiplier_types: self.multiplier_types,
            attribute_types: self.attribute_types,
            distributions: self.distributions,
            type_groups,
            type_primary,
            group_types,
            group_primary_types,
            primary_groups,
            warnings,
        }
    }
}

/// Immutable registry of landscape vocabulary. Frozen after build.
#[derive(Debug, Clone)]
pub struct Registry {
    strata: Vec<NamedDef<StratumId>>,
    secondary_strata: Vec<NamedDef<StratumId>>,
    tertiary_strata: Vec<NamedDef<StratumId>>,
    state_classes: Vec<StateClassDef>,
    transition_types: BTreeMap<TransitionTypeId, NamedDef<TransitionTypeId>>,
    groups: BTreeMap<TransitionGroupId, TransitionGroupDef>,
    multiplier_types: Vec<NamedDef<MultiplierTypeId>>,
    attribute_types: Vec<NamedDef<AttributeTypeId>>,
    distributions: Vec<NamedDef<DistributionId>>,
    type_groups: HashMap<TransitionTypeId, Vec<TransitionGroupId>>,
    type_primary: HashMap<TransitionTypeId, Vec<TransitionGroupId>>,
    group_types: HashMap<TransitionGroupId, Vec<TransitionTypeId>>,
    group_primary_types: HashMap<TransitionGroupId, Vec<TransitionTypeId>>,
    primary_groups: Vec<TransitionGroupId>,
    warnings: Vec<ConsistencyWarning>,
}

impl Registry {
    pub fn has_stratum(&self, id: StratumId) -> bool {
        id.0 >= 1 && (id.0 as usize) <= self.strata.len()
    }

    pub fn stratum_name(&self, id: StratumId) -> Option<&str> {
        self.strata.iter().find(|s| s.id == id).map(|s| s.name.as_str())
    }

    pub fn stratum_id(&self, name: &str) -> Option<StratumId> {
        self.strata.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn secondary_stratum_id(&self, name: &str) -> Option<StratumId> {
        self.secondary_strata.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn tertiary_stratum_id(&self, name: &str) -> Option<StratumId> {
        self.tertiary_strata.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn strata(&self) -> impl Iterator<Item = StratumId> + '_ {
        self.strata.iter().map(|s| s.id)
    }

    pub fn has_state_class(&self, id: StateClassId) -> bool {
        id.0 >= 1 && (id.0 as usize) <= self.state_classes.len()
    }

    pub fn state_class(&self, id: StateClassId) -> Option<&StateClassDef> {
        self.state_classes.iter().find(|s| s.id == id)
    }

    pub fn state_class_id(&self, name: &str) -> Option<StateClassId> {
        self.state_classes.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn has_transition_type(&self, id: TransitionTypeId) -> bool {
        self.transition_types.contains_key(&id)
    }

    pub fn transition_type_name(&self, id: TransitionTypeId) -> Option<&str> {
        self.transition_types.get(&id).map(|t| t.name.as_str())
    }

    pub fn transition_type_id(&self, name: &str) -> Option<TransitionTypeId> {
        self.transition_types
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id)
    }

    pub fn transition_types(&self) -> impl Iterator<Item = TransitionTypeId> + '_ {
        self.transition_types.keys().copied()
    }

    pub fn group(&self, id: TransitionGroupId) -> Option<&TransitionGroupDef> {
        self.groups.get(&id)
    }

    pub fn group_id(&self, name: &str) -> Option<TransitionGroupId> {
        self.groups.values().find(|g| g.name == name).map(|g| g.id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &TransitionGroupDef> {
        self.groups.values()
    }

    pub fn multiplier_type_id(&self, name: &str) -> Option<MultiplierTypeId> {
        self.multiplier_types.iter().find(|m| m.name == name).map(|m| m.id)
    }

    pub fn multiplier_types(&self) -> impl Iterator<Item = MultiplierTypeId> + '_ {
        self.multiplier_types.iter().map(|m| m.id)
    }

    pub fn attribute_type_id(&self, name: &str) -> Option<AttributeTypeId> {
        self.attribute_types.iter().find(|a| a.name == name).map(|a| a.id)
    }

    pub fn distribution_id(&self, name: &str) -> Option<DistributionId> {
        self.distributions.iter().find(|d| d.name == name).map(|d| d.id)
    }

    /// All groups a type belongs to: user-defined first, then auto.
    pub fn groups_for_type(&self, id: TransitionTypeId) -> &[TransitionGroupId] {
        self.type_groups.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Primary groups of a type. Normally exactly one.
    pub fn primary_groups_for_type(&self, id: TransitionTypeId) -> &[TransitionGroupId] {
        self.type_primary.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first primary group found for a type.
    pub fn primary_group(&self, id: TransitionTypeId) -> Option<TransitionGroupId> {
        self.primary_groups_for_type(id).first().copied()
    }

    pub fn types_in_group(&self, id: TransitionGroupId) -> &[TransitionTypeId] {
        self.group_types.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn primary_types(&self, id: TransitionGroupId) -> &[TransitionTypeId] {
        self.group_primary_types.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Groups that are primary for at least one type, in discovery order.
    pub fn primary_groups(&self) -> &[TransitionGroupId] {
        &self.primary_groups
    }

    pub fn warnings(&self) -> &[ConsistencyWarning] {
        &self.warnings
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: i32 },
    #[error("auto group '{0}' cannot be a simulation group")]
    AutoGroupNotAllowed(String),
}
