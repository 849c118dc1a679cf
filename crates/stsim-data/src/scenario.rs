//! Scenario directory pipeline: definitions, then records, then the
//! optional raster landscape.
//!
//! Loading happens in three phases:
//!
//! 1. **Definitions** are registered with a [`RegistryBuilder`]. Each
//!    definition table keeps a name table so later records can resolve
//!    their references; transition groups are read back from the built
//!    registry so auto groups (`"Fire [Type]"`) resolve too.
//! 2. **Records** are resolved against the name tables and handed to a
//!    [`ScenarioBuilder`], which validates them and names the table in any
//!    error it returns.
//! 3. **Spatial** runs additionally load the initial condition rasters and
//!    the spatial multiplier tables.

use crate::loader::{
    check_duplicate, deserialize_file, deserialize_list, load_table, require_data_file, resolve_name, resolve_optional,
    DataLoadError,
};
use crate::schema::*;
use crate::spatial::load_landscape;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stsim_core::ages::UNBOUNDED;
use stsim_core::attribute::{StateAttributeValue, TransitionAttributeValue};
use stsim_core::config::{InitialConditionRow, InitialConditions, RunControl};
use stsim_core::distribution::{DistributionProvider, DistributionSpec, DistributionType, DistributionValue, Frequency};
use stsim_core::id::*;
use stsim_core::multiplier::TransitionMultiplierValue;
use stsim_core::patch::{
    PatchPrioritizationKind, SizePriority, TransitionPatchPrioritization, TransitionSizeDistribution,
    TransitionSizePrioritization, TransitionSpreadDistribution,
};
use stsim_core::registry::{Registry, RegistryBuilder, RegistryError};
use stsim_core::scenario::{Scenario, ScenarioBuilder};
use stsim_core::target::{
    TransitionAttributeTarget, TransitionAttributeTargetPrioritization, TransitionTarget,
    TransitionTargetPrioritization,
};
use stsim_core::transition::{DeterministicTransition, Transition, TransitionOrder, TstGroup, TstRandomize};
use stsim_spatial::RasterLandscape;
use tracing::{debug, info};

// ===========================================================================
// Loaded scenario
// ===========================================================================

/// Run settings that are not part of the scenario itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub seed: u64,
    /// Multiplier rasters with a different resolution are skipped.
    pub resolution_scenario: bool,
}

/// Everything needed to start a run.
pub struct LoadedScenario {
    pub scenario: Scenario,
    pub options: RunOptions,
    /// Present for spatial runs.
    pub landscape: Option<RasterLandscape>,
}

// ===========================================================================
// Name tables
// ===========================================================================

/// Name → id tables for every definition kind.
#[derive(Debug, Default)]
pub(crate) struct Names {
    pub strata: HashMap<String, StratumId>,
    pub secondary_strata: HashMap<String, StratumId>,
    pub tertiary_strata: HashMap<String, StratumId>,
    pub state_classes: HashMap<String, StateClassId>,
    pub transition_types: HashMap<String, TransitionTypeId>,
    pub groups: HashMap<String, TransitionGroupId>,
    pub multiplier_types: HashMap<String, MultiplierTypeId>,
    pub attribute_types: HashMap<String, AttributeTypeId>,
    pub distributions: HashMap<String, DistributionId>,
}

impl Names {
    pub fn stratum(&self, name: &str, file: &Path) -> Result<StratumId, DataLoadError> {
        resolve_name(&self.strata, name, file, "stratum")
    }

    pub fn opt_stratum(&self, name: Option<&str>, file: &Path) -> Result<Option<StratumId>, DataLoadError> {
        resolve_optional(&self.strata, name, file, "stratum")
    }

    pub fn opt_secondary(&self, name: Option<&str>, file: &Path) -> Result<Option<StratumId>, DataLoadError> {
        resolve_optional(&self.secondary_strata, name, file, "secondary stratum")
    }

    pub fn opt_tertiary(&self, name: Option<&str>, file: &Path) -> Result<Option<StratumId>, DataLoadError> {
        resolve_optional(&self.tertiary_strata, name, file, "tertiary stratum")
    }

    pub fn state_class(&self, name: &str, file: &Path) -> Result<StateClassId, DataLoadError> {
        resolve_name(&self.state_classes, name, file, "state class")
    }

    pub fn opt_state_class(&self, name: Option<&str>, file: &Path) -> Result<Option<StateClassId>, DataLoadError> {
        resolve_optional(&self.state_classes, name, file, "state class")
    }

    pub fn transition_type(&self, name: &str, file: &Path) -> Result<TransitionTypeId, DataLoadError> {
        resolve_name(&self.transition_types, name, file, "transition type")
    }

    pub fn group(&self, name: &str, file: &Path) -> Result<TransitionGroupId, DataLoadError> {
        resolve_name(&self.groups, name, file, "transition group")
    }

    pub fn opt_group(&self, name: Option<&str>, file: &Path) -> Result<Option<TransitionGroupId>, DataLoadError> {
        resolve_optional(&self.groups, name, file, "transition group")
    }

    pub fn opt_multiplier_type(
        &self,
        name: Option<&str>,
        file: &Path,
    ) -> Result<Option<MultiplierTypeId>, DataLoadError> {
        resolve_optional(&self.multiplier_types, name, file, "multiplier type")
    }

    pub fn attribute_type(&self, name: &str, file: &Path) -> Result<AttributeTypeId, DataLoadError> {
        resolve_name(&self.attribute_types, name, file, "attribute type")
    }

    /// Build a distribution value from a record's `amount` and optional
    /// `distribution` columns.
    pub fn value(
        &self,
        amount: Option<f64>,
        distribution: Option<&DistributionData>,
        file: &Path,
    ) -> Result<DistributionValue, DataLoadError> {
        let Some(d) = distribution else {
            return Ok(DistributionValue {
                value: amount,
                distribution: None,
            });
        };
        let kind = match d.kind.as_str() {
            "normal" => DistributionType::Normal,
            "beta" => DistributionType::Beta,
            "uniform" => DistributionType::Uniform,
            "uniform_integer" => DistributionType::UniformInteger,
            name => DistributionType::User(resolve_name(&self.distributions, name, file, "distribution")?),
        };
        let mut spec = DistributionSpec::new(kind);
        spec.sd = d.sd;
        spec.min = d.min;
        spec.max = d.max;
        spec.frequency = match d.frequency {
            FrequencyData::Iteration => Frequency::Iteration,
            FrequencyData::Timestep => Frequency::Timestep,
            FrequencyData::IterationAndTimestep => Frequency::IterationAndTimestep,
        };
        Ok(DistributionValue::distributed(amount, spec))
    }
}

fn registry_error(file: &Path) -> impl FnOnce(RegistryError) -> DataLoadError + '_ {
    move |source| DataLoadError::Registry {
        file: file.to_path_buf(),
        source,
    }
}

/// Register every row of a definition table, rejecting duplicate names.
fn register_named<I: Copy>(
    dir: &Path,
    table: &str,
    required: bool,
    mut register: impl FnMut(&str) -> Result<I, RegistryError>,
) -> Result<HashMap<String, I>, DataLoadError> {
    let (rows, file): (Vec<NamedData>, PathBuf) = if required {
        let file = require_data_file(dir, table)?;
        (deserialize_list(&file, table)?, file)
    } else {
        load_table(dir, table)?
    };
    let mut names = HashMap::with_capacity(rows.len());
    for row in rows {
        check_duplicate(&names, &row.name, &file)?;
        let id = register(&row.name).map_err(registry_error(&file))?;
        names.insert(row.name, id);
    }
    Ok(names)
}

// ===========================================================================
// Phase 1: definitions
// ===========================================================================

fn load_definitions(dir: &Path) -> Result<(Registry, Names, DistributionProvider), DataLoadError> {
    let mut builder = RegistryBuilder::new();
    let mut names = Names {
        strata: register_named(dir, "strata", true, |n| builder.register_stratum(n))?,
        secondary_strata: register_named(dir, "secondary_strata", false, |n| builder.register_secondary_stratum(n))?,
        tertiary_strata: register_named(dir, "tertiary_strata", false, |n| builder.register_tertiary_stratum(n))?,
        transition_types: register_named(dir, "transition_types", true, |n| builder.register_transition_type(n))?,
        multiplier_types: register_named(dir, "multiplier_types", false, |n| builder.register_multiplier_type(n))?,
        attribute_types: register_named(dir, "attribute_types", false, |n| builder.register_attribute_type(n))?,
        ..Names::default()
    };

    let file = require_data_file(dir, "state_classes")?;
    for row in deserialize_list::<StateClassData>(&file, "state_classes")? {
        check_duplicate(&names.state_classes, &row.name, &file)?;
        let id = builder
            .register_state_class_labeled(&row.name, row.label_x.as_deref(), row.label_y.as_deref())
            .map_err(registry_error(&file))?;
        names.state_classes.insert(row.name, id);
    }

    let (groups, file) = load_table::<TransitionGroupData>(dir, "transition_groups")?;
    let mut user_groups = HashMap::new();
    for g in &groups {
        check_duplicate(&user_groups, &g.name, &file)?;
        let id = builder.register_transition_group(&g.name).map_err(registry_error(&file))?;
        user_groups.insert(g.name.clone(), id);
        for type_name in &g.types {
            let t = names.transition_type(type_name, &file)?;
            builder.add_type_to_group(t, id).map_err(registry_error(&file))?;
        }
        if g.simulation {
            builder.add_simulation_group(id).map_err(registry_error(&file))?;
        }
    }

    let (distributions, file) = load_table::<UserDistributionData>(dir, "distributions")?;
    let mut provider = DistributionProvider::new();
    for d in distributions {
        check_duplicate(&names.distributions, &d.name, &file)?;
        let id = builder.register_distribution(&d.name).map_err(registry_error(&file))?;
        for (value, relative_frequency) in d.values {
            provider.add_user_value(id, value, relative_frequency)?;
        }
        names.distributions.insert(d.name, id);
    }

    let registry = builder.build();
    names.groups = registry.groups().map(|g| (g.name.clone(), g.id)).collect();
    debug!(
        strata = names.strata.len(),
        state_classes = names.state_classes.len(),
        transition_types = names.transition_types.len(),
        groups = names.groups.len(),
        "definitions registered"
    );
    Ok((registry, names, provider))
}

// ===========================================================================
// Phase 2: records
// ===========================================================================

fn load_run_control(dir: &Path) -> Result<(RunControl, RunOptions), DataLoadError> {
    let file = require_data_file(dir, "run_control")?;
    let data: RunControlData = deserialize_file(&file)?;
    let run_control = RunControl {
        min_iteration: data.min_iteration,
        max_iteration: data.max_iteration,
        min_timestep: data.min_timestep,
        max_timestep: data.max_timestep,
        is_spatial: data.is_spatial,
    };
    let options = RunOptions {
        seed: data.seed,
        resolution_scenario: data.resolution_scenario,
    };
    Ok((run_control, options))
}

fn load_initial_conditions(dir: &Path, names: &Names) -> Result<InitialConditions, DataLoadError> {
    let file = require_data_file(dir, "initial_conditions")?;
    let data: InitialConditionsData = deserialize_file(&file)?;
    let mut ic = InitialConditions::new(data.total_amount, data.num_cells);
    for row in data.rows {
        let mut r = InitialConditionRow::new(
            names.stratum(&row.stratum, &file)?,
            names.state_class(&row.state_class, &file)?,
            row.relative_amount,
        );
        r.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        r.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        r.age_min = row.age_min.unwrap_or(0);
        r.age_max = row.age_max.unwrap_or(UNBOUNDED);
        ic = ic.with_row(r);
    }
    Ok(ic)
}

fn load_transitions(dir: &Path, names: &Names, b: &mut ScenarioBuilder) -> Result<(), DataLoadError> {
    let (rows, file) = load_table::<TransitionData>(dir, "transitions")?;
    for row in rows {
        let mut t = Transition::new(
            names.state_class(&row.state_class, &file)?,
            names.opt_state_class(row.state_class_dest.as_deref(), &file)?,
            names.transition_type(&row.transition_type, &file)?,
            row.probability,
        );
        t.stratum_source = names.opt_stratum(row.stratum.as_deref(), &file)?;
        t.stratum_dest = names.opt_stratum(row.stratum_dest.as_deref(), &file)?;
        t.iteration = row.iteration;
        t.timestep = row.timestep;
        t.proportion = row.proportion;
        if let Some(age_min) = row.age_min {
            t.age_min = age_min;
        }
        if let Some(age_max) = row.age_max {
            t.age_max = age_max;
        }
        if let Some(age_relative) = row.age_relative {
            t.age_relative = age_relative;
        }
        if let Some(age_reset) = row.age_reset {
            t.age_reset = age_reset;
        }
        t.tst_min = row.tst_min;
        t.tst_max = row.tst_max;
        t.tst_relative = row.tst_relative;
        b.add_transition(t);
    }

    let (rows, file) = load_table::<DeterministicTransitionData>(dir, "deterministic_transitions")?;
    for row in rows {
        let source = names.state_class(&row.state_class, &file)?;
        let mut dt = DeterministicTransition::new(source);
        dt.stratum_source = names.opt_stratum(row.stratum.as_deref(), &file)?;
        dt.stratum_dest = names.opt_stratum(row.stratum_dest.as_deref(), &file)?;
        if let Some(dest) = names.opt_state_class(row.state_class_dest.as_deref(), &file)? {
            dt.state_class_dest = dest;
        }
        dt.iteration = row.iteration;
        dt.timestep = row.timestep;
        dt.age_min = row.age_min.unwrap_or(0);
        dt.age_max = row.age_max.unwrap_or(UNBOUNDED);
        b.add_deterministic(dt);
    }

    let (rows, file) = load_table::<TransitionOrderData>(dir, "transition_order")?;
    for row in rows {
        b.add_transition_order(TransitionOrder {
            group: names.group(&row.group, &file)?,
            iteration: row.iteration,
            timestep: row.timestep,
            order: row.order,
        });
    }

    let (rows, file) = load_table::<TstGroupData>(dir, "tst_groups")?;
    for row in rows {
        b.add_tst_group(TstGroup {
            transition_type: names.transition_type(&row.transition_type, &file)?,
            group: names.group(&row.group, &file)?,
            stratum: names.opt_stratum(row.stratum.as_deref(), &file)?,
            secondary_stratum: names.opt_secondary(row.secondary_stratum.as_deref(), &file)?,
            tertiary_stratum: names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?,
        });
    }

    let (rows, file) = load_table::<TstRandomizeData>(dir, "tst_randomize")?;
    for row in rows {
        b.add_tst_randomize(TstRandomize {
            group: names.opt_group(row.group.as_deref(), &file)?,
            stratum: names.opt_stratum(row.stratum.as_deref(), &file)?,
            secondary_stratum: names.opt_secondary(row.secondary_stratum.as_deref(), &file)?,
            tertiary_stratum: names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?,
            state_class: names.opt_state_class(row.state_class.as_deref(), &file)?,
            iteration: row.iteration,
            min: row.min,
            max: row.max,
        });
    }

    let (rows, file) = load_table::<SizeDistributionData>(dir, "size_distributions")?;
    for row in rows {
        let mut s = TransitionSizeDistribution::new(names.group(&row.group, &file)?, row.max_area, row.relative_amount);
        s.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        s.iteration = row.iteration;
        s.timestep = row.timestep;
        b.add_size_distribution(s);
    }

    let (rows, file) = load_table::<PatchPrioritizationData>(dir, "patch_prioritizations")?;
    for row in rows {
        let Some(kind) = PatchPrioritizationKind::parse(&row.prioritization) else {
            return Err(DataLoadError::Invalid {
                file,
                detail: format!("unknown patch prioritization '{}'", row.prioritization),
            });
        };
        let mut p = TransitionPatchPrioritization::new(names.group(&row.group, &file)?, kind);
        p.iteration = row.iteration;
        p.timestep = row.timestep;
        b.add_patch_prioritization(p);
    }

    let (rows, file) = load_table::<SizePrioritizationData>(dir, "size_prioritizations")?;
    for row in rows {
        let priority = match row.priority.as_deref() {
            None | Some("Largest") => SizePriority::Largest,
            Some("Smallest") => SizePriority::Smallest,
            Some(other) => {
                return Err(DataLoadError::Invalid {
                    file,
                    detail: format!("unknown size priority '{other}'"),
                });
            }
        };
        let mut p = TransitionSizePrioritization::new(priority);
        p.group = names.opt_group(row.group.as_deref(), &file)?;
        p.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        p.iteration = row.iteration;
        p.timestep = row.timestep;
        if let Some(v) = row.maximize_fidelity_to_distribution {
            p.maximize_fidelity_to_distribution = v;
        }
        if let Some(v) = row.maximize_fidelity_to_total_area {
            p.maximize_fidelity_to_total_area = v;
        }
        b.add_size_prioritization(p);
    }

    let (rows, file) = load_table::<SpreadDistributionData>(dir, "spread_distributions")?;
    for row in rows {
        let mut d = TransitionSpreadDistribution::new(
            names.group(&row.group, &file)?,
            names.state_class(&row.state_class, &file)?,
            row.max_distance,
            row.relative_amount,
        );
        d.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        d.iteration = row.iteration;
        d.timestep = row.timestep;
        b.add_spread_distribution(d);
    }
    Ok(())
}

fn load_multipliers_and_targets(dir: &Path, names: &Names, b: &mut ScenarioBuilder) -> Result<(), DataLoadError> {
    let (rows, file) = load_table::<MultiplierData>(dir, "multipliers")?;
    for row in rows {
        let mut m = TransitionMultiplierValue::new(names.group(&row.group, &file)?, 1.0);
        m.multiplier_type = names.opt_multiplier_type(row.multiplier_type.as_deref(), &file)?;
        m.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        m.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        m.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        m.state_class = names.opt_state_class(row.state_class.as_deref(), &file)?;
        m.iteration = row.iteration;
        m.timestep = row.timestep;
        m.value = names.value(row.amount, row.distribution.as_ref(), &file)?;
        b.add_multiplier(m);
    }

    let (rows, file) = load_table::<TargetData>(dir, "targets")?;
    for row in rows {
        let mut t = TransitionTarget::new(names.group(&row.group, &file)?, 0.0);
        t.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        t.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        t.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        t.iteration = row.iteration;
        t.timestep = row.timestep;
        t.amount = names.value(row.amount, row.distribution.as_ref(), &file)?;
        b.add_target(t);
    }

    let (rows, file) = load_table::<PrioritizationData>(dir, "prioritizations")?;
    for row in rows {
        let mut p = TransitionTargetPrioritization::new(names.group(&row.group, &file)?);
        p.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        p.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        p.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        p.state_class = names.opt_state_class(row.state_class.as_deref(), &file)?;
        p.iteration = row.iteration;
        p.timestep = row.timestep;
        p.priority = row.priority;
        p.probability_override = row.probability_override;
        p.probability_multiplier = row.probability_multiplier;
        b.add_prioritization(p);
    }

    let (rows, file) = load_table::<AttributeTargetData>(dir, "attribute_targets")?;
    for row in rows {
        let mut t = TransitionAttributeTarget::new(names.attribute_type(&row.attribute_type, &file)?, 0.0);
        t.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        t.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        t.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        t.iteration = row.iteration;
        t.timestep = row.timestep;
        t.amount = names.value(row.amount, row.distribution.as_ref(), &file)?;
        b.add_attribute_target(t);
    }

    let (rows, file) = load_table::<AttributePrioritizationData>(dir, "attribute_prioritizations")?;
    for row in rows {
        let mut p = TransitionAttributeTargetPrioritization::new(names.attribute_type(&row.attribute_type, &file)?);
        p.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        p.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        p.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        p.state_class = names.opt_state_class(row.state_class.as_deref(), &file)?;
        p.iteration = row.iteration;
        p.timestep = row.timestep;
        p.probability_override = row.probability_override;
        p.probability_multiplier = row.probability_multiplier;
        b.add_attribute_prioritization(p);
    }
    Ok(())
}

fn load_attributes(dir: &Path, names: &Names, b: &mut ScenarioBuilder) -> Result<(), DataLoadError> {
    let (rows, file) = load_table::<StateAttributeData>(dir, "state_attributes")?;
    for row in rows {
        let mut v = StateAttributeValue::new(names.attribute_type(&row.attribute_type, &file)?, 0.0);
        v.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        v.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        v.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        v.state_class = names.opt_state_class(row.state_class.as_deref(), &file)?;
        v.iteration = row.iteration;
        v.timestep = row.timestep;
        v.age_min = row.age_min.unwrap_or(0);
        v.age_max = row.age_max.unwrap_or(UNBOUNDED);
        v.value = names.value(row.amount, row.distribution.as_ref(), &file)?;
        b.add_state_attribute(v);
    }

    let (rows, file) = load_table::<TransitionAttributeData>(dir, "transition_attributes")?;
    for row in rows {
        let mut v = TransitionAttributeValue::new(
            names.attribute_type(&row.attribute_type, &file)?,
            names.group(&row.group, &file)?,
            0.0,
        );
        v.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        v.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        v.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        v.state_class = names.opt_state_class(row.state_class.as_deref(), &file)?;
        v.iteration = row.iteration;
        v.timestep = row.timestep;
        v.age_min = row.age_min.unwrap_or(0);
        v.age_max = row.age_max.unwrap_or(UNBOUNDED);
        v.value = names.value(row.amount, row.distribution.as_ref(), &file)?;
        b.add_transition_attribute(v);
    }
    Ok(())
}

// ===========================================================================
// Entry point
// ===========================================================================

/// Load a scenario directory into a validated [`Scenario`].
///
/// Required tables: `strata`, `state_classes`, `transition_types` and
/// `run_control`, plus `initial_conditions` for non-spatial runs or
/// `initial_rasters` for spatial runs. Every other table is optional and
/// treated as empty when absent.
pub fn load_scenario(dir: &Path) -> Result<LoadedScenario, DataLoadError> {
    let (registry, names, provider) = load_definitions(dir)?;
    let (run_control, options) = load_run_control(dir)?;

    let mut b = ScenarioBuilder::new(registry);
    b.run_control(run_control).distribution_provider(provider);
    if !run_control.is_spatial {
        b.initial_conditions(load_initial_conditions(dir, &names)?);
    }
    load_transitions(dir, &names, &mut b)?;
    load_multipliers_and_targets(dir, &names, &mut b)?;
    load_attributes(dir, &names, &mut b)?;
    let scenario = b.build()?;

    let landscape = if run_control.is_spatial {
        Some(load_landscape(dir, &names, &options)?)
    } else {
        None
    };

    info!(
        dir = %dir.display(),
        transitions = scenario.transition_count(),
        spatial = run_control.is_spatial,
        warnings = scenario.warnings().len(),
        "scenario loaded"
    );
    Ok(LoadedScenario {
        scenario,
        options,
        landscape,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
