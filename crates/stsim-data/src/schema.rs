//! Serde data file structs for scenario tables.
//!
//! Every record refers to definitions by name. Nullable columns are
//! `Option<_>` and become wildcard key segments once resolved. A record
//! amount is either a plain `amount`, a `distribution`, or both (the
//! amount is then the distribution mean).

use serde::Deserialize;

// ===========================================================================
// Definitions
// ===========================================================================

/// A named definition: stratum, transition type, multiplier type, ...
#[derive(Debug, Clone, Deserialize)]
pub struct NamedData {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateClassData {
    pub name: String,
    #[serde(default)]
    pub label_x: Option<String>,
    #[serde(default)]
    pub label_y: Option<String>,
}

/// A user-defined transition group and its member types.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionGroupData {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    /// Simulation groups are primary for their member types.
    #[serde(default)]
    pub simulation: bool,
}

/// A user-defined discrete distribution as `(value, relative frequency)`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDistributionData {
    pub name: String,
    pub values: Vec<(f64, f64)>,
}

// ===========================================================================
// Run control and initial conditions
// ===========================================================================

fn default_one() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunControlData {
    #[serde(default = "default_one")]
    pub min_iteration: i32,
    pub max_iteration: i32,
    #[serde(default = "default_one")]
    pub min_timestep: i32,
    pub max_timestep: i32,
    #[serde(default)]
    pub is_spatial: bool,
    #[serde(default)]
    pub seed: u64,
    /// Multiplier rasters with a different resolution are skipped instead
    /// of rejected.
    #[serde(default)]
    pub resolution_scenario: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialConditionsData {
    pub total_amount: f64,
    pub num_cells: usize,
    pub rows: Vec<InitialConditionRowData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialConditionRowData {
    pub stratum: String,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    pub state_class: String,
    #[serde(default)]
    pub age_min: Option<i32>,
    #[serde(default)]
    pub age_max: Option<i32>,
    pub relative_amount: f64,
}

// ===========================================================================
// Distributions
// ===========================================================================

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyData {
    #[default]
    Iteration,
    Timestep,
    IterationAndTimestep,
}

/// Distribution parameters. `kind` is `normal`, `beta`, `uniform`,
/// `uniform_integer` or the name of a user-defined distribution.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionData {
    pub kind: String,
    #[serde(default)]
    pub sd: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub frequency: FrequencyData,
}

// ===========================================================================
// Transitions
// ===========================================================================

fn default_proportion() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionData {
    #[serde(default)]
    pub stratum: Option<String>,
    pub state_class: String,
    #[serde(default)]
    pub stratum_dest: Option<String>,
    #[serde(default)]
    pub state_class_dest: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub transition_type: String,
    pub probability: f64,
    #[serde(default = "default_proportion")]
    pub proportion: f64,
    #[serde(default)]
    pub age_min: Option<i32>,
    #[serde(default)]
    pub age_max: Option<i32>,
    #[serde(default)]
    pub age_relative: Option<i32>,
    #[serde(default)]
    pub age_reset: Option<bool>,
    #[serde(default)]
    pub tst_min: Option<i32>,
    #[serde(default)]
    pub tst_max: Option<i32>,
    #[serde(default)]
    pub tst_relative: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeterministicTransitionData {
    #[serde(default)]
    pub stratum: Option<String>,
    pub state_class: String,
    #[serde(default)]
    pub stratum_dest: Option<String>,
    #[serde(default)]
    pub state_class_dest: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub age_min: Option<i32>,
    #[serde(default)]
    pub age_max: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionOrderData {
    pub group: String,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub order: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TstGroupData {
    pub transition_type: String,
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TstRandomizeData {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizeDistributionData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub max_area: f64,
    pub relative_amount: f64,
}

/// Patch prioritization: `Smallest`, `Smallest Edges Only`, `Largest` or
/// `Largest Edges Only`.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchPrioritizationData {
    pub group: String,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub prioritization: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizePrioritizationData {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    /// `Smallest` or `Largest`.
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub maximize_fidelity_to_distribution: Option<bool>,
    #[serde(default)]
    pub maximize_fidelity_to_total_area: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadDistributionData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    pub state_class: String,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub max_distance: f64,
    pub relative_amount: f64,
}

// ===========================================================================
// Multipliers, targets, prioritizations
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MultiplierData {
    #[serde(default)]
    pub multiplier_type: Option<String>,
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub distribution: Option<DistributionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub distribution: Option<DistributionData>,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrioritizationData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub probability_override: Option<f64>,
    #[serde(default = "default_multiplier")]
    pub probability_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeTargetData {
    pub attribute_type: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub distribution: Option<DistributionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributePrioritizationData {
    pub attribute_type: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub probability_override: Option<f64>,
    #[serde(default = "default_multiplier")]
    pub probability_multiplier: f64,
}

// ===========================================================================
// Attribute values
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StateAttributeData {
    pub attribute_type: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub age_min: Option<i32>,
    #[serde(default)]
    pub age_max: Option<i32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub distribution: Option<DistributionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionAttributeData {
    pub attribute_type: String,
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub age_min: Option<i32>,
    #[serde(default)]
    pub age_max: Option<i32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub distribution: Option<DistributionData>,
}

// ===========================================================================
// Spatial
// ===========================================================================

/// Initial condition raster file names, relative to the scenario
/// directory.
#[derive(Debug, Clone, Deserialize)]
pub struct InitialRastersData {
    pub stratum: String,
    pub state_class: String,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub elevation: Option<String>,
}

/// An on-disk raster: shape and row-major values.
#[derive(Debug, Clone, Deserialize)]
pub struct RasterData<T> {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    #[serde(default)]
    pub projection: Option<String>,
    pub values: Vec<T>,
}

/// Row of the spatial and the initiation multiplier tables.
#[derive(Debug, Clone, Deserialize)]
pub struct SpatialMultiplierData {
    pub group: String,
    #[serde(default)]
    pub multiplier_type: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub file: String,
}

/// Adjacency setting; exactly one of `state_class` and `attribute_type`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjacencySettingData {
    pub group: String,
    #[serde(default)]
    pub state_class: Option<String>,
    #[serde(default)]
    pub attribute_type: Option<String>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub update_frequency: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjacencyMultiplierData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    #[serde(default)]
    pub threshold: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionMultiplierData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub secondary_stratum: Option<String>,
    #[serde(default)]
    pub tertiary_stratum: Option<String>,
    pub direction: String,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlopeMultiplierData {
    pub group: String,
    #[serde(default)]
    pub stratum: Option<String>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub slope: i32,
    pub amount: f64,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_defaults() {
        let t: TransitionData = ron::from_str(
            r#"(state_class: "Young", transition_type: "Fire", probability: 0.1)"#,
        )
        .unwrap();
        assert_eq!(t.proportion, 1.0);
        assert!(t.stratum.is_none());
        assert!(t.age_reset.is_none());
    }

    #[test]
    fn run_control_defaults() {
        let rc: RunControlData = serde_json::from_str(r#"{"max_iteration": 2, "max_timestep": 10}"#).unwrap();
        assert_eq!(rc.min_iteration, 1);
        assert_eq!(rc.min_timestep, 1);
        assert!(!rc.is_spatial);
        assert_eq!(rc.seed, 0);
    }

    #[test]
    fn distribution_frequency_snake_case() {
        let d: DistributionData = toml::from_str(
            r#"
kind = "normal"
sd = 0.5
frequency = "iteration_and_timestep"
"#,
        )
        .unwrap();
        assert_eq!(d.kind, "normal");
        assert!(matches!(d.frequency, FrequencyData::IterationAndTimestep));
    }

    #[test]
    fn group_membership_defaults() {
        let g: TransitionGroupData = serde_json::from_str(r#"{"name": "Disturbance"}"#).unwrap();
        assert!(g.types.is_empty());
        assert!(!g.simulation);
    }

    #[test]
    fn raster_data_parses() {
        let r: RasterData<i32> =
            serde_json::from_str(r#"{"rows": 1, "cols": 2, "cell_size": 30.0, "values": [1, 2]}"#).unwrap();
        assert_eq!(r.values, vec![1, 2]);
        assert_eq!(r.origin_x, 0.0);
    }
}
