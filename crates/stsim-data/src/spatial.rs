//! Spatial tables: initial condition rasters, spatial and initiation
//! multiplier rasters, and the adjacency, direction and slope multiplier
//! tables.
//!
//! Raster files are named by the tables and read relative to the scenario
//! directory. Each distinct multiplier file is read once.

use crate::loader::{deserialize_file, load_table, require_data_file, DataLoadError};
use crate::scenario::{Names, RunOptions};
use crate::schema::*;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use stsim_spatial::adjacency::DEFAULT_THRESHOLD;
use stsim_spatial::{
    AdjacencyMultiplier, AdjacencySetting, AdjacencyTarget, Direction, DirectionMultiplier, InputRasters,
    LandscapeConfig, MismatchPolicy, Raster, RasterLandscape, RasterMetadata, SlopeMultiplier,
    SpatialMultiplierRecord,
};
use tracing::debug;

/// Read one raster file relative to `dir`.
fn read_raster<T: DeserializeOwned + Copy>(dir: &Path, name: &str) -> Result<Raster<T>, DataLoadError> {
    let file = dir.join(name);
    let data: RasterData<T> = deserialize_file(&file)?;
    let mut metadata = RasterMetadata::new(data.rows, data.cols, data.cell_size);
    metadata.origin_x = data.origin_x;
    metadata.origin_y = data.origin_y;
    metadata.projection = data.projection;
    Raster::new(name, metadata, data.values).map_err(|source| DataLoadError::Spatial { file, source })
}

fn load_inputs(dir: &Path) -> Result<InputRasters, DataLoadError> {
    let file = require_data_file(dir, "initial_rasters")?;
    let data: InitialRastersData = deserialize_file(&file)?;
    let mut inputs = InputRasters::new(read_raster(dir, &data.stratum)?, read_raster(dir, &data.state_class)?);
    inputs.secondary_stratum = data.secondary_stratum.map(|f| read_raster(dir, &f)).transpose()?;
    inputs.tertiary_stratum = data.tertiary_stratum.map(|f| read_raster(dir, &f)).transpose()?;
    inputs.age = data.age.map(|f| read_raster(dir, &f)).transpose()?;
    inputs.dem = data.elevation.map(|f| read_raster(dir, &f)).transpose()?;
    Ok(inputs)
}

fn load_config(dir: &Path, names: &Names, options: &RunOptions) -> Result<LandscapeConfig, DataLoadError> {
    let mut config = LandscapeConfig {
        mismatch_policy: if options.resolution_scenario {
            MismatchPolicy::SkipForResolutionScenario
        } else {
            MismatchPolicy::Strict
        },
        ..Default::default()
    };

    let (rows, file) = load_table::<SpatialMultiplierData>(dir, "spatial_multipliers")?;
    for row in rows {
        let mut r = SpatialMultiplierRecord::new(names.group(&row.group, &file)?, row.file);
        r.multiplier_type = names.opt_multiplier_type(row.multiplier_type.as_deref(), &file)?;
        r.iteration = row.iteration;
        r.timestep = row.timestep;
        config.spatial_multipliers.push(r);
    }

    let (rows, file) = load_table::<SpatialMultiplierData>(dir, "initiation_multipliers")?;
    for row in rows {
        let mut r = SpatialMultiplierRecord::new(names.group(&row.group, &file)?, row.file);
        r.multiplier_type = names.opt_multiplier_type(row.multiplier_type.as_deref(), &file)?;
        r.iteration = row.iteration;
        r.timestep = row.timestep;
        config.initiation_multipliers.push(r);
    }

    let (rows, file) = load_table::<AdjacencySettingData>(dir, "adjacency_settings")?;
    for row in rows {
        let target = match (row.state_class.as_deref(), row.attribute_type.as_deref()) {
            (Some(sc), None) => AdjacencyTarget::StateClass(names.state_class(sc, &file)?),
            (None, Some(attr)) => AdjacencyTarget::StateAttribute(names.attribute_type(attr, &file)?),
            _ => {
                return Err(DataLoadError::Invalid {
                    file,
                    detail: format!(
                        "adjacency setting for '{}' needs exactly one of state_class and attribute_type",
                        row.group
                    ),
                });
            }
        };
        let mut s = AdjacencySetting::new(names.group(&row.group, &file)?, target);
        s.radius = row.radius;
        s.update_frequency = row.update_frequency;
        config.adjacency_settings.push(s);
    }

    let (rows, file) = load_table::<AdjacencyMultiplierData>(dir, "adjacency_multipliers")?;
    for row in rows {
        let mut m = AdjacencyMultiplier::new(
            names.group(&row.group, &file)?,
            row.threshold.unwrap_or(DEFAULT_THRESHOLD),
            row.amount,
        );
        m.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        m.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        m.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        m.iteration = row.iteration;
        m.timestep = row.timestep;
        config.adjacency_multipliers.push(m);
    }

    let (rows, file) = load_table::<DirectionMultiplierData>(dir, "direction_multipliers")?;
    for row in rows {
        let Some(direction) = Direction::parse(&row.direction) else {
            return Err(DataLoadError::Invalid {
                file,
                detail: format!("unknown direction '{}'", row.direction),
            });
        };
        let mut m = DirectionMultiplier::new(names.group(&row.group, &file)?, direction, row.amount);
        m.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        m.secondary_stratum = names.opt_secondary(row.secondary_stratum.as_deref(), &file)?;
        m.tertiary_stratum = names.opt_tertiary(row.tertiary_stratum.as_deref(), &file)?;
        m.iteration = row.iteration;
        m.timestep = row.timestep;
        config.direction_multipliers.push(m);
    }

    let (rows, file) = load_table::<SlopeMultiplierData>(dir, "slope_multipliers")?;
    for row in rows {
        let mut m = SlopeMultiplier::new(names.group(&row.group, &file)?, row.slope, row.amount);
        m.stratum = names.opt_stratum(row.stratum.as_deref(), &file)?;
        m.iteration = row.iteration;
        m.timestep = row.timestep;
        config.slope_multipliers.push(m);
    }

    Ok(config)
}

/// Build the raster landscape of a spatial scenario.
pub(crate) fn load_landscape(dir: &Path, names: &Names, options: &RunOptions) -> Result<RasterLandscape, DataLoadError> {
    let inputs = load_inputs(dir)?;
    let config = load_config(dir, names, options)?;

    let mut rasters: BTreeMap<String, Raster<f64>> = BTreeMap::new();
    for record in config.spatial_multipliers.iter().chain(&config.initiation_multipliers) {
        if !rasters.contains_key(&record.file) {
            rasters.insert(record.file.clone(), read_raster(dir, &record.file)?);
        }
    }

    let landscape = RasterLandscape::build(inputs, &config, &rasters).map_err(|source| DataLoadError::Spatial {
        file: dir.join("initial_rasters"),
        source,
    })?;
    debug!(
        rows = landscape.metadata().rows,
        cols = landscape.metadata().cols,
        multiplier_rasters = rasters.len(),
        warnings = landscape.warnings().len(),
        "landscape loaded"
    );
    Ok(landscape)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use crate::loader::DataLoadError;
    use crate::scenario::load_scenario;
    use std::fs;
    use std::path::{Path, PathBuf};
    use stsim_core::engine::Simulation;
    use stsim_core::error::ConsistencyWarning;
    use stsim_core::id::CellId;
    use stsim_core::output::SummaryCollector;
    use stsim_spatial::SpatialError;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stsim_data_spatial_{suffix}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, file: &str, content: &str) {
        fs::write(dir.join(file), content).unwrap();
    }

    /// A 2x2 spatial forest, all Young, with a certain Young → Old
    /// succession.
    fn write_spatial(dir: &Path) {
        write(dir, "strata.ron", r#"[(name: "Forest")]"#);
        write(dir, "state_classes.ron", r#"[(name: "Young"), (name: "Old")]"#);
        write(dir, "transition_types.ron", r#"[(name: "Succession")]"#);
        write(
            dir,
            "run_control.ron",
            "(max_iteration: 1, max_timestep: 1, is_spatial: true, seed: 7)",
        );
        write(
            dir,
            "transitions.ron",
            r#"[(state_class: "Young", state_class_dest: Some("Old"), transition_type: "Succession", probability: 1.0)]"#,
        );
        write(
            dir,
            "initial_rasters.ron",
            r#"(stratum: "stratum.json", state_class: "state_class.json")"#,
        );
        write(dir, "stratum.json", r#"{"rows": 2, "cols": 2, "cell_size": 10.0, "values": [1, 1, 1, 1]}"#);
        write(dir, "state_class.json", r#"{"rows": 2, "cols": 2, "cell_size": 10.0, "values": [1, 1, 1, 1]}"#);
    }

    #[test]
    fn spatial_scenario_builds_landscape() {
        let dir = make_test_dir("landscape");
        write_spatial(&dir);
        let loaded = load_scenario(&dir).unwrap();
        let landscape = loaded.landscape.unwrap();
        assert_eq!(landscape.metadata().cell_area(), 100.0);

        let old = loaded.scenario.registry().state_class_id("Old").unwrap();
        let mut sim = Simulation::new(&loaded.scenario, loaded.options.seed).with_spatial_model(Box::new(landscape));
        let mut sink = SummaryCollector::new();
        sim.run_iteration(1, &mut sink).unwrap();
        assert_eq!(sink.state_amount(1, 1, old), 400.0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zero_multiplier_raster_blocks_transitions() {
        let dir = make_test_dir("multiplier");
        write_spatial(&dir);
        write(
            &dir,
            "spatial_multipliers.ron",
            r#"[(group: "Succession [Type]", file: "block.json"), (group: "Succession [Type]", timestep: Some(2), file: "block.json")]"#,
        );
        write(&dir, "block.json", r#"{"rows": 2, "cols": 2, "cell_size": 10.0, "values": [0.0, 1.0, 0.0, 1.0]}"#);
        let loaded = load_scenario(&dir).unwrap();
        let old = loaded.scenario.registry().state_class_id("Old").unwrap();
        let landscape = loaded.landscape.unwrap();
        let mut sim = Simulation::new(&loaded.scenario, 1).with_spatial_model(Box::new(landscape));
        let mut sink = SummaryCollector::new();
        sim.run_iteration(1, &mut sink).unwrap();
        assert_eq!(sink.state_amount(1, 1, old), 200.0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mismatched_multiplier_raster_depends_on_resolution_flag() {
        let dir = make_test_dir("mismatch");
        write_spatial(&dir);
        write(
            &dir,
            "spatial_multipliers.ron",
            r#"[(group: "Succession [Type]", file: "coarse.json")]"#,
        );
        write(&dir, "coarse.json", r#"{"rows": 1, "cols": 1, "cell_size": 20.0, "values": [0.0]}"#);
        assert!(matches!(
            load_scenario(&dir),
            Err(DataLoadError::Spatial {
                source: SpatialError::RowColumnMismatch { .. },
                ..
            })
        ));

        write(
            &dir,
            "run_control.ron",
            "(max_iteration: 1, max_timestep: 1, is_spatial: true, resolution_scenario: true)",
        );
        let loaded = load_scenario(&dir).unwrap();
        assert!(loaded.options.resolution_scenario);
        let landscape = loaded.landscape.unwrap();
        assert!(landscape
            .warnings()
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::MismatchedRasterSkipped { .. })));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn raster_values_read_as_floats() {
        let dir = make_test_dir("float");
        write(&dir, "m.json", r#"{"rows": 1, "cols": 2, "cell_size": 5.0, "values": [0.25, -9999.0]}"#);
        let raster = super::read_raster::<f64>(&dir, "m.json").unwrap();
        assert_eq!(raster.metadata.cell_size, 5.0);
        assert_eq!(raster.get_cell(CellId(1)), Some(0.25));

        write(&dir, "short.json", r#"{"rows": 2, "cols": 2, "cell_size": 5.0, "values": [1.0]}"#);
        assert!(matches!(
            super::read_raster::<f64>(&dir, "short.json"),
            Err(DataLoadError::Spatial { .. })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn initiation_raster_gates_seeds_and_must_match() {
        let dir = make_test_dir("initiation");
        write_spatial(&dir);
        write(
            &dir,
            "initiation_multipliers.ron",
            r#"[(group: "Succession [Type]", file: "start.json")]"#,
        );
        write(&dir, "start.json", r#"{"rows": 2, "cols": 2, "cell_size": 10.0, "values": [0.0, 1.0, 1.0, 1.0]}"#);
        let loaded = load_scenario(&dir).unwrap();
        let old = loaded.scenario.registry().state_class_id("Old").unwrap();
        let landscape = loaded.landscape.unwrap();
        let mut sim = Simulation::new(&loaded.scenario, 1).with_spatial_model(Box::new(landscape));
        let mut sink = SummaryCollector::new();
        sim.run_iteration(1, &mut sink).unwrap();
        assert_eq!(sink.state_amount(1, 1, old), 300.0);

        // A resolution scenario does not excuse an initiation raster.
        write(&dir, "start.json", r#"{"rows": 1, "cols": 1, "cell_size": 20.0, "values": [1.0]}"#);
        write(
            &dir,
            "run_control.ron",
            "(max_iteration: 1, max_timestep: 1, is_spatial: true, resolution_scenario: true)",
        );
        assert!(matches!(
            load_scenario(&dir),
            Err(DataLoadError::Spatial {
                source: SpatialError::RowColumnMismatch { .. },
                ..
            })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn adjacency_setting_needs_one_target() {
        let dir = make_test_dir("adjacency");
        write_spatial(&dir);
        write(
            &dir,
            "adjacency_settings.ron",
            r#"[(group: "Succession [Type]")]"#,
        );
        assert!(matches!(load_scenario(&dir), Err(DataLoadError::Invalid { .. })));

        write(
            &dir,
            "adjacency_settings.ron",
            r#"[(group: "Succession [Type]", state_class: Some("Old"), radius: Some(15.0))]"#,
        );
        let landscape = load_scenario(&dir).unwrap().landscape.unwrap();
        assert!(landscape
            .warnings()
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::MissingAdjacencyMultipliers { .. })));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_direction_is_invalid() {
        let dir = make_test_dir("direction");
        write_spatial(&dir);
        write(
            &dir,
            "direction_multipliers.ron",
            r#"[(group: "Succession [Type]", direction: "Up", amount: 2.0)]"#,
        );
        match load_scenario(&dir) {
            Err(DataLoadError::Invalid { detail, .. }) => assert!(detail.contains("Up")),
            other => panic!("expected invalid direction, got {:?}", other.err()),
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn slope_without_elevation_is_rejected() {
        let dir = make_test_dir("slope");
        write_spatial(&dir);
        write(
            &dir,
            "slope_multipliers.ron",
            r#"[(group: "Succession [Type]", slope: 10, amount: 0.5)]"#,
        );
        assert!(matches!(
            load_scenario(&dir),
            Err(DataLoadError::Spatial {
                source: SpatialError::MissingRaster { .. },
                ..
            })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_initial_rasters_is_reported() {
        let dir = make_test_dir("no_rasters");
        write_spatial(&dir);
        fs::remove_file(dir.join("initial_rasters.ron")).unwrap();
        match load_scenario(&dir) {
            Err(DataLoadError::MissingRequired { table, .. }) => assert_eq!(table, "initial_rasters"),
            other => panic!("expected missing table, got {:?}", other.err()),
        }
        fs::remove_dir_all(&dir).ok();
    }
}
