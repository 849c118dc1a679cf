//! Transition spatial multipliers: per-cell multiplier rasters keyed by
//! transition group, multiplier type, iteration and timestep.

use crate::SpatialError;
use crate::raster::{MetadataComparison, Raster, RasterMetadata, compare_metadata, row_column_mismatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stsim_core::error::ConsistencyWarning;
use stsim_core::id::{CellId, MultiplierTypeId, TransitionGroupId};
use stsim_core::keymap::{CompositeKey, KeySegment, KeyMap, MapError};
use tracing::{debug, warn};

/// One row of the spatial multiplier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMultiplierRecord {
    pub group: TransitionGroupId,
    #[serde(default)]
    pub multiplier_type: Option<MultiplierTypeId>,
    #[serde(default)]
    pub iteration: Option<i32>,
    #[serde(default)]
    pub timestep: Option<i32>,
    pub file: String,
}

impl SpatialMultiplierRecord {
    pub fn new(group: TransitionGroupId, file: impl Into<String>) -> Self {
        Self {
            group,
            multiplier_type: None,
            iteration: None,
            timestep: None,
            file: file.into(),
        }
    }
}

/// What to do with a multiplier raster whose rows and columns differ from
/// the initial conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MismatchPolicy {
    /// The mismatch is a configuration error.
    #[default]
    Strict,
    /// Resolution scenarios run at a different raster resolution; the
    /// mismatched raster is skipped with a warning.
    SkipForResolutionScenario,
}

/// Resolved spatial multipliers. Each unique file is stored once.
#[derive(Debug, Clone, Default)]
pub struct SpatialMultipliers {
    rasters: Vec<Raster<f64>>,
    /// Per multiplier type: group -> raster index.
    maps: Vec<(Option<MultiplierTypeId>, KeyMap<usize, 1>)>,
}

impl SpatialMultipliers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `records` against the supplied rasters (by file name).
    ///
    /// Returns the multipliers and the warnings raised while checking
    /// metadata against `reference`.
    pub fn build(
        records: &[SpatialMultiplierRecord],
        rasters: &BTreeMap<String, Raster<f64>>,
        reference: &RasterMetadata,
        policy: MismatchPolicy,
    ) -> Result<(Self, Vec<ConsistencyWarning>), SpatialError> {
        let mut out = Self::new();
        let mut warnings = Vec::new();
        // None marks a skipped file.
        let mut by_file: BTreeMap<&str, Option<usize>> = BTreeMap::new();

        for record in records {
            let index = match by_file.get(record.file.as_str()) {
                Some(&Some(i)) => i,
                Some(None) => continue,
                None => {
                    let raster = rasters.get(&record.file).ok_or_else(|| SpatialError::MissingRaster {
                        name: record.file.clone(),
                    })?;
                    match compare_metadata(reference, &raster.metadata) {
                        MetadataComparison::RowColumnMismatch => match policy {
                            MismatchPolicy::Strict => {
                                return Err(row_column_mismatch(reference, &raster.metadata, &record.file));
                            }
                            MismatchPolicy::SkipForResolutionScenario => {
                                warn!(file = %record.file, "skipping spatial multiplier with mismatched rows/columns");
                                warnings.push(ConsistencyWarning::MismatchedRasterSkipped {
                                    file: record.file.clone(),
                                });
                                by_file.insert(record.file.as_str(), None);
                                continue;
                            }
                        },
                        MetadataComparison::UnimportantDifferences => {
                            warn!(file = %record.file, "spatial multiplier metadata differs from initial conditions");
                            warnings.push(ConsistencyWarning::UnimportantMetadataDifference {
                                file: record.file.clone(),
                            });
                        }
                        MetadataComparison::Identical => {}
                    }
                    out.rasters.push(raster.clone());
                    let i = out.rasters.len() - 1;
                    by_file.insert(record.file.as_str(), Some(i));
                    i
                }
            };
            out.insert(record, index)?;
        }

        debug!(
            records = records.len(),
            rasters = out.rasters.len(),
            "spatial multipliers resolved"
        );
        Ok((out, warnings))
    }

    fn insert(&mut self, record: &SpatialMultiplierRecord, raster: usize) -> Result<(), MapError> {
        let pos = match self.maps.binary_search_by_key(&record.multiplier_type, |(t, _)| *t) {
            Ok(pos) => pos,
            Err(pos) => {
                self.maps.insert(pos, (record.multiplier_type, KeyMap::new()));
                pos
            }
        };
        let key = CompositeKey::new([KeySegment::of(Some(record.group))], record.iteration, record.timestep);
        self.maps[pos].1.insert(key, raster)
    }

    pub fn raster_count(&self) -> usize {
        self.rasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Product over multiplier types of the raster value under `cell`.
    /// Cells outside a raster or holding no data (negative or NaN) count
    /// as 1.0.
    pub fn multiplier(&self, group: TransitionGroupId, cell: CellId, iteration: i32, timestep: i32) -> f64 {
        let mut product = 1.0;
        for (_, map) in &self.maps {
            let Some(&index) = map.lookup([Some(group.0)], iteration, timestep) else {
                continue;
            };
            if let Some(value) = self.rasters[index].get_cell(cell)
                && value >= 0.0
            {
                product *= value;
            }
        }
        product
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const G: TransitionGroupId = TransitionGroupId(1);

    fn meta(rows: usize, cols: usize) -> RasterMetadata {
        RasterMetadata::new(rows, cols, 1.0)
    }

    fn rasters(entries: &[(&str, RasterMetadata, Vec<f64>)]) -> BTreeMap<String, Raster<f64>> {
        entries
            .iter()
            .map(|(name, m, v)| (name.to_string(), Raster::new(name, m.clone(), v.clone()).unwrap()))
            .collect()
    }

    #[test]
    fn one_raster_per_unique_file() {
        let files = rasters(&[("half.json", meta(1, 2), vec![0.5, 0.5])]);
        let mut r1 = SpatialMultiplierRecord::new(G, "half.json");
        r1.timestep = Some(1);
        let mut r2 = SpatialMultiplierRecord::new(G, "half.json");
        r2.timestep = Some(2);
        let (m, warnings) = SpatialMultipliers::build(&[r1, r2], &files, &meta(1, 2), MismatchPolicy::Strict).unwrap();
        assert_eq!(m.raster_count(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn value_under_cell() {
        let files = rasters(&[("m.json", meta(1, 3), vec![0.0, 2.0, -9999.0])]);
        let records = [SpatialMultiplierRecord::new(G, "m.json")];
        let (m, _) = SpatialMultipliers::build(&records, &files, &meta(1, 3), MismatchPolicy::Strict).unwrap();
        assert_eq!(m.multiplier(G, CellId(1), 1, 1), 0.0);
        assert_eq!(m.multiplier(G, CellId(2), 1, 1), 2.0);
        assert_eq!(m.multiplier(G, CellId(3), 1, 1), 1.0);
        assert_eq!(m.multiplier(TransitionGroupId(9), CellId(2), 1, 1), 1.0);
    }

    #[test]
    fn multiplier_types_multiply() {
        let files = rasters(&[
            ("a.json", meta(1, 1), vec![0.5]),
            ("b.json", meta(1, 1), vec![0.4]),
        ]);
        let mut b = SpatialMultiplierRecord::new(G, "b.json");
        b.multiplier_type = Some(MultiplierTypeId(1));
        let records = [SpatialMultiplierRecord::new(G, "a.json"), b];
        let (m, _) = SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::Strict).unwrap();
        assert!((m.multiplier(G, CellId(1), 1, 1) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn timestep_specific_raster_wins() {
        let files = rasters(&[
            ("all.json", meta(1, 1), vec![0.5]),
            ("ts3.json", meta(1, 1), vec![0.1]),
        ]);
        let mut ts3 = SpatialMultiplierRecord::new(G, "ts3.json");
        ts3.timestep = Some(3);
        let records = [SpatialMultiplierRecord::new(G, "all.json"), ts3];
        let (m, _) = SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::Strict).unwrap();
        assert_eq!(m.multiplier(G, CellId(1), 1, 2), 0.5);
        assert_eq!(m.multiplier(G, CellId(1), 1, 3), 0.1);
    }

    #[test]
    fn missing_file_is_error() {
        let records = [SpatialMultiplierRecord::new(G, "nope.json")];
        let err = SpatialMultipliers::build(&records, &BTreeMap::new(), &meta(1, 1), MismatchPolicy::Strict).unwrap_err();
        assert_eq!(err, SpatialError::MissingRaster { name: "nope.json".into() });
    }

    #[test]
    fn row_column_mismatch_is_fatal_when_strict() {
        let files = rasters(&[("m.json", meta(2, 2), vec![1.0; 4])]);
        let records = [SpatialMultiplierRecord::new(G, "m.json")];
        let err = SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::Strict).unwrap_err();
        assert!(matches!(err, SpatialError::RowColumnMismatch { .. }));
    }

    #[test]
    fn row_column_mismatch_is_skipped_for_resolution_scenario() {
        let files = rasters(&[
            ("coarse.json", meta(2, 2), vec![0.0; 4]),
            ("fine.json", meta(1, 1), vec![0.5]),
        ]);
        let mut fine = SpatialMultiplierRecord::new(G, "fine.json");
        fine.multiplier_type = Some(MultiplierTypeId(1));
        let records = [SpatialMultiplierRecord::new(G, "coarse.json"), fine];
        let (m, warnings) =
            SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::SkipForResolutionScenario).unwrap();
        assert_eq!(
            warnings,
            vec![ConsistencyWarning::MismatchedRasterSkipped {
                file: "coarse.json".into()
            }]
        );
        // The skipped raster does not stop later records from applying.
        assert_eq!(m.multiplier(G, CellId(1), 1, 1), 0.5);
    }

    #[test]
    fn unimportant_difference_is_warning() {
        let mut other = meta(1, 1);
        other.cell_size = 2.0;
        let files = rasters(&[("m.json", other, vec![0.5])]);
        let records = [SpatialMultiplierRecord::new(G, "m.json")];
        let (m, warnings) = SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::Strict).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(m.multiplier(G, CellId(1), 1, 1), 0.5);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let files = rasters(&[("m.json", meta(1, 1), vec![0.5])]);
        let records = [
            SpatialMultiplierRecord::new(G, "m.json"),
            SpatialMultiplierRecord::new(G, "m.json"),
        ];
        assert!(SpatialMultipliers::build(&records, &files, &meta(1, 1), MismatchPolicy::Strict).is_err());
    }
}
