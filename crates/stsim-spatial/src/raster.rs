//! Raster grids, metadata comparison and initial cells.

use crate::{GridPosition, SpatialError};
use serde::{Deserialize, Serialize};
use stsim_core::cell::CellInit;
use stsim_core::error::ConsistencyWarning;
use stsim_core::id::{CellId, StateClassId, StratumId};
use tracing::warn;

const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Shape and georeferencing of a raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub rows: usize,
    pub cols: usize,
    /// Side length of one square cell, in map units.
    pub cell_size: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    #[serde(default)]
    pub projection: Option<String>,
}

impl RasterMetadata {
    pub fn new(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self {
            rows,
            cols,
            cell_size,
            origin_x: 0.0,
            origin_y: 0.0,
            projection: None,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Area of one cell; the amount every simulated cell represents.
    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    pub fn validate(&self, name: &str) -> Result<(), SpatialError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SpatialError::InvalidMetadata {
                name: name.into(),
                detail: "a raster needs at least one row and one column".into(),
            });
        }
        if self.cell_size.is_nan() || self.cell_size <= 0.0 {
            return Err(SpatialError::InvalidMetadata {
                name: name.into(),
                detail: format!("cell size must be positive, got {}", self.cell_size),
            });
        }
        Ok(())
    }
}

/// Outcome of comparing a raster's metadata with the reference raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataComparison {
    Identical,
    /// Same rows and columns; cell size, origin or projection differ.
    UnimportantDifferences,
    RowColumnMismatch,
}

pub fn compare_metadata(reference: &RasterMetadata, other: &RasterMetadata) -> MetadataComparison {
    if reference.rows != other.rows || reference.cols != other.cols {
        return MetadataComparison::RowColumnMismatch;
    }
    let same_geometry = (reference.cell_size - other.cell_size).abs() < EPSILON
        && (reference.origin_x - other.origin_x).abs() < EPSILON
        && (reference.origin_y - other.origin_y).abs() < EPSILON;
    if same_geometry && reference.projection == other.projection {
        MetadataComparison::Identical
    } else {
        MetadataComparison::UnimportantDifferences
    }
}

/// Check `other` against `reference`. A row/column mismatch is an error;
/// unimportant differences are logged and returned as a warning.
pub(crate) fn check_metadata(
    reference: &RasterMetadata,
    other: &RasterMetadata,
    file: &str,
) -> Result<Option<ConsistencyWarning>, SpatialError> {
    match compare_metadata(reference, other) {
        MetadataComparison::Identical => Ok(None),
        MetadataComparison::UnimportantDifferences => {
            warn!(file, "raster metadata differs in cell size, origin or projection");
            Ok(Some(ConsistencyWarning::UnimportantMetadataDifference { file: file.into() }))
        }
        MetadataComparison::RowColumnMismatch => Err(row_column_mismatch(reference, other, file)),
    }
}

pub(crate) fn row_column_mismatch(reference: &RasterMetadata, other: &RasterMetadata, file: &str) -> SpatialError {
    SpatialError::RowColumnMismatch {
        file: file.into(),
        expected_rows: reference.rows,
        expected_cols: reference.cols,
        actual_rows: other.rows,
        actual_cols: other.cols,
    }
}

// ---------------------------------------------------------------------------
// Raster
// ---------------------------------------------------------------------------

/// A row-major grid of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster<T> {
    pub metadata: RasterMetadata,
    values: Vec<T>,
}

impl<T: Copy> Raster<T> {
    /// Wrap `values`, which must hold exactly `rows * cols` entries.
    pub fn new(name: &str, metadata: RasterMetadata, values: Vec<T>) -> Result<Self, SpatialError> {
        metadata.validate(name)?;
        if values.len() != metadata.cell_count() {
            return Err(SpatialError::CellCountMismatch {
                name: name.into(),
                expected: metadata.cell_count(),
                actual: values.len(),
            });
        }
        Ok(Self { metadata, values })
    }

    /// A raster with every cell set to `value`.
    pub fn filled(metadata: RasterMetadata, value: T) -> Self {
        let values = vec![value; metadata.cell_count()];
        Self { metadata, values }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.values.get(index).copied()
    }

    pub fn get_at(&self, pos: GridPosition) -> Option<T> {
        pos.index(self.metadata.rows, self.metadata.cols)
            .and_then(|i| self.get(i))
    }

    /// Value under a cell id.
    pub fn get_cell(&self, cell: CellId) -> Option<T> {
        if cell.0 < 1 {
            return None;
        }
        self.get((cell.0 - 1) as usize)
    }

    pub fn set(&mut self, pos: GridPosition, value: T) {
        if let Some(i) = pos.index(self.metadata.rows, self.metadata.cols) {
            self.values[i] = value;
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Initial condition rasters
// ---------------------------------------------------------------------------

/// Spatial initial conditions. The stratum raster is the reference every
/// other raster is compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRasters {
    pub stratum: Raster<i32>,
    pub state_class: Raster<i32>,
    pub secondary_stratum: Option<Raster<i32>>,
    pub tertiary_stratum: Option<Raster<i32>>,
    /// Negative ages are no-data; those cells draw an age from the
    /// initial-condition age ranges.
    pub age: Option<Raster<i32>>,
    /// Elevation, used for slope multipliers.
    pub dem: Option<Raster<f64>>,
}

impl InputRasters {
    pub fn new(stratum: Raster<i32>, state_class: Raster<i32>) -> Self {
        Self {
            stratum,
            state_class,
            secondary_stratum: None,
            tertiary_stratum: None,
            age: None,
            dem: None,
        }
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.stratum.metadata
    }

    /// Check every raster against the stratum raster.
    pub fn check(&self) -> Result<Vec<ConsistencyWarning>, SpatialError> {
        let reference = self.metadata();
        let mut warnings = Vec::new();
        let others = [
            ("state class", Some(&self.state_class.metadata)),
            ("secondary stratum", self.secondary_stratum.as_ref().map(|r| &r.metadata)),
            ("tertiary stratum", self.tertiary_stratum.as_ref().map(|r| &r.metadata)),
            ("age", self.age.as_ref().map(|r| &r.metadata)),
            ("elevation", self.dem.as_ref().map(|r| &r.metadata)),
        ];
        for (name, metadata) in others {
            if let Some(metadata) = metadata {
                warnings.extend(check_metadata(reference, metadata, name)?);
            }
        }
        Ok(warnings)
    }

    /// Initial cells in raster order. Cells with a zero stratum or state
    /// class are not simulated.
    pub fn to_cells(&self) -> Vec<CellInit> {
        let optional = |raster: &Option<Raster<i32>>, i: usize| {
            raster
                .as_ref()
                .and_then(|r| r.get(i))
                .filter(|&v| v > 0)
                .map(StratumId)
        };
        let mut cells = Vec::new();
        for i in 0..self.stratum.len() {
            let stratum = self.stratum.get(i).unwrap_or(0);
            let state_class = self.state_class.get(i).unwrap_or(0);
            if stratum <= 0 || state_class <= 0 {
                continue;
            }
            cells.push(CellInit {
                id: CellId(i as i32 + 1),
                stratum: StratumId(stratum),
                secondary_stratum: optional(&self.secondary_stratum, i),
                tertiary_stratum: optional(&self.tertiary_stratum, i),
                state_class: StateClassId(state_class),
                age: self.age.as_ref().and_then(|r| r.get(i)).filter(|&a| a >= 0),
            });
        }
        cells
    }
}

// ===========================================================================
// Tests
// ===========================================================================
