//! Raster landscapes for spatial simulation runs.
//!
//! Provides the raster grid and its metadata, conversion of input rasters
//! into initial cells, and the spatial multiplier families (raster,
//! adjacency, direction, slope) behind the core `SpatialModel` seam.
//!
//! Cells are numbered `1..` in row-major raster order. A cell's id is its
//! raster index plus one, so a cell skipped for a zero stratum or state
//! class leaves a gap in the ids.

use serde::{Deserialize, Serialize};
use stsim_core::id::CellId;
use stsim_core::keymap::MapError;

pub mod adjacency;
pub mod landscape;
pub mod multiplier;
pub mod raster;
pub mod spread;

pub use adjacency::{
    AdjacencyMultiplier, AdjacencyMultipliers, AdjacencySetting, AdjacencyTarget, NeighbourhoodCache,
};
pub use landscape::{LandscapeConfig, RasterLandscape};
pub use multiplier::{MismatchPolicy, SpatialMultiplierRecord, SpatialMultipliers};
pub use raster::{InputRasters, MetadataComparison, Raster, RasterMetadata, compare_metadata};
pub use spread::{DirectionMultiplier, SlopeMultiplier, SpreadMultipliers, slope_degrees};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A position on the raster grid. Row 0 is the northern edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: i32,
    pub col: i32,
}

impl GridPosition {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Position of a row-major raster index in a grid of `cols` columns.
    pub fn from_index(index: usize, cols: usize) -> Self {
        Self {
            row: (index / cols) as i32,
            col: (index % cols) as i32,
        }
    }

    /// Position of a cell id; ids are raster indices plus one.
    pub fn from_cell(cell: CellId, cols: usize) -> Self {
        Self::from_index((cell.0 - 1).max(0) as usize, cols)
    }

    /// Row-major raster index, or `None` outside a `rows` x `cols` grid.
    pub fn index(&self, rows: usize, cols: usize) -> Option<usize> {
        if self.row < 0 || self.col < 0 || self.row as usize >= rows || self.col as usize >= cols {
            return None;
        }
        Some(self.row as usize * cols + self.col as usize)
    }

    pub fn offset(&self, (dr, dc): (i32, i32)) -> Self {
        Self::new(self.row + dr, self.col + dc)
    }

    /// Chebyshev (chessboard) distance to another position.
    pub fn chebyshev_distance(&self, other: &GridPosition) -> u32 {
        (self.row - other.row)
            .unsigned_abs()
            .max((self.col - other.col).unsigned_abs())
    }

    /// Euclidean distance between cell centres, in cells.
    pub fn euclidean_distance(&self, other: &GridPosition) -> f64 {
        let dr = f64::from(self.row - other.row);
        let dc = f64::from(self.col - other.col);
        (dr * dr + dc * dc).sqrt()
    }
}

/// The eight compass directions a spread move can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub fn all() -> [Direction; 8] {
        [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ]
    }

    /// (row, column) offset for this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn is_diagonal(&self) -> bool {
        let (dr, dc) = self.offset();
        dr != 0 && dc != 0
    }

    /// Direction of a one-cell move, if `from` and `to` are adjacent.
    pub fn between(from: GridPosition, to: GridPosition) -> Option<Direction> {
        let delta = (to.row - from.row, to.col - from.col);
        Direction::all().into_iter().find(|d| d.offset() == delta)
    }

    /// Stable key used in the direction multiplier map.
    pub fn key(&self) -> i32 {
        *self as i32
    }

    /// Parse a direction name or abbreviation ("North", "NE", ...).
    pub fn parse(name: &str) -> Option<Direction> {
        let normal: String = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Some(match normal.as_str() {
            "n" | "north" => Direction::North,
            "ne" | "northeast" => Direction::NorthEast,
            "e" | "east" => Direction::East,
            "se" | "southeast" => Direction::SouthEast,
            "s" | "south" => Direction::South,
            "sw" | "southwest" => Direction::SouthWest,
            "w" | "west" => Direction::West,
            "nw" | "northwest" => Direction::NorthWest,
            _ => return None,
        })
    }
}

/// Errors from building a raster landscape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    #[error(
        "raster '{file}' has {actual_rows} rows and {actual_cols} columns, expected {expected_rows} rows and {expected_cols} columns"
    )]
    RowColumnMismatch {
        file: String,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },
    #[error("raster '{name}' was not supplied")]
    MissingRaster { name: String },
    #[error("raster '{name}' holds {actual} values, expected {expected}")]
    CellCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("raster '{name}': {detail}")]
    InvalidMetadata { name: String, detail: String },
    #[error("duplicate spatial record for key {key}")]
    Duplicate { key: String },
}

impl From<MapError> for SpatialError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::Duplicate { key } => SpatialError::Duplicate { key },
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
