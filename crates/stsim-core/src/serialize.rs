//! Iteration snapshots.
//!
//! A snapshot captures everything a [`Simulation`] needs to continue an
//! iteration between two timesteps: the clock, the RNG stream, the current
//! distribution samples and the cells. Target budgets are not captured;
//! they are redrawn at the start of every timestep. The event bus, the
//! spatial model and any external multiplier stay with the simulation the
//! snapshot is restored into.

use crate::cell::{Cell, CellCollection};
use crate::distribution::SampledValues;
use crate::engine::Simulation;
use crate::rng::SimRng;
use crate::sim::SimState;
use crate::target::TargetTracker;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an iteration snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x57A7_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("no iteration has been started")]
    NotStarted,
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot has {snapshot} sampled values, scenario has {scenario}")]
    ScenarioMismatch { snapshot: usize, scenario: usize },
    #[error("snapshot cells are invalid: {0}")]
    InvalidCells(#[from] crate::error::InvariantError),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header of every snapshot, checked before the payload is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    pub iteration: i32,
    /// Last completed timestep.
    pub timestep: i32,
}

impl SnapshotHeader {
    pub fn new(state: SimState) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            iteration: state.iteration,
            timestep: state.timestep,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// The serializable state of one iteration in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    pub header: SnapshotHeader,
    pub run_seed: u64,
    pub rng: SimRng,
    pub values: SampledValues,
    pub amount_per_cell: f64,
    pub cells: Vec<Cell>,
}

impl IterationSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode and validate the header.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: IterationSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }
}

/// Read the header of a serialized snapshot.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    // bitcode has no partial decode.
    let snapshot: IterationSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// Simulation methods
// ---------------------------------------------------------------------------

impl Simulation<'_> {
    /// Capture the current iteration between timesteps.
    pub fn snapshot(&self) -> Result<IterationSnapshot, SerializeError> {
        if !self.started {
            return Err(SerializeError::NotStarted);
        }
        Ok(IterationSnapshot {
            header: SnapshotHeader::new(self.sim_state),
            run_seed: self.run_seed,
            rng: self.rng.clone(),
            values: self.values.clone(),
            amount_per_cell: self.amount_per_cell,
            cells: self.cells.iter().cloned().collect(),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        self.snapshot()?.to_bytes()
    }

    /// Continue from a snapshot. Listeners, the spatial model and external
    /// multipliers are kept.
    pub fn restore(&mut self, snapshot: IterationSnapshot) -> Result<(), DeserializeError> {
        snapshot.header.validate()?;
        let expected = self.scenario.values().len();
        if snapshot.values.as_slice().len() != expected {
            return Err(DeserializeError::ScenarioMismatch {
                snapshot: snapshot.values.as_slice().len(),
                scenario: expected,
            });
        }
        let mut cells = CellCollection::new();
        for cell in snapshot.cells {
            cells.push(cell)?;
        }
        cells.validate()?;

        self.run_seed = snapshot.run_seed;
        self.rng = snapshot.rng;
        self.values = snapshot.values;
        self.amount_per_cell = snapshot.amount_per_cell;
        self.cells = cells;
        self.sim_state = SimState {
            iteration: snapshot.header.iteration,
            timestep: snapshot.header.timestep,
        };
        self.tracker = TargetTracker::new(
            self.scenario.target_count(),
            self.scenario.attribute_target_count(),
        );
        self.started = true;
        Ok(())
    }

    pub fn deserialize_into(&mut self, data: &[u8]) -> Result<(), DeserializeError> {
        self.restore(IterationSnapshot::from_bytes(data)?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
