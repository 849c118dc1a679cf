//! Simulation clock and state hashing.

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Position of a simulation within its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Current iteration (1-based in typical configurations).
    pub iteration: i32,

    /// Last completed timestep. Before the first step this is the
    /// "timestep zero" at which initial conditions are recorded.
    pub timestep: i32,
}

impl SimState {
    /// Create a state positioned at the start of `iteration`.
    pub fn new(iteration: i32, timestep_zero: i32) -> Self {
        Self {
            iteration,
            timestep: timestep_zero,
        }
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for divergence detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed an i32 into the hash.
    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed an optional i32; `None` hashes differently from every value.
    pub fn write_opt_i32(&mut self, v: Option<i32>) {
        match v {
            Some(v) => {
                self.write(&[1]);
                self.write_i32(v);
            }
            None => self.write(&[0]),
        }
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
