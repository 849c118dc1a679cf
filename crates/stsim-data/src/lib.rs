//! Scenario tables on disk.
//!
//! A scenario is a directory with one file per table, each in RON, JSON or
//! TOML. [`load_scenario`] reads the directory, resolves names to ids and
//! returns a validated [`stsim_core::scenario::Scenario`], plus the raster
//! landscape when the run is spatial.

pub mod loader;
pub mod scenario;
pub mod schema;
mod spatial;

pub use loader::DataLoadError;
pub use scenario::{load_scenario, LoadedScenario, RunOptions};
