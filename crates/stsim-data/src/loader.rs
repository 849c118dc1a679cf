//! Table file discovery, format detection and name resolution.
//!
//! Every scenario table lives in its own file named after the table
//! (`transitions.ron`, `run_control.toml`, ...). These helpers find the
//! file, deserialize it according to its extension and resolve the names
//! its records refer to.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stsim_core::error::ConfigError;
use stsim_core::registry::RegistryError;
use stsim_spatial::SpatialError;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a scenario directory.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required table file was not found in the given directory.
    #[error("required table '{table}' not found in {dir}")]
    MissingRequired { table: String, dir: PathBuf },

    /// The table file is not RON, TOML or JSON.
    #[error("{file}: not a .ron, .toml or .json table")]
    UnsupportedFormat { file: PathBuf },

    /// A table exists in more than one format.
    #[error("table found in two formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A table file failed to deserialize.
    #[error("{file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A record refers to a definition that does not exist.
    #[error("{file}: no {expected_kind} named '{name}'")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A definition table names the same entry twice.
    #[error("{file}: '{name}' is defined more than once")]
    DuplicateName { file: PathBuf, name: String },

    /// A record is well-formed but not meaningful.
    #[error("invalid record in {file}: {detail}")]
    Invalid { file: PathBuf, detail: String },

    #[error("{file}: {source}")]
    Registry {
        file: PathBuf,
        #[source]
        source: RegistryError,
    },

    #[error("{file}: {source}")]
    Spatial {
        file: PathBuf,
        #[source]
        source: SpatialError,
    },

    /// The assembled scenario failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading a table file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Table file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Table format from the file extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for the file of a table (base name without extension).
///
/// Looks for `{table}.ron`, `{table}.toml`, and `{table}.json`. Returns
/// `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same table.
pub fn find_data_file(dir: &Path, table: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let extensions = ["ron", "toml", "json"];
    let mut found: Option<PathBuf> = None;

    for ext in &extensions {
        let candidate = dir.join(format!("{table}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// [`find_data_file`] for tables a scenario cannot run without.
pub fn require_data_file(dir: &Path, table: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, table)?.ok_or_else(|| DataLoadError::MissingRequired {
        table: table.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Deserialize a whole table file in whichever format it is written.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list of records. For TOML files, extracts the array at
/// `toml_key` from the top-level table (an absent key is an empty list).
/// For RON and JSON, deserializes directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(path: &Path, toml_key: &str) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let Some(array) = table.get(toml_key) else {
                return Ok(Vec::new());
            };
            array
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

/// Load the records of an optional table; a missing file is an empty table.
pub fn load_table<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<(Vec<T>, PathBuf), DataLoadError> {
    match find_data_file(dir, table)? {
        Some(path) => Ok((deserialize_list(&path, table)?, path)),
        None => Ok((Vec::new(), dir.join(table))),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Resolve a definition name to its id.
pub fn resolve_name<V: Copy>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<V, DataLoadError> {
    map.get(name).copied().ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Resolve a nullable name column; `None` stays a wildcard.
pub fn resolve_optional<V: Copy>(
    map: &HashMap<String, V>,
    name: Option<&str>,
    file: &Path,
    expected_kind: &'static str,
) -> Result<Option<V>, DataLoadError> {
    name.map(|n| resolve_name(map, n, file, expected_kind)).transpose()
}

/// Reject a definition name that is already taken.
pub fn check_duplicate<V>(map: &HashMap<String, V>, name: &str, file: &Path) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
