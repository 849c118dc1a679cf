//! Error and warning types shared across the engine.
//!
//! Configuration problems are detected while a scenario is built and are
//! fatal before any simulation starts. Internal invariant failures are a
//! separate family: they indicate an engine bug or a corrupted snapshot,
//! never a bad input table. Consistency warnings are non-fatal; they are
//! logged through `tracing` and kept on the built scenario.

use crate::id::*;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// A problem with scenario configuration. Every message starts with the
/// name of the table the offending record came from.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{table}: missing required value: {detail}")]
    MissingRequired { table: String, detail: String },

    #[error("{table}: {detail}")]
    Invalid { table: String, detail: String },

    #[error("{table}: duplicate record for key {key}")]
    Duplicate { table: String, key: String },

    #[error("{table}: invalid distribution: {detail}")]
    InvalidDistribution { table: String, detail: String },

    #[error("{table}: record has neither a value nor a distribution")]
    NoValue { table: String },

    #[error("{table}: unknown {kind} {id}")]
    UnknownReference {
        table: String,
        kind: &'static str,
        id: i32,
    },

    #[error("{table}: raster metadata mismatch for '{file}': {detail}")]
    SpatialMetadataMismatch {
        table: String,
        file: String,
        detail: String,
    },
}

impl ConfigError {
    /// Name of the table the error refers to.
    pub fn table(&self) -> &str {
        match self {
            ConfigError::MissingRequired { table, .. }
            | ConfigError::Invalid { table, .. }
            | ConfigError::Duplicate { table, .. }
            | ConfigError::InvalidDistribution { table, .. }
            | ConfigError::NoValue { table }
            | ConfigError::UnknownReference { table, .. }
            | ConfigError::SpatialMetadataMismatch { table, .. } => table,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal invariant failures
// ---------------------------------------------------------------------------

/// An internal invariant was violated while simulating.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantError {
    #[error("cell {cell} has a zero stratum or state class")]
    ZeroStratumOrStateClass { cell: CellId },

    #[error("cell {cell} has negative age {age}")]
    NegativeAge { cell: CellId, age: i32 },

    #[error("stratum {0} is not registered")]
    UnknownStratum(StratumId),

    #[error("state class {0} is not registered")]
    UnknownStateClass(StateClassId),

    #[error("cell {cell} missing from the index of stratum {stratum}")]
    CellNotInStratum { cell: CellId, stratum: StratumId },

    #[error("amount per cell must be positive, got {0}")]
    NonPositiveCellAmount(f64),

    #[error("no iteration has been started")]
    IterationNotStarted,
}

// ---------------------------------------------------------------------------
// Top-level simulation error
// ---------------------------------------------------------------------------

/// Errors returned by simulation driver operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

// ---------------------------------------------------------------------------
// Consistency warnings
// ---------------------------------------------------------------------------

/// A non-fatal inconsistency with a documented fallback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsistencyWarning {
    /// The first primary group found is used for selection bookkeeping.
    #[error("the transition type '{transition_type}' has more than one transition simulation group")]
    MultiplePrimaryGroups {
        transition_type: String,
        groups: Vec<TransitionGroupId>,
    },

    /// Neutral multipliers of 1.0 are used for the group.
    #[error("adjacency settings for group {group} have no adjacency multipliers; using 1.0")]
    MissingAdjacencyMultipliers { group: TransitionGroupId },

    /// The raster is used as-is.
    #[error("raster '{file}' differs from the initial conditions in unimportant metadata")]
    UnimportantMetadataDifference { file: String },

    /// The multiplier raster is ignored for this run.
    #[error("raster '{file}' has a different row/column count and was skipped")]
    MismatchedRasterSkipped { file: String },

    /// The group is processed in shuffled order after ordered groups.
    #[error("transition order refers to group {group} which has no primary types")]
    OrderForNonPrimaryGroup { group: TransitionGroupId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_table_first() {
        let err = ConfigError::NoValue {
            table: "Transition Targets".into(),
        };
        assert!(err.to_string().starts_with("Transition Targets:"));
        assert_eq!(err.table(), "Transition Targets");
    }

    #[test]
    fn sim_error_wraps_both_families() {
        let a: SimError = ConfigError::Invalid {
            table: "Run Control".into(),
            detail: "bad".into(),
        }
        .into();
        let b: SimError = InvariantError::IterationNotStarted.into();
        assert!(matches!(a, SimError::Config(_)));
        assert!(matches!(b, SimError::Invariant(_)));
    }

    #[test]
    fn primary_group_warning_text() {
        let w = ConsistencyWarning::MultiplePrimaryGroups {
            transition_type: "Fire".into(),
            groups: vec![TransitionGroupId(1), TransitionGroupId(2)],
        };
        assert_eq!(
            w.to_string(),
            "the transition type 'Fire' has more than one transition simulation group"
        );
    }
}
