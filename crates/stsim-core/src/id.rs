use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares an integer identifier newtype. Identifier `0` is reserved for
/// "no data" in raster inputs, so registries hand out ids starting at 1.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> i32 {
                id.0
            }
        }
    };
}

id_type! {
    /// Identifies a stratum (primary, secondary or tertiary).
    StratumId
}

id_type! {
    /// Identifies a state class.
    StateClassId
}

id_type! {
    /// Identifies a transition type.
    TransitionTypeId
}

id_type! {
    /// Identifies a transition group, user-defined or auto-generated.
    TransitionGroupId
}

id_type! {
    /// Identifies a transition multiplier type.
    MultiplierTypeId
}

id_type! {
    /// Identifies a state or transition attribute type.
    AttributeTypeId
}

id_type! {
    /// Identifies a user-defined discrete distribution.
    DistributionId
}

id_type! {
    /// Identifies a landscape cell. For spatial runs this is the raster
    /// cell index, which need not equal the collection index.
    CellId
}

impl StratumId {
    /// The "no data" stratum used by raster inputs.
    pub const NONE: StratumId = StratumId(0);
}

impl StateClassId {
    /// The "no data" state class used by raster inputs.
    pub const NONE: StateClassId = StateClassId(0);
}
