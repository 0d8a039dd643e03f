// SPDX-License-Identifier: Apache-2.0

//! Catalog identifiers shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! catalog_id {
    ($(#[$meta:meta])* $name:ident, $repr:ty) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

catalog_id!(
    /// Logical table identifier
    TableId,
    u64
);
catalog_id!(
    /// Logical column identifier (unique across the catalog)
    ColumnId,
    u64
);
catalog_id!(
    /// Backing store identifier
    AdapterId,
    u32
);
catalog_id!(
    /// Partition identifier
    PartitionId,
    u64
);
