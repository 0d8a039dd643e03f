// SPDX-License-Identifier: Apache-2.0

//! PolyFed core: canonical types, values, identifiers and errors shared by
//! every adapter family.

pub mod error;
pub mod ids;
pub mod types;
pub mod value;

pub use error::{EngineError, EngineResult};
pub use ids::{AdapterId, ColumnId, PartitionId, TableId};
pub use types::{Collation, ColumnType, Conversion, PolyType, WrapperKind, DEFAULT_CHARSET};
pub use value::{
    ByteString, DateString, NlsString, PolyList, PolyMap, PolyValue, TimeString, TimestampString,
};
