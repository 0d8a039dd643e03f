// SPDX-License-Identifier: Apache-2.0

// Adapter engine module
// Uniform surface over every backing store plus federated execution

pub mod context;
pub mod drivers;
pub mod executor;
pub mod registry;
pub mod sql_generator;
pub mod traits;
pub mod types;

pub use context::ExecutionContext;
pub use executor::FederatedExecutor;
pub use registry::AdapterRegistry;
pub use traits::{AdapterDriver, BoundParameters, BoundStatement, RowCursor};
pub use types::*;
