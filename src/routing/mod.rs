// SPDX-License-Identifier: Apache-2.0

//! Migration / routing engine
//!
//! Copies and reshapes rows between column placements: picks the source
//! placements, builds the read and write plans, and streams rows through a
//! bounded batch loop.

pub mod batch;
pub mod migrator;
pub mod service;
pub mod source;
pub mod target;
pub mod types;

pub use batch::{BatchLoop, PartitionRouter, TargetBinding};
pub use migrator::DataMigrator;
pub use service::RoutingService;
pub use source::{build_source_plan, select_source_placements};
pub use target::{choose_mode, TargetColumn, TargetSource};
pub use types::{Distribution, MigrationMode, MigrationReport};
