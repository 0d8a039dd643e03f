// SPDX-License-Identifier: Apache-2.0

//! polyfed: federated polystore core
//!
//! Canonical values cross every store boundary through a per-family type
//! space. Migrations and cross-store joins are planned against the catalog
//! and executed through the adapter driver surface.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod mapping;
pub mod metrics;
pub mod observability;
pub mod partition;
pub mod plan;
pub mod routing;
pub mod streamer;

pub use polyfed_core::{
    AdapterId, ColumnId, ColumnType, EngineError, EngineResult, PartitionId, PolyMap, PolyType, PolyValue, TableId,
};
