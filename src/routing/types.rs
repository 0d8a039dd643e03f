// SPDX-License-Identifier: Apache-2.0

//! Routing data types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use polyfed_core::{AdapterId, PartitionId, TableId};

use crate::catalog::ColumnPlacement;

/// Source placements to read, per partition
pub type Distribution = BTreeMap<PartitionId, Vec<ColumnPlacement>>;

/// Row transform applied on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// The target holds no other columns of the table yet
    Insert,
    /// Sets the copied columns on rows matched by primary key
    Update,
    /// Concatenates several source columns into one target column
    Merge,
}

/// Outcome of one migration call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// `None` for graph and collection copies
    pub table: Option<TableId>,
    pub target: AdapterId,
    pub mode: MigrationMode,
    pub rows: u64,
    pub batches: u64,
    /// Rows written per target partition
    pub partitions: BTreeMap<PartitionId, u64>,
    /// Source was empty and nothing was written
    pub skipped: bool,
}

impl MigrationReport {
    pub fn new(table: Option<TableId>, target: AdapterId, mode: MigrationMode) -> Self {
        Self {
            table,
            target,
            mode,
            rows: 0,
            batches: 0,
            partitions: BTreeMap::new(),
            skipped: false,
        }
    }
}
