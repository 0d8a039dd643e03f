// SPDX-License-Identifier: Apache-2.0

//! Catalog model
//!
//! Read-only view of logical tables, their columns and partitions, and
//! where each column physically lives. The routing engine treats the
//! catalog as immutable for the duration of one migration call.

pub mod memory;

use serde::{Deserialize, Serialize};

use polyfed_core::{AdapterId, ColumnId, ColumnType, EngineError, EngineResult, PartitionId, TableId};

use crate::engine::types::TableDefinition;
use crate::partition::PartitionFunction;
use crate::plan::PhysicalTable;

pub use memory::MemoryCatalog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub id: ColumnId,
    pub name: String,
    pub ty: ColumnType,
}

/// How rows of a table are assigned to its partitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partitioning {
    pub column: ColumnId,
    pub function: PartitionFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub namespace: String,
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnMeta>,
    pub primary_key: Vec<ColumnId>,
    /// Ordered partition ids; unpartitioned tables have exactly one
    pub partitions: Vec<PartitionId>,
    #[serde(default)]
    pub partitioning: Option<Partitioning>,
}

impl TableMeta {
    pub fn column(&self, id: ColumnId) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn require_column(&self, id: ColumnId) -> EngineResult<&ColumnMeta> {
        self.column(id)
            .ok_or_else(|| EngineError::planning(self.id, format!("column {id} is not part of {}", self.name)))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_primary_key(&self, id: ColumnId) -> bool {
        self.primary_key.contains(&id)
    }

    /// Position of a column in declaration order.
    pub fn position(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    /// `columns` extended with any primary-key column not already listed,
    /// then ordered by declaration order.
    pub fn with_primary_key(&self, columns: &[ColumnId]) -> Vec<ColumnId> {
        let mut out: Vec<ColumnId> = self
            .columns
            .iter()
            .map(|c| c.id)
            .filter(|id| columns.contains(id) || self.is_primary_key(*id))
            .collect();
        out.dedup();
        out
    }
}

/// Adapter-side names of one placed column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalName {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl PhysicalName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

/// One physical copy of one column of one partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPlacement {
    pub table: TableId,
    pub column: ColumnId,
    pub adapter: AdapterId,
    pub partition: PartitionId,
    pub physical: PhysicalName,
}

impl ColumnPlacement {
    pub fn physical_table(&self) -> PhysicalTable {
        PhysicalTable::new(&self.physical.schema, &self.physical.table)
    }
}

/// Metadata lookups the routing engine needs.
pub trait CatalogProvider: Send + Sync {
    fn table(&self, id: TableId) -> EngineResult<TableMeta>;

    /// Every placement of every column of `table`.
    fn placements(&self, table: TableId) -> EngineResult<Vec<ColumnPlacement>>;

    fn placements_on(&self, table: TableId, adapter: AdapterId) -> EngineResult<Vec<ColumnPlacement>> {
        Ok(self
            .placements(table)?
            .into_iter()
            .filter(|p| p.adapter == adapter)
            .collect())
    }

    fn placements_of_partition(&self, table: TableId, partition: PartitionId) -> EngineResult<Vec<ColumnPlacement>> {
        Ok(self
            .placements(table)?
            .into_iter()
            .filter(|p| p.partition == partition)
            .collect())
    }

    /// Placement of `column` on `adapter` for `partition`, if any.
    fn placement(
        &self,
        table: TableId,
        column: ColumnId,
        adapter: AdapterId,
        partition: PartitionId,
    ) -> EngineResult<Option<ColumnPlacement>> {
        Ok(self
            .placements(table)?
            .into_iter()
            .find(|p| p.column == column && p.adapter == adapter && p.partition == partition))
    }
}

/// Physical layout of one partition of `table` on one adapter, derived from
/// its placements there. Fails if any primary-key column is missing.
pub fn table_definition(
    table: &TableMeta,
    placements: &[ColumnPlacement],
    adapter: AdapterId,
    partition: PartitionId,
) -> EngineResult<TableDefinition> {
    let local: Vec<&ColumnPlacement> = placements
        .iter()
        .filter(|p| p.table == table.id && p.adapter == adapter && p.partition == partition)
        .collect();
    let Some(first) = local.first() else {
        return Err(EngineError::planning(
            table.id,
            format!("no placements on adapter {adapter} for partition {partition}"),
        ));
    };
    let physical = first.physical_table();

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for column in &table.columns {
        let Some(placement) = local.iter().find(|p| p.column == column.id) else {
            if table.is_primary_key(column.id) {
                return Err(EngineError::planning(
                    table.id,
                    format!("primary key column {} is not placed on adapter {adapter}", column.name),
                ));
            }
            continue;
        };
        if placement.physical_table() != physical {
            return Err(EngineError::planning(
                table.id,
                format!("column {} is placed in {} but expected {physical}", column.name, placement.physical_table()),
            ));
        }
        columns.push((placement.physical.column.clone(), column.ty.clone()));
        if table.is_primary_key(column.id) {
            primary_key.push(placement.physical.column.clone());
        }
    }
    Ok(TableDefinition {
        physical,
        columns,
        primary_key,
    })
}
