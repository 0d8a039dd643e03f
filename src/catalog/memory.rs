// SPDX-License-Identifier: Apache-2.0

//! In-process catalog backed by a `parking_lot::RwLock`.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use polyfed_core::{AdapterId, ColumnId, EngineError, EngineResult, PartitionId, TableId};

use super::{CatalogProvider, ColumnPlacement, TableMeta};

#[derive(Default)]
struct CatalogState {
    tables: BTreeMap<TableId, TableMeta>,
    placements: Vec<ColumnPlacement>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table after checking its keys, partitions and
    /// partitioning column refer to things that exist.
    pub fn add_table(&self, table: TableMeta) -> EngineResult<()> {
        if table.columns.is_empty() {
            return Err(EngineError::validation(format!("Table {} has no columns", table.name)));
        }
        if table.partitions.is_empty() {
            return Err(EngineError::validation(format!("Table {} has no partitions", table.name)));
        }
        for key in &table.primary_key {
            table.require_column(*key)?;
        }
        if let Some(partitioning) = &table.partitioning {
            table.require_column(partitioning.column)?;
            partitioning.function.validate(&table.partitions)?;
        }

        let mut state = self.state.write();
        if state.tables.contains_key(&table.id) {
            return Err(EngineError::validation(format!("Table {} is already registered", table.id)));
        }
        tracing::debug!(table = %table.id, name = %table.name, "Registered table");
        state.tables.insert(table.id, table);
        Ok(())
    }

    pub fn add_placement(&self, placement: ColumnPlacement) -> EngineResult<()> {
        let mut state = self.state.write();
        let table = state
            .tables
            .get(&placement.table)
            .ok_or_else(|| EngineError::validation(format!("Unknown table {}", placement.table)))?;
        table.require_column(placement.column)?;
        if !table.partitions.contains(&placement.partition) {
            return Err(EngineError::validation(format!(
                "Partition {} does not belong to table {}",
                placement.partition, placement.table
            )));
        }
        let duplicate = state.placements.iter().any(|p| {
            p.table == placement.table
                && p.column == placement.column
                && p.adapter == placement.adapter
                && p.partition == placement.partition
        });
        if duplicate {
            return Err(EngineError::validation(format!(
                "Column {} of partition {} is already placed on adapter {}",
                placement.column, placement.partition, placement.adapter
            )));
        }
        state.placements.push(placement);
        Ok(())
    }

    /// Returns whether a placement was removed.
    pub fn remove_placement(
        &self,
        table: TableId,
        column: ColumnId,
        adapter: AdapterId,
        partition: PartitionId,
    ) -> bool {
        let mut state = self.state.write();
        let before = state.placements.len();
        state.placements.retain(|p| {
            !(p.table == table && p.column == column && p.adapter == adapter && p.partition == partition)
        });
        state.placements.len() != before
    }

    /// Fails if some column of `table` has no placement at all.
    pub fn check_coverage(&self, table: TableId) -> EngineResult<()> {
        let state = self.state.read();
        let meta = state
            .tables
            .get(&table)
            .ok_or_else(|| EngineError::validation(format!("Unknown table {table}")))?;
        for column in &meta.columns {
            if !state.placements.iter().any(|p| p.table == table && p.column == column.id) {
                return Err(EngineError::validation(format!(
                    "Column {} of table {} has no placement",
                    column.name, meta.name
                )));
            }
        }
        Ok(())
    }
}

impl CatalogProvider for MemoryCatalog {
    fn table(&self, id: TableId) -> EngineResult<TableMeta> {
        self.state
            .read()
            .tables
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::validation(format!("Unknown table {id}")))
    }

    fn placements(&self, table: TableId) -> EngineResult<Vec<ColumnPlacement>> {
        let state = self.state.read();
        if !state.tables.contains_key(&table) {
            return Err(EngineError::validation(format!("Unknown table {table}")));
        }
        Ok(state.placements.iter().filter(|p| p.table == table).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, PhysicalName};
    use polyfed_core::PolyType;

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog
            .add_table(TableMeta {
                id: TableId(4),
                namespace: "public".into(),
                name: "t".into(),
                columns: vec![
                    ColumnMeta { id: ColumnId(1), name: "id".into(), ty: PolyType::BigInt.into() },
                    ColumnMeta { id: ColumnId(2), name: "v".into(), ty: PolyType::Varchar.into() },
                ],
                primary_key: vec![ColumnId(1)],
                partitions: vec![PartitionId(0)],
                partitioning: None,
            })
            .unwrap();
        catalog
    }

    fn placement(column: u64) -> ColumnPlacement {
        ColumnPlacement {
            table: TableId(4),
            column: ColumnId(column),
            adapter: AdapterId(1),
            partition: PartitionId(0),
            physical: PhysicalName::new("s", "t", format!("c{column}")),
        }
    }

    #[test]
    fn placements_are_validated_and_removable() {
        let catalog = catalog();
        catalog.add_placement(placement(1)).unwrap();
        assert!(catalog.add_placement(placement(1)).is_err());
        assert!(catalog.add_placement(placement(9)).is_err());
        assert!(catalog.check_coverage(TableId(4)).is_err());

        catalog.add_placement(placement(2)).unwrap();
        catalog.check_coverage(TableId(4)).unwrap();
        assert_eq!(catalog.placements_on(TableId(4), AdapterId(1)).unwrap().len(), 2);

        assert!(catalog.remove_placement(TableId(4), ColumnId(2), AdapterId(1), PartitionId(0)));
        assert!(!catalog.remove_placement(TableId(4), ColumnId(2), AdapterId(1), PartitionId(0)));
        assert!(catalog.placement(TableId(4), ColumnId(2), AdapterId(1), PartitionId(0)).unwrap().is_none());
    }

    #[test]
    fn unknown_primary_key_is_rejected() {
        let catalog = MemoryCatalog::new();
        let err = catalog.add_table(TableMeta {
            id: TableId(1),
            namespace: "public".into(),
            name: "bad".into(),
            columns: vec![ColumnMeta { id: ColumnId(1), name: "id".into(), ty: PolyType::BigInt.into() }],
            primary_key: vec![ColumnId(2)],
            partitions: vec![PartitionId(0)],
            partitioning: None,
        });
        assert!(err.is_err());
    }
}
