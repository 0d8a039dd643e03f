// SPDX-License-Identifier: Apache-2.0

//! Async facade over [`DataMigrator`].
//!
//! Adapter calls block, so every migration runs on the blocking pool with a
//! context of its own. The deadline starts when the blocking task starts.

use std::sync::Arc;

use polyfed_core::{AdapterId, ColumnId, EngineError, EngineResult, PartitionId, TableId};

use crate::engine::context::ExecutionContext;
use crate::plan::PhysicalTable;

use super::migrator::DataMigrator;
use super::types::{Distribution, MigrationReport};

#[derive(Clone)]
pub struct RoutingService {
    migrator: Arc<DataMigrator>,
}

impl RoutingService {
    pub fn new(migrator: Arc<DataMigrator>) -> Self {
        Self { migrator }
    }

    pub fn migrator(&self) -> &DataMigrator {
        &self.migrator
    }

    async fn run<F>(&self, operation: &'static str, f: F) -> EngineResult<MigrationReport>
    where
        F: FnOnce(&DataMigrator, &ExecutionContext) -> EngineResult<MigrationReport> + Send + 'static,
    {
        let migrator = Arc::clone(&self.migrator);
        tokio::task::spawn_blocking(move || {
            let ctx = ExecutionContext::new(migrator.config().query_timeout());
            f(&migrator, &ctx)
        })
        .await
        .map_err(|e| EngineError::internal(format!("{operation} task failed: {e}")))?
    }

    pub async fn copy_data(
        &self,
        target: AdapterId,
        table: TableId,
        columns: Vec<ColumnId>,
        partitions: Vec<PartitionId>,
    ) -> EngineResult<MigrationReport> {
        self.run("copy_data", move |m, ctx| m.copy_data(ctx, target, table, &columns, &partitions))
            .await
    }

    pub async fn copy_selective_data(
        &self,
        target: AdapterId,
        table: TableId,
        columns: Vec<ColumnId>,
        distribution: Distribution,
        target_partitions: Vec<PartitionId>,
    ) -> EngineResult<MigrationReport> {
        self.run("copy_selective_data", move |m, ctx| {
            m.copy_selective_data(ctx, target, table, &columns, &distribution, &target_partitions)
        })
        .await
    }

    pub async fn copy_partition_data(
        &self,
        target: AdapterId,
        source_table: TableId,
        target_table: TableId,
        columns: Vec<ColumnId>,
        source_partitions: Vec<PartitionId>,
        target_partitions: Vec<PartitionId>,
    ) -> EngineResult<MigrationReport> {
        self.run("copy_partition_data", move |m, ctx| {
            m.copy_partition_data(
                ctx,
                target,
                source_table,
                target_table,
                &columns,
                &source_partitions,
                &target_partitions,
            )
        })
        .await
    }

    pub async fn merge_columns(
        &self,
        target: AdapterId,
        table: TableId,
        source_columns: Vec<ColumnId>,
        target_column: ColumnId,
        separator: String,
    ) -> EngineResult<MigrationReport> {
        self.run("merge_columns", move |m, ctx| {
            m.merge_columns(ctx, target, table, &source_columns, target_column, &separator)
        })
        .await
    }

    pub async fn copy_graph(
        &self,
        source: AdapterId,
        graph: String,
        target: AdapterId,
        target_graph: String,
    ) -> EngineResult<MigrationReport> {
        self.run("copy_graph", move |m, ctx| m.copy_graph(ctx, source, &graph, target, &target_graph))
            .await
    }

    pub async fn copy_collection(
        &self,
        source: AdapterId,
        collection: PhysicalTable,
        target: AdapterId,
        target_collection: PhysicalTable,
    ) -> EngineResult<MigrationReport> {
        self.run("copy_collection", move |m, ctx| {
            m.copy_collection(ctx, source, &collection, target, &target_collection)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::config::RuntimeConfig;
    use crate::engine::registry::AdapterRegistry;
    use crate::engine::types::{GraphEdge, GraphNode, GraphSnapshot};
    use crate::engine::drivers::MemoryAdapter;
    use crate::mapping::{CanonicalSpace, DocumentSpace};
    use crate::routing::types::MigrationMode;
    use polyfed_core::{PolyMap, PolyValue};

    fn service() -> (RoutingService, Arc<MemoryAdapter<CanonicalSpace>>, Arc<MemoryAdapter<DocumentSpace>>) {
        let source = Arc::new(MemoryAdapter::new(AdapterId(1), CanonicalSpace));
        let target = Arc::new(MemoryAdapter::new(AdapterId(2), DocumentSpace));
        let mut registry = AdapterRegistry::new();
        registry.register(source.clone());
        registry.register(target.clone());
        let migrator = DataMigrator::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(registry),
            Arc::new(RuntimeConfig::default()),
        );
        (RoutingService::new(Arc::new(migrator)), source, target)
    }

    #[tokio::test]
    async fn graph_copy_runs_on_the_blocking_pool() {
        let (service, source, target) = service();
        source.put_graph(
            "social",
            GraphSnapshot {
                nodes: vec![
                    GraphNode {
                        id: "a".into(),
                        labels: vec!["Person".into()],
                        properties: PolyMap::new().with("name", PolyValue::text("Ada")),
                    },
                    GraphNode {
                        id: "b".into(),
                        labels: vec!["Person".into()],
                        properties: PolyMap::new(),
                    },
                ],
                edges: vec![GraphEdge {
                    id: "e".into(),
                    label: "KNOWS".into(),
                    source: "a".into(),
                    target: "b".into(),
                    properties: PolyMap::new(),
                }],
            },
        );

        let report = service
            .copy_graph(AdapterId(1), "social".into(), AdapterId(2), "copy".into())
            .await
            .unwrap();
        assert_eq!(report.mode, MigrationMode::Insert);
        assert_eq!(report.rows, 3);
        assert_eq!(report.batches, 1);
        let copied = target.graph("copy").unwrap();
        assert_eq!(copied.nodes.len(), 2);
        assert_eq!(copied.edges.len(), 1);
    }

    #[tokio::test]
    async fn unknown_table_fails_with_context() {
        let (service, _, _) = service();
        let err = service
            .copy_data(AdapterId(2), TableId(9), vec![ColumnId(1)], vec![PartitionId(0)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Migration { .. }));
    }
}
