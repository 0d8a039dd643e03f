// SPDX-License-Identifier: Apache-2.0

//! Data Migrator
//!
//! Copies or reshapes rows between placements. Every operation follows the
//! same sequence: build the source plan, build and prepare the target plan,
//! open the source cursor, then run the batch loop until the cursor is
//! exhausted. Any failure aborts the whole call; batches already executed
//! stay as the target committed them.

use std::collections::BTreeMap;
use std::sync::Arc;

use polyfed_core::{AdapterId, ColumnId, EngineError, EngineResult, PartitionId, PolyValue, TableId};

use crate::catalog::{CatalogProvider, ColumnPlacement, TableMeta};
use crate::config::RuntimeConfig;
use crate::engine::context::ExecutionContext;
use crate::engine::executor::FederatedExecutor;
use crate::engine::registry::AdapterRegistry;
use crate::engine::types::document_type;
use crate::metrics;
use crate::plan::{field_index, Field, ModifyInput, ModifyOp, ModifyTarget, PhysicalTable, Plan};

use super::batch::{BatchLoop, PartitionRouter, TargetBinding};
use super::source::{build_source_plan, select_source_placements};
use super::target::{
    build_target_plan, choose_mode, resolve_merge_columns, resolve_target_columns, TargetColumn,
};
use super::types::{Distribution, MigrationMode, MigrationReport};

pub struct DataMigrator {
    catalog: Arc<dyn CatalogProvider>,
    registry: Arc<AdapterRegistry>,
    config: Arc<RuntimeConfig>,
}

impl DataMigrator {
    pub fn new(catalog: Arc<dyn CatalogProvider>, registry: Arc<AdapterRegistry>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            catalog,
            registry,
            config,
        }
    }

    pub fn catalog(&self) -> &dyn CatalogProvider {
        self.catalog.as_ref()
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ==================== Relational copies ====================

    /// Copies `columns` (plus the primary key) of each listed partition from
    /// wherever they are placed to `target`, whose placements for them must
    /// already be registered.
    #[tracing::instrument(skip(self, ctx, columns, partitions), fields(context = %ctx.id))]
    pub fn copy_data(
        &self,
        ctx: &ExecutionContext,
        target: AdapterId,
        table: TableId,
        columns: &[ColumnId],
        partitions: &[PartitionId],
    ) -> EngineResult<MigrationReport> {
        self.guarded(table, target, || {
            let meta = self.catalog.table(table)?;
            let target_placements = self.catalog.placements_on(table, target)?;
            let mode = choose_mode(&meta, &target_placements, columns);
            let batch_size = self.config.migration_batch_size();
            let mut report = MigrationReport::new(Some(table), target, mode);

            for &partition in partitions {
                let distribution =
                    select_source_placements(self.catalog.as_ref(), &meta, columns, &[partition], Some(target))?;
                let source = build_source_plan(ctx.planner().builder(), &meta, columns, &distribution)?;
                let placements = of_partition(&target_placements, partition);
                let binding = self.bind_target(ctx, &meta, target, &placements, mode, |fields| {
                    resolve_target_columns(&meta, fields, &placements, columns)
                }, &source)?;
                self.run(ctx, &source, batch_size, PartitionRouter::Fixed(partition), [(partition, binding)].into(), &mut report)?;
            }
            Ok(report)
        })
    }

    /// Copies `columns` from an explicit source distribution into the given
    /// target partitions. With more than one target partition, rows are
    /// routed by the table's partition function.
    #[tracing::instrument(skip(self, ctx, columns, distribution, target_partitions), fields(context = %ctx.id))]
    pub fn copy_selective_data(
        &self,
        ctx: &ExecutionContext,
        target: AdapterId,
        table: TableId,
        columns: &[ColumnId],
        distribution: &Distribution,
        target_partitions: &[PartitionId],
    ) -> EngineResult<MigrationReport> {
        self.guarded(table, target, || {
            let meta = self.catalog.table(table)?;
            let target_placements = self.catalog.placements_on(table, target)?;
            let mode = choose_mode(&meta, &target_placements, columns);
            let batch_size = self.config.migration_batch_size();

            let (source_columns, partition_column) = with_partition_column(&meta, &meta, columns, target_partitions)?;
            let source = build_source_plan(ctx.planner().builder(), &meta, &source_columns, distribution)?;
            let router = router_for(&meta, &source.fields(), target_partitions, partition_column.as_deref())?;

            let mut targets = BTreeMap::new();
            for &partition in target_partitions {
                let placements = of_partition(&target_placements, partition);
                let binding = self.bind_target(ctx, &meta, target, &placements, mode, |fields| {
                    resolve_target_columns(&meta, fields, &placements, columns)
                }, &source)?;
                targets.insert(partition, binding);
            }

            let mut report = MigrationReport::new(Some(table), target, mode);
            self.run(ctx, &source, batch_size, router, targets, &mut report)?;
            Ok(report)
        })
    }

    /// Re-partitions: reads `source_partitions` of `source_table` and writes
    /// every row to the partition of `target_table` its partitioning value
    /// maps to. Target columns are matched to source columns by name.
    #[tracing::instrument(skip(self, ctx, columns, source_partitions, target_partitions), fields(context = %ctx.id))]
    #[allow(clippy::too_many_arguments)]
    pub fn copy_partition_data(
        &self,
        ctx: &ExecutionContext,
        target: AdapterId,
        source_table: TableId,
        target_table: TableId,
        columns: &[ColumnId],
        source_partitions: &[PartitionId],
        target_partitions: &[PartitionId],
    ) -> EngineResult<MigrationReport> {
        self.guarded(target_table, target, || {
            let source_meta = self.catalog.table(source_table)?;
            let target_meta = self.catalog.table(target_table)?;
            let target_columns = columns
                .iter()
                .map(|id| {
                    let name = &source_meta.require_column(*id)?.name;
                    target_meta.column_by_name(name).map(|c| c.id).ok_or_else(|| {
                        EngineError::planning(target_table, format!("target table has no column named {name}"))
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?;

            let target_placements = self.catalog.placements_on(target_table, target)?;
            let mode = choose_mode(&target_meta, &target_placements, &target_columns);
            let batch_size = self.config.migration_batch_size();

            let (source_columns, partition_column) =
                with_partition_column(&source_meta, &target_meta, columns, target_partitions)?;
            let distribution =
                select_source_placements(self.catalog.as_ref(), &source_meta, &source_columns, source_partitions, None)?;
            let source = build_source_plan(ctx.planner().builder(), &source_meta, &source_columns, &distribution)?;
            let router = router_for(&target_meta, &source.fields(), target_partitions, partition_column.as_deref())?;

            let mut targets = BTreeMap::new();
            for &partition in target_partitions {
                let placements = of_partition(&target_placements, partition);
                let binding = self.bind_target(ctx, &target_meta, target, &placements, mode, |fields| {
                    resolve_target_columns(&target_meta, fields, &placements, &target_columns)
                }, &source)?;
                targets.insert(partition, binding);
            }

            let mut report = MigrationReport::new(Some(target_table), target, mode);
            self.run(ctx, &source, batch_size, router, targets, &mut report)?;
            Ok(report)
        })
    }

    /// Fills `target_column` on `target` with the non-null values of
    /// `source_columns` joined by `separator`, matching rows by primary key.
    #[tracing::instrument(skip(self, ctx, source_columns), fields(context = %ctx.id))]
    pub fn merge_columns(
        &self,
        ctx: &ExecutionContext,
        target: AdapterId,
        table: TableId,
        source_columns: &[ColumnId],
        target_column: ColumnId,
        separator: &str,
    ) -> EngineResult<MigrationReport> {
        self.guarded(table, target, || {
            let meta = self.catalog.table(table)?;
            let target_placements = self.catalog.placements_on(table, target)?;
            let batch_size = self.config.migration_batch_size();
            let mut report = MigrationReport::new(Some(table), target, MigrationMode::Merge);

            for &partition in &meta.partitions {
                let distribution =
                    select_source_placements(self.catalog.as_ref(), &meta, source_columns, &[partition], None)?;
                let source = build_source_plan(ctx.planner().builder(), &meta, source_columns, &distribution)?;
                let placements = of_partition(&target_placements, partition);
                let binding = self.bind_target(ctx, &meta, target, &placements, MigrationMode::Merge, |fields| {
                    resolve_merge_columns(&meta, fields, &placements, source_columns, target_column, separator)
                }, &source)?;
                self.run(ctx, &source, batch_size, PartitionRouter::Fixed(partition), [(partition, binding)].into(), &mut report)?;
            }
            Ok(report)
        })
    }

    // ==================== Graph and document copies ====================

    /// Copies a whole property graph in one write. An empty graph is not
    /// written at all.
    #[tracing::instrument(skip(self, ctx), fields(context = %ctx.id))]
    pub fn copy_graph(
        &self,
        ctx: &ExecutionContext,
        source: AdapterId,
        graph: &str,
        target: AdapterId,
        target_graph: &str,
    ) -> EngineResult<MigrationReport> {
        self.guarded_untabled(target, || {
            ctx.check_deadline()?;
            let snapshot = self.registry.require(source)?.scan_graph(graph)?;
            let mut report = MigrationReport::new(None, target, MigrationMode::Insert);
            if snapshot.is_empty() {
                report.skipped = true;
                tracing::info!(graph, "Source graph is empty; nothing to copy");
                return Ok(report);
            }
            let count = (snapshot.nodes.len() + snapshot.edges.len()) as u64;
            let input = ctx.planner().builder().graph(snapshot);
            self.write_once(ctx, target, ModifyTarget::Graph(target_graph.to_string()), input, count, &mut report)?;
            Ok(report)
        })
    }

    /// Copies every document of a collection in one write. An empty
    /// collection is not written at all.
    #[tracing::instrument(skip(self, ctx), fields(context = %ctx.id))]
    pub fn copy_collection(
        &self,
        ctx: &ExecutionContext,
        source: AdapterId,
        collection: &PhysicalTable,
        target: AdapterId,
        target_collection: &PhysicalTable,
    ) -> EngineResult<MigrationReport> {
        self.guarded_untabled(target, || {
            ctx.check_deadline()?;
            let documents = self.registry.require(source)?.scan_collection(collection)?;
            let mut report = MigrationReport::new(None, target, MigrationMode::Insert);
            if documents.is_empty() {
                report.skipped = true;
                tracing::info!(%collection, "Source collection is empty; nothing to copy");
                return Ok(report);
            }
            let count = documents.len() as u64;
            let input = ctx.planner().builder().values(
                vec![Field::new("document", document_type())],
                documents.into_iter().map(|doc| vec![PolyValue::Map(doc)]).collect(),
            )?;
            self.write_once(ctx, target, ModifyTarget::Collection(target_collection.clone()), input, count, &mut report)?;
            Ok(report)
        })
    }

    // ==================== Helpers ====================

    /// Builds, prepares and pairs the target statement with its column
    /// mapping, resolved against the source plan's fields.
    #[allow(clippy::too_many_arguments)]
    fn bind_target(
        &self,
        ctx: &ExecutionContext,
        meta: &TableMeta,
        target: AdapterId,
        placements: &[ColumnPlacement],
        mode: MigrationMode,
        resolve: impl FnOnce(&[Field]) -> EngineResult<Vec<TargetColumn>>,
        source: &Plan,
    ) -> EngineResult<TargetBinding> {
        let columns = resolve(&source.fields())?;
        let plan = build_target_plan(ctx.planner().builder(), meta, target, placements, mode, &columns)?;
        let statement = self.registry.require(target)?.prepare(&plan)?;
        Ok(TargetBinding { statement, columns })
    }

    fn run(
        &self,
        ctx: &ExecutionContext,
        source: &Plan,
        batch_size: usize,
        router: PartitionRouter,
        targets: BTreeMap<PartitionId, TargetBinding>,
        report: &mut MigrationReport,
    ) -> EngineResult<()> {
        let cursor = FederatedExecutor::new(Arc::clone(&self.registry)).execute(ctx, source)?;
        BatchLoop::new(ctx, batch_size, router, targets).run(cursor, report)
    }

    fn write_once(
        &self,
        ctx: &ExecutionContext,
        target: AdapterId,
        modify_target: ModifyTarget,
        input: Plan,
        count: u64,
        report: &mut MigrationReport,
    ) -> EngineResult<()> {
        let plan = ctx.planner().builder().modify(
            target,
            modify_target,
            ModifyOp::Insert,
            Vec::new(),
            ModifyInput::Plan(Box::new(input)),
        )?;
        let mut statement = self.registry.require(target)?.prepare(&plan)?;
        statement.execute(ctx)?;
        report.rows = count;
        report.batches = 1;
        metrics::record_batch(count);
        Ok(())
    }

    fn guarded(
        &self,
        table: TableId,
        target: AdapterId,
        body: impl FnOnce() -> EngineResult<MigrationReport>,
    ) -> EngineResult<MigrationReport> {
        metrics::record_migration_started();
        match body() {
            Ok(report) => {
                log_finished(&report);
                Ok(report)
            }
            Err(e) => {
                metrics::record_migration_failed();
                tracing::error!(table = %table, target_adapter = %target, error = %e, "Migration failed");
                Err(EngineError::migration(table, target, e))
            }
        }
    }

    fn guarded_untabled(
        &self,
        target: AdapterId,
        body: impl FnOnce() -> EngineResult<MigrationReport>,
    ) -> EngineResult<MigrationReport> {
        metrics::record_migration_started();
        let result = body();
        match &result {
            Ok(report) => log_finished(report),
            Err(e) => {
                metrics::record_migration_failed();
                tracing::error!(target_adapter = %target, error = %e, "Migration failed");
            }
        }
        result
    }
}

fn log_finished(report: &MigrationReport) {
    tracing::info!(
        target_adapter = %report.target,
        mode = ?report.mode,
        rows = report.rows,
        batches = report.batches,
        skipped = report.skipped,
        "Migration finished"
    );
}

fn of_partition(placements: &[ColumnPlacement], partition: PartitionId) -> Vec<ColumnPlacement> {
    placements.iter().filter(|p| p.partition == partition).cloned().collect()
}

/// Source columns extended with the column the router needs, and that
/// column's name, when more than one target partition is written. A source
/// without the column yields no name.
fn with_partition_column(
    source: &TableMeta,
    target: &TableMeta,
    columns: &[ColumnId],
    target_partitions: &[PartitionId],
) -> EngineResult<(Vec<ColumnId>, Option<String>)> {
    if target_partitions.len() <= 1 {
        return Ok((columns.to_vec(), None));
    }
    let partitioning = target.partitioning.as_ref().ok_or_else(|| {
        EngineError::planning(target.id, "several target partitions but the table is not partitioned")
    })?;
    let name = target.require_column(partitioning.column)?.name.clone();
    let Some(source_column) = source.column_by_name(&name) else {
        tracing::warn!(
            source = %source.id,
            column = %name,
            "Source has no partitioning column; rows go to the unbound partition"
        );
        return Ok((columns.to_vec(), None));
    };
    let mut out = columns.to_vec();
    if !out.contains(&source_column.id) {
        out.push(source_column.id);
    }
    Ok((out, Some(name)))
}

fn router_for(
    target: &TableMeta,
    fields: &[Field],
    target_partitions: &[PartitionId],
    partition_column: Option<&str>,
) -> EngineResult<PartitionRouter> {
    match (target_partitions, partition_column) {
        ([], _) => Err(EngineError::planning(target.id, "no target partitions")),
        ([only], _) => Ok(PartitionRouter::Fixed(*only)),
        (_, Some(name)) => {
            let field = field_index(fields, name)
                .ok_or_else(|| EngineError::planning(target.id, format!("source provides no field named {name}")))?;
            let function = target
                .partitioning
                .as_ref()
                .map(|p| p.function.clone())
                .ok_or_else(|| EngineError::planning(target.id, "table is not partitioned"))?;
            Ok(PartitionRouter::ByColumn { field, function })
        }
        (_, None) => target
            .partitioning
            .as_ref()
            .map(|p| PartitionRouter::Unassigned(p.function.clone()))
            .ok_or_else(|| EngineError::planning(target.id, "several target partitions but the table is not partitioned")),
    }
}
