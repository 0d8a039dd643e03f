// SPDX-License-Identifier: Apache-2.0

//! Batch loop
//!
//! Pulls at most one batch from the source cursor, splits it by target
//! partition, binds one value list per target column, executes and resets
//! the bindings before the next pull. Nothing beyond the current batch is
//! held in memory.

use std::collections::BTreeMap;

use polyfed_core::{EngineError, EngineResult, PartitionId, PolyValue};

use crate::engine::context::ExecutionContext;
use crate::engine::traits::{BoundStatement, RowCursor};
use crate::engine::types::Row;
use crate::metrics;
use crate::partition::{PartitionFunction, PartitionKey};

use super::target::TargetColumn;
use super::types::MigrationReport;

/// Decides which target partition a source row goes to
#[derive(Debug, Clone)]
pub enum PartitionRouter {
    Fixed(PartitionId),
    /// Partitioning-column value at `field` fed to `function`
    ByColumn { field: usize, function: PartitionFunction },
    /// The source has no partitioning value: every row is unassigned
    Unassigned(PartitionFunction),
}

impl PartitionRouter {
    pub fn route(&self, row: &[PolyValue]) -> EngineResult<PartitionId> {
        match self {
            PartitionRouter::Fixed(id) => Ok(*id),
            PartitionRouter::ByColumn { field, function } => row
                .get(*field)
                .map(|value| function.assign_value(value))
                .ok_or_else(|| EngineError::internal(format!("source row has no partitioning field {field}"))),
            PartitionRouter::Unassigned(function) => Ok(function.assign(&PartitionKey::Unassigned)),
        }
    }
}

/// Prepared target statement for one partition with its column mapping
pub struct TargetBinding {
    pub statement: Box<dyn BoundStatement>,
    pub columns: Vec<TargetColumn>,
}

pub struct BatchLoop<'a> {
    ctx: &'a ExecutionContext,
    batch_size: usize,
    router: PartitionRouter,
    targets: BTreeMap<PartitionId, TargetBinding>,
}

impl<'a> BatchLoop<'a> {
    pub fn new(
        ctx: &'a ExecutionContext,
        batch_size: usize,
        router: PartitionRouter,
        targets: BTreeMap<PartitionId, TargetBinding>,
    ) -> Self {
        Self {
            ctx,
            batch_size: batch_size.max(1),
            router,
            targets,
        }
    }

    /// Drains `cursor` into the targets, accumulating counts into `report`.
    pub fn run(mut self, mut cursor: RowCursor, report: &mut MigrationReport) -> EngineResult<()> {
        loop {
            let batch = cursor.next_batch(self.batch_size)?;
            if batch.is_empty() {
                break;
            }

            // Per-partition groups keep source order within each partition.
            let mut groups: BTreeMap<PartitionId, Vec<Row>> = BTreeMap::new();
            for row in batch {
                groups.entry(self.router.route(&row)?).or_default().push(row);
            }

            for (partition, rows) in groups {
                let written = self.write(partition, &rows)?;
                report.batches += 1;
                report.rows += rows.len() as u64;
                *report.partitions.entry(partition).or_default() += rows.len() as u64;
                metrics::record_batch(rows.len() as u64);
                tracing::debug!(
                    context = %self.ctx.id,
                    partition = %partition,
                    rows = rows.len(),
                    affected = written,
                    "Executed migration batch"
                );
            }
        }
        Ok(())
    }

    fn write(&mut self, partition: PartitionId, rows: &[Row]) -> EngineResult<u64> {
        let target = self.targets.get_mut(&partition).ok_or_else(|| {
            EngineError::validation(format!("no target placement for partition {partition}"))
        })?;
        let columns = &target.columns;
        let statement = &mut target.statement;
        let result = columns
            .iter()
            .try_for_each(|column| {
                let values = rows
                    .iter()
                    .map(|row| column.value(row))
                    .collect::<EngineResult<Vec<_>>>()?;
                statement.bind(column.column, &column.ty, values)
            })
            .and_then(|()| statement.execute(self.ctx));
        // A partial bind must not leak into the next batch.
        statement.reset_bindings();
        result
    }
}
