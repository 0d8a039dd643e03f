// SPDX-License-Identifier: Apache-2.0

//! Adapter driver surface
//!
//! The core never talks to a store directly. Every read goes through
//! [`AdapterDriver::open_cursor`] and every write through a prepared
//! [`BoundStatement`]: bind one value list per target column, execute,
//! reset, repeat. Implementations are synchronous; async callers wrap them
//! in `spawn_blocking`.

use std::collections::HashMap;
use std::fmt;

use polyfed_core::{AdapterId, ColumnId, ColumnType, EngineError, EngineResult, PolyMap, PolyValue};

use crate::engine::context::ExecutionContext;
use crate::engine::types::{AdapterCapabilities, GraphSnapshot, Row, TableDefinition};
use crate::mapping::Family;
use crate::plan::{Field, ModifyColumn, PhysicalTable, Plan};

/// Core trait every backing store implements
pub trait AdapterDriver: Send + Sync {
    fn adapter_id(&self) -> AdapterId;

    /// Human-readable name, e.g. "duckdb" or "memory-document"
    fn adapter_name(&self) -> &str;

    /// Type space used to convert this adapter's native values
    fn family(&self) -> Family;

    fn capabilities(&self) -> AdapterCapabilities;

    /// Whether this adapter can run `plan` as a whole.
    fn can_execute(&self, plan: &Plan) -> bool {
        plan.pushdown_adapter() == Some(self.adapter_id())
    }

    fn create_table(&self, definition: &TableDefinition) -> EngineResult<()>;

    fn drop_table(&self, table: &PhysicalTable) -> EngineResult<()>;

    /// Cheap row count used by the join streamer's side selection.
    fn row_count_estimate(&self, table: &PhysicalTable) -> EngineResult<Option<u64>>;

    /// Opens a cursor over a plan this adapter can execute.
    fn cursor(&self, plan: &Plan) -> EngineResult<RowCursor>;

    /// Deadline-checked entry point for [`AdapterDriver::cursor`].
    fn open_cursor(&self, ctx: &ExecutionContext, plan: &Plan) -> EngineResult<RowCursor> {
        ctx.check_deadline()?;
        self.cursor(plan)
    }

    /// Prepares a modify plan for repeated bind/execute cycles.
    fn prepare(&self, plan: &Plan) -> EngineResult<Box<dyn BoundStatement>>;

    fn scan_graph(&self, name: &str) -> EngineResult<GraphSnapshot> {
        Err(EngineError::not_supported(format!(
            "{} does not store graphs (requested '{name}')",
            self.adapter_name()
        )))
    }

    fn scan_collection(&self, collection: &PhysicalTable) -> EngineResult<Vec<PolyMap>> {
        Err(EngineError::not_supported(format!(
            "{} does not store document collections (requested {collection})",
            self.adapter_name()
        )))
    }
}

/// A prepared target statement with per-column parameter lists
pub trait BoundStatement: Send {
    /// Binds the value list for one target column. Every bound list must
    /// have the same length: one entry per row of the batch.
    fn bind(&mut self, column: ColumnId, ty: &ColumnType, values: Vec<PolyValue>) -> EngineResult<()>;

    /// Runs the statement over the current bindings; returns affected rows.
    fn execute_bound(&mut self) -> EngineResult<u64>;

    /// Deadline-checked entry point for [`BoundStatement::execute_bound`].
    fn execute(&mut self, ctx: &ExecutionContext) -> EngineResult<u64> {
        ctx.check_deadline()?;
        self.execute_bound()
    }

    /// Clears every binding; must run before the next batch is bound.
    fn reset_bindings(&mut self);
}

/// Column-wise parameter store shared by statement implementations.
#[derive(Debug, Clone)]
pub struct BoundParameters {
    columns: Vec<ModifyColumn>,
    values: HashMap<ColumnId, Vec<PolyValue>>,
}

impl BoundParameters {
    pub fn new(columns: Vec<ModifyColumn>) -> Self {
        Self {
            columns,
            values: HashMap::new(),
        }
    }

    pub fn columns(&self) -> &[ModifyColumn] {
        &self.columns
    }

    pub fn bind(&mut self, column: ColumnId, ty: &ColumnType, values: Vec<PolyValue>) -> EngineResult<()> {
        let target = self
            .columns
            .iter()
            .find(|c| c.column == column)
            .ok_or_else(|| EngineError::validation(format!("Column {column} is not a parameter of this statement")))?;
        if target.ty.kind != ty.kind {
            return Err(EngineError::validation(format!(
                "Column {column} expects {} but was bound as {}",
                target.ty, ty
            )));
        }
        if let Some(existing) = self.values.values().next() {
            if existing.len() != values.len() {
                return Err(EngineError::validation(format!(
                    "Column {column} bound with {} values, other columns have {}",
                    values.len(),
                    existing.len()
                )));
            }
        }
        self.values.insert(column, values);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound values transposed into rows, in statement column order.
    pub fn rows(&self) -> EngineResult<Vec<Row>> {
        let lists = self
            .columns
            .iter()
            .map(|c| {
                self.values
                    .get(&c.column)
                    .ok_or_else(|| EngineError::validation(format!("Column {} ({}) was not bound", c.column, c.physical)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let count = lists.first().map_or(0, |l| l.len());
        Ok((0..count)
            .map(|i| lists.iter().map(|l| l[i].clone()).collect())
            .collect())
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

type RowIter = Box<dyn Iterator<Item = EngineResult<Row>> + Send>;

/// Forward-only row source returned by [`AdapterDriver::open_cursor`]
pub struct RowCursor {
    fields: Vec<Field>,
    rows: RowIter,
}

impl RowCursor {
    pub fn new(fields: Vec<Field>, rows: impl Iterator<Item = EngineResult<Row>> + Send + 'static) -> Self {
        Self {
            fields,
            rows: Box::new(rows),
        }
    }

    pub fn from_rows(fields: Vec<Field>, rows: Vec<Row>) -> Self {
        Self::new(fields, rows.into_iter().map(Ok))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Pulls up to `max` rows; an empty batch means the cursor is exhausted.
    pub fn next_batch(&mut self, max: usize) -> EngineResult<Vec<Row>> {
        let mut batch = Vec::with_capacity(max.min(1024));
        while batch.len() < max {
            match self.rows.next() {
                Some(row) => batch.push(row?),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Appends `other`'s rows after this cursor's.
    pub fn chain(self, other: RowCursor) -> RowCursor {
        RowCursor {
            fields: self.fields,
            rows: Box::new(self.rows.chain(other.rows)),
        }
    }

    pub fn collect_rows(self) -> EngineResult<Vec<Row>> {
        self.rows.collect()
    }
}

impl Iterator for RowCursor {
    type Item = EngineResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor").field("fields", &self.fields).finish_non_exhaustive()
    }
}
