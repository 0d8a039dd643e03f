// SPDX-License-Identifier: Apache-2.0

//! Streamed join execution.
//!
//! One side of the join runs first; its rows are turned into an equality
//! filter pushed into the other side before that side runs. The pending
//! side travels as an encoded plan snapshot and is rebound to the current
//! planning context before it is filtered.

use std::sync::Arc;

use polyfed_core::{EngineError, EngineResult};

use crate::engine::context::ExecutionContext;
use crate::engine::executor::FederatedExecutor;
use crate::engine::registry::AdapterRegistry;
use crate::engine::traits::RowCursor;
use crate::engine::types::Row;
use crate::metrics;
use crate::plan::eval::nested_loop_join;
use crate::plan::{payload, JoinKind, Plan, PlanNode};

use super::condition::{extract, JoinSide};
use super::filter::synthesize;

#[derive(Clone)]
pub struct JoinStreamer {
    executor: FederatedExecutor,
}

impl JoinStreamer {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            executor: FederatedExecutor::new(registry),
        }
    }

    /// Decodes a join snapshot taken in another planning context, rebinds
    /// it to `ctx` and executes it.
    pub fn execute_payload(&self, ctx: &ExecutionContext, bytes: &[u8]) -> EngineResult<RowCursor> {
        let plan = ctx.planner().rebind(&payload::decode_plan(bytes)?);
        self.execute(ctx, &plan)
    }

    /// Executes a join plan built in `ctx`'s planning context.
    #[tracing::instrument(skip(self, plan), fields(context = %ctx.id))]
    pub fn execute(&self, ctx: &ExecutionContext, plan: &Plan) -> EngineResult<RowCursor> {
        ctx.planner().validate(plan)?;
        let PlanNode::Join {
            left,
            right,
            kind,
            condition,
        } = &plan.node
        else {
            return Err(EngineError::validation("join streamer expects a join plan"));
        };
        metrics::record_streamer_execution();
        let (left_width, right_width) = (left.field_count(), right.field_count());

        if *kind == JoinKind::Full {
            tracing::debug!("Full join executes both sides unfiltered");
            let left_rows = self.rows(ctx, left)?;
            let right_rows = self.rows(ctx, right)?;
            let rows = nested_loop_join(&left_rows, &right_rows, left_width, right_width, *kind, |row| {
                condition.matches(row)
            })?;
            return Ok(RowCursor::from_rows(plan.fields(), rows));
        }

        let executed_side = self.choose_side(*kind, left, right)?;
        let (executed, pending) = match executed_side {
            JoinSide::Left => (left.as_ref(), right.as_ref()),
            JoinSide::Right => (right.as_ref(), left.as_ref()),
        };
        let snapshot = payload::encode_plan(pending)?;

        let executed_rows = self.rows(ctx, executed)?;
        let equalities = extract(condition, left_width, executed_side).equalities();
        let projected: Vec<Row> = executed_rows
            .iter()
            .map(|row| equalities.iter().map(|p| row[p.executed].clone()).collect())
            .collect();

        let pending = ctx.planner().rebind(&payload::decode_plan(&snapshot)?);
        let pending = match synthesize(&equalities, &projected) {
            Some(filter) => ctx.planner().builder().filter(pending, filter)?,
            None => {
                tracing::warn!("Join condition has no conjunctive equality pairs; pending side runs unfiltered");
                pending
            }
        };
        tracing::debug!(
            side = ?executed_side,
            executed_rows = executed_rows.len(),
            pairs = equalities.len(),
            "Executing filtered pending side"
        );
        let pending_rows = self.rows(ctx, &pending)?;

        let (left_rows, right_rows) = match executed_side {
            JoinSide::Left => (executed_rows, pending_rows),
            JoinSide::Right => (pending_rows, executed_rows),
        };
        let rows = nested_loop_join(&left_rows, &right_rows, left_width, right_width, *kind, |row| {
            condition.matches(row)
        })?;
        Ok(RowCursor::from_rows(plan.fields(), rows))
    }

    /// Right side first, unless the join preserves the left side or is an
    /// inner join whose left side is estimated smaller.
    fn choose_side(&self, kind: JoinKind, left: &Plan, right: &Plan) -> EngineResult<JoinSide> {
        match kind {
            JoinKind::Left => Ok(JoinSide::Left),
            JoinKind::Inner => {
                let (l, r) = (self.estimate(left)?, self.estimate(right)?);
                tracing::debug!(left_estimate = ?l, right_estimate = ?r, "Join side estimates");
                match (l, r) {
                    (Some(l), Some(r)) if l < r => Ok(JoinSide::Left),
                    _ => Ok(JoinSide::Right),
                }
            }
            JoinKind::Right | JoinKind::Full => Ok(JoinSide::Right),
        }
    }

    /// Row count estimate of the table under a chain of row-preserving or
    /// row-reducing operators.
    fn estimate(&self, plan: &Plan) -> EngineResult<Option<u64>> {
        match &plan.node {
            PlanNode::Scan { adapter, table, .. } => {
                self.executor.registry().require(*adapter)?.row_count_estimate(table)
            }
            PlanNode::Values { rows, .. } => Ok(Some(rows.len() as u64)),
            PlanNode::Filter { input, .. } | PlanNode::Project { input, .. } | PlanNode::Sort { input, .. } => {
                self.estimate(input)
            }
            _ => Ok(None),
        }
    }

    fn rows(&self, ctx: &ExecutionContext, plan: &Plan) -> EngineResult<Vec<Row>> {
        self.executor.execute(ctx, plan)?.collect_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use polyfed_core::{AdapterId, PolyType, PolyValue};

    use crate::engine::drivers::MemoryAdapter;
    use crate::engine::traits::AdapterDriver;
    use crate::engine::types::TableDefinition;
    use crate::mapping::JdbcSpace;
    use crate::plan::{Expr, Field, PhysicalTable, ScanColumn};

    fn registry(left_rows: i32, right_rows: i32) -> (Arc<AdapterRegistry>, PhysicalTable, PhysicalTable) {
        let a = Arc::new(MemoryAdapter::new(AdapterId(1), JdbcSpace));
        let b = Arc::new(MemoryAdapter::new(AdapterId(2), JdbcSpace));
        let def = |name: &str| TableDefinition {
            physical: PhysicalTable::new("s", name),
            columns: vec![("id".into(), PolyType::Integer.into()), ("v".into(), PolyType::Varchar.into())],
            primary_key: vec!["id".into()],
        };
        let (l, r) = (def("l"), def("r"));
        a.create_table(&l).unwrap();
        b.create_table(&r).unwrap();
        let rows = |n: i32| (1..=n).map(|i| vec![PolyValue::Integer(i), PolyValue::text(format!("v{i}"))]).collect();
        a.insert_rows(&l.physical, rows(left_rows)).unwrap();
        b.insert_rows(&r.physical, rows(right_rows)).unwrap();
        let mut registry = AdapterRegistry::new();
        registry.register(a);
        registry.register(b);
        (Arc::new(registry), l.physical, r.physical)
    }

    fn scan(ctx: &ExecutionContext, adapter: u32, table: PhysicalTable) -> Plan {
        ctx.planner().builder().scan(
            AdapterId(adapter),
            table,
            vec![
                ScanColumn { physical: "id".into(), field: Field::new("id", PolyType::Integer) },
                ScanColumn { physical: "v".into(), field: Field::new("v", PolyType::Varchar) },
            ],
        )
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows() {
        let (registry, l, r) = registry(4, 2);
        let ctx = ExecutionContext::new(Duration::from_secs(5));
        let join = ctx
            .planner()
            .builder()
            .join(scan(&ctx, 1, l), scan(&ctx, 2, r), JoinKind::Left, Expr::eq(Expr::col(0), Expr::col(2)))
            .unwrap();
        let rows = JoinStreamer::new(registry).execute(&ctx, &join).unwrap().collect_rows().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| r[2].is_null()).count(), 2);
    }

    #[test]
    fn snapshot_from_another_context_is_rebound() {
        let (registry, l, r) = registry(2, 3);
        let planning = ExecutionContext::new(Duration::from_secs(5));
        let join = planning
            .planner()
            .builder()
            .join(scan(&planning, 1, l), scan(&planning, 2, r), JoinKind::Inner, Expr::eq(Expr::col(0), Expr::col(2)))
            .unwrap();
        let bytes = payload::encode_plan(&join).unwrap();

        let ctx = ExecutionContext::new(Duration::from_secs(5));
        let streamer = JoinStreamer::new(registry);
        assert!(streamer.execute(&ctx, &join).is_err());
        let rows = streamer.execute_payload(&ctx, &bytes).unwrap().collect_rows().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn non_join_plans_are_rejected() {
        let (registry, l, _) = registry(1, 1);
        let ctx = ExecutionContext::new(Duration::from_secs(5));
        let err = JoinStreamer::new(registry).execute(&ctx, &scan(&ctx, 1, l)).unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
    }
}
