// SPDX-License-Identifier: Apache-2.0

//! Federated plan execution.
//!
//! A plan that one adapter can run as a whole goes straight to that
//! adapter. Otherwise every maximal single-adapter subtree is pushed down
//! and the remaining operators run in core.

use std::sync::Arc;

use polyfed_core::EngineResult;

use crate::engine::context::ExecutionContext;
use crate::engine::registry::AdapterRegistry;
use crate::engine::traits::RowCursor;
use crate::engine::types::Row;
use crate::plan::eval::{self, SubplanSource};
use crate::plan::Plan;

#[derive(Clone)]
pub struct FederatedExecutor {
    registry: Arc<AdapterRegistry>,
}

impl FederatedExecutor {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Runs a read plan built in `ctx`'s planning context.
    #[tracing::instrument(skip(self, plan), fields(context = %ctx.id, nodes = plan.node_count()))]
    pub fn execute(&self, ctx: &ExecutionContext, plan: &Plan) -> EngineResult<RowCursor> {
        ctx.planner().validate(plan)?;
        if let Some(id) = plan.pushdown_adapter() {
            let adapter = self.registry.require(id)?;
            if adapter.can_execute(plan) {
                tracing::debug!(adapter = %id, "Executing plan on a single adapter");
                return adapter.open_cursor(ctx, plan);
            }
        }
        ctx.check_deadline()?;
        let rows = eval::evaluate(plan, &RegistrySource { registry: &self.registry, ctx })?;
        Ok(RowCursor::from_rows(plan.fields(), rows))
    }
}

/// Pushes subtrees down to whichever registered adapter can run them.
struct RegistrySource<'a> {
    registry: &'a AdapterRegistry,
    ctx: &'a ExecutionContext,
}

impl SubplanSource for RegistrySource<'_> {
    fn try_execute(&self, plan: &Plan) -> EngineResult<Option<Vec<Row>>> {
        let Some(id) = plan.pushdown_adapter() else {
            return Ok(None);
        };
        let adapter = self.registry.require(id)?;
        if !adapter.can_execute(plan) {
            return Ok(None);
        }
        adapter.open_cursor(self.ctx, plan)?.collect_rows().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use polyfed_core::{AdapterId, PolyType, PolyValue};

    use crate::engine::drivers::memory::MemoryAdapter;
    use crate::engine::traits::AdapterDriver;
    use crate::engine::types::TableDefinition;
    use crate::mapping::{DocumentSpace, JdbcSpace};
    use crate::plan::{Expr, Field, JoinKind, PhysicalTable, PlannerContext, ScanColumn};

    fn table(adapter: &dyn AdapterDriver, name: &str) -> PhysicalTable {
        let def = TableDefinition {
            physical: PhysicalTable::new("s", name),
            columns: vec![("id".into(), PolyType::Integer.into()), ("v".into(), PolyType::Varchar.into())],
            primary_key: vec!["id".into()],
        };
        adapter.create_table(&def).unwrap();
        def.physical
    }

    fn scan_columns() -> Vec<ScanColumn> {
        ["id", "v"]
            .iter()
            .zip([PolyType::Integer, PolyType::Varchar])
            .map(|(name, ty)| ScanColumn {
                physical: name.to_string(),
                field: Field::new(*name, ty),
            })
            .collect()
    }

    #[test]
    fn cross_adapter_join_runs_in_core() {
        let left = Arc::new(MemoryAdapter::new(AdapterId(1), JdbcSpace));
        let right = Arc::new(MemoryAdapter::new(AdapterId(2), DocumentSpace));
        let lt = table(left.as_ref(), "l");
        let rt = table(right.as_ref(), "r");
        left.insert_rows(&lt, vec![vec![1.into(), "a".into()], vec![2.into(), "b".into()]]).unwrap();
        right.insert_rows(&rt, vec![vec![2.into(), "x".into()]]).unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(left);
        registry.register(right);
        let executor = FederatedExecutor::new(Arc::new(registry));

        let ctx = ExecutionContext::new(Duration::from_secs(5));
        let b = ctx.planner().builder();
        let plan = b
            .join(
                b.scan(AdapterId(1), lt, scan_columns()),
                b.scan(AdapterId(2), rt, scan_columns()),
                JoinKind::Inner,
                Expr::eq(Expr::col(0), Expr::col(2)),
            )
            .unwrap();
        assert_eq!(plan.pushdown_adapter(), None);
        let rows = executor.execute(&ctx, &plan).unwrap().collect_rows().unwrap();
        assert_eq!(rows, vec![vec![PolyValue::Integer(2), "b".into(), PolyValue::Integer(2), "x".into()]]);
    }

    #[test]
    fn foreign_plans_are_rejected_until_rebound() {
        let registry = Arc::new(AdapterRegistry::new());
        let executor = FederatedExecutor::new(registry);
        let ctx = ExecutionContext::new(Duration::from_secs(5));
        let other = PlannerContext::new();
        let plan = other
            .builder()
            .values(vec![Field::new("x", PolyType::Integer)], vec![vec![1.into()]])
            .unwrap();
        assert!(executor.execute(&ctx, &plan).is_err());
        let rebound = ctx.planner().rebind(&plan);
        assert_eq!(executor.execute(&ctx, &rebound).unwrap().collect_rows().unwrap().len(), 1);
    }
}
