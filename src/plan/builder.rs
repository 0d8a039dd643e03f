// SPDX-License-Identifier: Apache-2.0

//! Builds plan fragments from logical descriptions.
//!
//! Every node is stamped with the builder's cluster and the trait set
//! derived from its inputs. Column references are validated against the
//! input schema so malformed fragments fail at build time.

use polyfed_core::{AdapterId, EngineError, EngineResult, PolyType, PolyValue};

use crate::engine::types::GraphSnapshot;

use super::{
    AggregateCall, ClusterId, Expr, Field, JoinKind, ModifyColumn, ModifyInput, ModifyOp,
    ModifyTarget, PhysicalTable, Plan, PlanNode, ScanColumn, SortKey,
};

#[derive(Debug, Clone, Copy)]
pub struct PlanBuilder {
    cluster: ClusterId,
}

impl PlanBuilder {
    pub fn new(cluster: ClusterId) -> Self {
        Self { cluster }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    /// Stamps a node with this builder's cluster and derived traits.
    pub fn finish(&self, node: PlanNode) -> Plan {
        Plan {
            cluster: self.cluster,
            traits: node.derive_traits(),
            node,
        }
    }

    pub fn scan(&self, adapter: AdapterId, table: PhysicalTable, columns: Vec<ScanColumn>) -> Plan {
        self.finish(PlanNode::Scan {
            adapter,
            table,
            columns,
        })
    }

    pub fn values(&self, fields: Vec<Field>, rows: Vec<Vec<PolyValue>>) -> EngineResult<Plan> {
        if let Some(bad) = rows.iter().find(|r| r.len() != fields.len()) {
            return Err(EngineError::validation(format!(
                "Values row has {} entries for {} fields",
                bad.len(),
                fields.len()
            )));
        }
        Ok(self.finish(PlanNode::Values { fields, rows }))
    }

    pub fn filter(&self, input: Plan, condition: Expr) -> EngineResult<Plan> {
        check_columns(&condition, input.field_count(), "filter")?;
        Ok(self.finish(PlanNode::Filter {
            input: Box::new(input),
            condition,
        }))
    }

    pub fn project(&self, input: Plan, exprs: Vec<(Expr, Field)>) -> EngineResult<Plan> {
        let width = input.field_count();
        for (expr, _) in &exprs {
            check_columns(expr, width, "project")?;
        }
        Ok(self.finish(PlanNode::Project {
            input: Box::new(input),
            exprs,
        }))
    }

    /// Projection that keeps the given input columns under their names.
    pub fn project_columns(&self, input: Plan, columns: &[usize]) -> EngineResult<Plan> {
        let fields = input.fields();
        let exprs = columns
            .iter()
            .map(|&i| {
                fields
                    .get(i)
                    .map(|f| (Expr::col(i), f.clone()))
                    .ok_or_else(|| EngineError::validation(format!("project: no input column {i}")))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        self.project(input, exprs)
    }

    pub fn sort(&self, input: Plan, keys: Vec<SortKey>) -> EngineResult<Plan> {
        let width = input.field_count();
        if let Some(key) = keys.iter().find(|k| k.column >= width) {
            return Err(EngineError::validation(format!("sort: no input column {}", key.column)));
        }
        Ok(self.finish(PlanNode::Sort {
            input: Box::new(input),
            keys,
        }))
    }

    /// Union of inputs with equal arity. A single input is returned as is.
    pub fn union(&self, mut inputs: Vec<Plan>, all: bool) -> EngineResult<Plan> {
        if inputs.is_empty() {
            return Err(EngineError::validation("union needs at least one input"));
        }
        let width = inputs[0].field_count();
        if inputs.iter().any(|p| p.field_count() != width) {
            return Err(EngineError::validation("union inputs differ in arity"));
        }
        if inputs.len() == 1 && all {
            return Ok(inputs.remove(0));
        }
        Ok(self.finish(PlanNode::Union { inputs, all }))
    }

    pub fn aggregate(&self, input: Plan, group: Vec<usize>, calls: Vec<AggregateCall>) -> EngineResult<Plan> {
        let width = input.field_count();
        let out_of_range = group
            .iter()
            .copied()
            .chain(calls.iter().filter_map(|c| c.column))
            .find(|&i| i >= width);
        if let Some(i) = out_of_range {
            return Err(EngineError::validation(format!("aggregate: no input column {i}")));
        }
        Ok(self.finish(PlanNode::Aggregate {
            input: Box::new(input),
            group,
            calls,
        }))
    }

    pub fn join(&self, left: Plan, right: Plan, kind: JoinKind, condition: Expr) -> EngineResult<Plan> {
        check_columns(&condition, left.field_count() + right.field_count(), "join")?;
        Ok(self.finish(PlanNode::Join {
            left: Box::new(left),
            right: Box::new(right),
            kind,
            condition,
        }))
    }

    pub fn modify(
        &self,
        adapter: AdapterId,
        target: ModifyTarget,
        op: ModifyOp,
        columns: Vec<ModifyColumn>,
        input: ModifyInput,
    ) -> EngineResult<Plan> {
        if matches!(op, ModifyOp::Update | ModifyOp::Delete)
            && matches!(target, ModifyTarget::Table(_))
            && !columns.iter().any(|c| c.key)
        {
            return Err(EngineError::validation(format!(
                "{op:?} without key columns would touch every row"
            )));
        }
        Ok(self.finish(PlanNode::Modify {
            adapter,
            target,
            op,
            columns,
            input,
        }))
    }

    pub fn graph(&self, snapshot: GraphSnapshot) -> Plan {
        self.finish(PlanNode::Graph { snapshot })
    }

    /// `COUNT(*)` call with the conventional output field.
    pub fn count_star(name: impl Into<String>) -> AggregateCall {
        AggregateCall {
            function: super::AggregateFunction::Count,
            column: None,
            field: Field::new(name, PolyType::BigInt),
        }
    }
}

fn check_columns(expr: &Expr, width: usize, what: &str) -> EngineResult<()> {
    match expr.max_column() {
        Some(i) if i >= width => Err(EngineError::validation(format!(
            "{what}: expression references column {i} but input has {width}"
        ))),
        _ => Ok(()),
    }
}
