// SPDX-License-Identifier: Apache-2.0

//! Logical plan IR
//!
//! A tagged tree covering exactly the node kinds the routing engine and the
//! join streamer produce. Every node records the planning cluster it was
//! built in and its trait set (which adapter, if any, can run it natively).

pub mod builder;
pub mod context;
pub mod eval;
pub mod expr;
pub mod payload;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use polyfed_core::{AdapterId, ColumnId, ColumnType, PolyType, PolyValue};

use crate::engine::types::GraphSnapshot;

pub use builder::PlanBuilder;
pub use context::PlannerContext;
pub use expr::{CompareOp, Expr};

/// Identity of the planning context a plan was built in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a node can be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Convention {
    /// Evaluated by the engine itself
    Core,
    /// Pushed down entirely to one adapter
    Adapter(AdapterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitSet {
    pub convention: Convention,
}

impl TraitSet {
    pub fn core() -> Self {
        Self {
            convention: Convention::Core,
        }
    }

    pub fn adapter(adapter: AdapterId) -> Self {
        Self {
            convention: Convention::Adapter(adapter),
        }
    }
}

/// Output column of a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<ColumnType>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Adapter-side name of a table or collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTable {
    pub schema: String,
    pub table: String,
}

impl PhysicalTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for PhysicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanColumn {
    /// Adapter-side column name
    pub physical: String,
    /// Logical output field
    pub field: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    /// `None` only for `COUNT(*)`
    pub column: Option<usize>,
    pub field: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModifyTarget {
    Table(PhysicalTable),
    Collection(PhysicalTable),
    Graph(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifyOp {
    Insert,
    /// Sets the non-key columns of rows matching the key columns
    Update,
    /// Removes rows matching the key columns
    Delete,
}

/// Target column of a modify node, bound by column id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyColumn {
    pub column: ColumnId,
    pub physical: String,
    pub ty: ColumnType,
    /// Part of the row identity used by UPDATE/DELETE
    pub key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModifyInput {
    /// Values arrive through `BoundStatement::bind`
    Parameters,
    /// Values come from a values-producing plan executed once
    Plan(Box<Plan>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    Scan {
        adapter: AdapterId,
        table: PhysicalTable,
        columns: Vec<ScanColumn>,
    },
    Values {
        fields: Vec<Field>,
        rows: Vec<Vec<PolyValue>>,
    },
    Filter {
        input: Box<Plan>,
        condition: Expr,
    },
    Project {
        input: Box<Plan>,
        exprs: Vec<(Expr, Field)>,
    },
    Sort {
        input: Box<Plan>,
        keys: Vec<SortKey>,
    },
    Union {
        inputs: Vec<Plan>,
        all: bool,
    },
    Aggregate {
        input: Box<Plan>,
        group: Vec<usize>,
        calls: Vec<AggregateCall>,
    },
    Join {
        left: Box<Plan>,
        right: Box<Plan>,
        kind: JoinKind,
        /// Column indexes address the concatenation of left and right fields
        condition: Expr,
    },
    Modify {
        adapter: AdapterId,
        target: ModifyTarget,
        op: ModifyOp,
        columns: Vec<ModifyColumn>,
        input: ModifyInput,
    },
    Graph {
        snapshot: GraphSnapshot,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub cluster: ClusterId,
    pub traits: TraitSet,
    pub node: PlanNode,
}

impl Plan {
    /// Output schema of this node.
    pub fn fields(&self) -> Vec<Field> {
        match &self.node {
            PlanNode::Scan { columns, .. } => columns.iter().map(|c| c.field.clone()).collect(),
            PlanNode::Values { fields, .. } => fields.clone(),
            PlanNode::Filter { input, .. } | PlanNode::Sort { input, .. } => input.fields(),
            PlanNode::Project { exprs, .. } => exprs.iter().map(|(_, f)| f.clone()).collect(),
            PlanNode::Union { inputs, .. } => inputs.first().map(Plan::fields).unwrap_or_default(),
            PlanNode::Aggregate { input, group, calls } => {
                let input_fields = input.fields();
                group
                    .iter()
                    .filter_map(|i| input_fields.get(*i).cloned())
                    .chain(calls.iter().map(|c| c.field.clone()))
                    .collect()
            }
            PlanNode::Join { left, right, .. } => {
                let mut fields = left.fields();
                fields.extend(right.fields());
                fields
            }
            PlanNode::Modify { .. } => vec![Field::new("ROWCOUNT", PolyType::BigInt)],
            PlanNode::Graph { .. } => vec![Field::new("graph", PolyType::Any)],
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields().len()
    }

    /// Direct children, left to right.
    pub fn inputs(&self) -> Vec<&Plan> {
        match &self.node {
            PlanNode::Scan { .. } | PlanNode::Values { .. } | PlanNode::Graph { .. } => Vec::new(),
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Aggregate { input, .. } => vec![input.as_ref()],
            PlanNode::Union { inputs, .. } => inputs.iter().collect(),
            PlanNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            PlanNode::Modify { input, .. } => match input {
                ModifyInput::Parameters => Vec::new(),
                ModifyInput::Plan(plan) => vec![plan.as_ref()],
            },
        }
    }

    /// Adapters scanned anywhere in this tree.
    pub fn adapters(&self) -> BTreeSet<AdapterId> {
        let mut out = BTreeSet::new();
        self.collect_adapters(&mut out);
        out
    }

    fn collect_adapters(&self, out: &mut BTreeSet<AdapterId>) {
        if let PlanNode::Scan { adapter, .. } | PlanNode::Modify { adapter, .. } = &self.node {
            out.insert(*adapter);
        }
        for input in self.inputs() {
            input.collect_adapters(out);
        }
    }

    /// The adapter able to run this whole tree natively, if any.
    pub fn pushdown_adapter(&self) -> Option<AdapterId> {
        match self.traits.convention {
            Convention::Adapter(id) => Some(id),
            Convention::Core => None,
        }
    }

    /// Every cluster id present in the tree.
    pub fn clusters(&self) -> BTreeSet<Uuid> {
        let mut out = BTreeSet::new();
        self.collect_clusters(&mut out);
        out
    }

    fn collect_clusters(&self, out: &mut BTreeSet<Uuid>) {
        out.insert(self.cluster.0);
        for input in self.inputs() {
            input.collect_clusters(out);
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.inputs().iter().map(|p| p.node_count()).sum::<usize>()
    }
}

impl PlanNode {
    /// Trait set implied by this node and its (already built) inputs.
    pub fn derive_traits(&self) -> TraitSet {
        match self {
            PlanNode::Scan { adapter, .. } | PlanNode::Modify { adapter, .. } => TraitSet::adapter(*adapter),
            PlanNode::Values { .. } | PlanNode::Graph { .. } => TraitSet::core(),
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Aggregate { input, .. } => input.traits,
            PlanNode::Union { inputs, .. } => common_convention(inputs.iter()),
            PlanNode::Join { left, right, .. } => common_convention([left.as_ref(), right.as_ref()].into_iter()),
        }
    }
}

fn common_convention<'a>(mut plans: impl Iterator<Item = &'a Plan>) -> TraitSet {
    let Some(first) = plans.next() else {
        return TraitSet::core();
    };
    let convention = first.traits.convention;
    if convention != Convention::Core && plans.all(|p| p.traits.convention == convention) {
        TraitSet { convention }
    } else {
        TraitSet::core()
    }
}

/// Index of the field named `name`, ignoring ASCII case.
pub fn field_index(fields: &[Field], name: &str) -> Option<usize> {
    fields.iter().position(|f| f.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(ctx: &PlannerContext, adapter: u32, table: &str) -> Plan {
        ctx.builder().scan(
            AdapterId(adapter),
            PhysicalTable::new("public", table),
            vec![ScanColumn {
                physical: "id".into(),
                field: Field::new("id", PolyType::Integer),
            }],
        )
    }

    #[test]
    fn join_across_adapters_is_core() {
        let ctx = PlannerContext::new();
        let b = ctx.builder();
        let same = b
            .join(scan(&ctx, 1, "a"), scan(&ctx, 1, "b"), JoinKind::Inner, Expr::eq(Expr::col(0), Expr::col(1)))
            .unwrap();
        assert_eq!(same.pushdown_adapter(), Some(AdapterId(1)));

        let mixed = b
            .join(scan(&ctx, 1, "a"), scan(&ctx, 2, "b"), JoinKind::Inner, Expr::eq(Expr::col(0), Expr::col(1)))
            .unwrap();
        assert_eq!(mixed.pushdown_adapter(), None);
        assert_eq!(mixed.adapters().len(), 2);
        assert_eq!(mixed.field_count(), 2);
    }

    #[test]
    fn field_lookup_ignores_case() {
        let fields = vec![Field::new("Name", PolyType::Varchar), Field::new("ID", PolyType::Integer)];
        assert_eq!(field_index(&fields, "id"), Some(1));
        assert_eq!(field_index(&fields, "name"), Some(0));
        assert_eq!(field_index(&fields, "nam"), None);
    }
}
