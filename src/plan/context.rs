// SPDX-License-Identifier: Apache-2.0

//! Planner context and plan rebinding.
//!
//! A plan fragment that crossed a serialization boundary still carries the
//! cluster of the context it was built in. [`PlannerContext::rebind`]
//! produces a new tree stamped with the current cluster and freshly derived
//! traits; the input tree is left untouched.

use polyfed_core::{EngineError, EngineResult};

use super::{ClusterId, ModifyInput, Plan, PlanBuilder, PlanNode};

#[derive(Debug, Clone)]
pub struct PlannerContext {
    cluster: ClusterId,
}

impl PlannerContext {
    pub fn new() -> Self {
        Self {
            cluster: ClusterId::new(),
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn builder(&self) -> PlanBuilder {
        PlanBuilder::new(self.cluster)
    }

    /// Reattaches every node of `plan` to this context.
    pub fn rebind(&self, plan: &Plan) -> Plan {
        let node = match &plan.node {
            PlanNode::Scan { .. } | PlanNode::Values { .. } | PlanNode::Graph { .. } => plan.node.clone(),
            PlanNode::Filter { input, condition } => PlanNode::Filter {
                input: Box::new(self.rebind(input)),
                condition: condition.clone(),
            },
            PlanNode::Project { input, exprs } => PlanNode::Project {
                input: Box::new(self.rebind(input)),
                exprs: exprs.clone(),
            },
            PlanNode::Sort { input, keys } => PlanNode::Sort {
                input: Box::new(self.rebind(input)),
                keys: keys.clone(),
            },
            PlanNode::Union { inputs, all } => PlanNode::Union {
                inputs: inputs.iter().map(|p| self.rebind(p)).collect(),
                all: *all,
            },
            PlanNode::Aggregate { input, group, calls } => PlanNode::Aggregate {
                input: Box::new(self.rebind(input)),
                group: group.clone(),
                calls: calls.clone(),
            },
            PlanNode::Join {
                left,
                right,
                kind,
                condition,
            } => PlanNode::Join {
                left: Box::new(self.rebind(left)),
                right: Box::new(self.rebind(right)),
                kind: *kind,
                condition: condition.clone(),
            },
            PlanNode::Modify {
                adapter,
                target,
                op,
                columns,
                input,
            } => PlanNode::Modify {
                adapter: *adapter,
                target: target.clone(),
                op: *op,
                columns: columns.clone(),
                input: match input {
                    ModifyInput::Parameters => ModifyInput::Parameters,
                    ModifyInput::Plan(inner) => ModifyInput::Plan(Box::new(self.rebind(inner))),
                },
            },
        };
        self.builder().finish(node)
    }

    /// Fails unless every node belongs to this context.
    pub fn validate(&self, plan: &Plan) -> EngineResult<()> {
        let clusters = plan.clusters();
        if clusters.len() == 1 && clusters.contains(&self.cluster.0) {
            return Ok(());
        }
        Err(EngineError::validation(format!(
            "Plan belongs to planning context(s) {:?}, expected {}; rebind it first",
            clusters, self.cluster
        )))
    }
}

impl Default for PlannerContext {
    fn default() -> Self {
        Self::new()
    }
}
