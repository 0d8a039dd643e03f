// SPDX-License-Identifier: Apache-2.0

//! Shared data types for the adapter layer
//!
//! These types describe what adapters hold and what they report about
//! themselves, independent of any adapter's native representation.

use serde::{Deserialize, Serialize};

use polyfed_core::{AdapterId, ColumnType, PolyMap, PolyType, PolyValue};

use crate::mapping::Family;
use crate::plan::PhysicalTable;

/// A row of canonical values, positional against a plan's fields
pub type Row = Vec<PolyValue>;

/// Canonical type a whole document travels and is stored as.
pub fn document_type() -> ColumnType {
    ColumnType::map(PolyType::Varchar.into(), PolyType::Any.into())
}

/// Reported capabilities for an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    /// Each executed batch is committed atomically
    pub transactions: bool,
    /// Runs filter/project/sort fragments natively
    pub pushdown: bool,
    pub documents: bool,
    pub graphs: bool,
    /// Stores multimedia columns outside the row
    pub blob_files: bool,
}

/// Adapter metadata exposed by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub id: AdapterId,
    pub name: String,
    pub family: Family,
    pub capabilities: AdapterCapabilities,
}

/// Physical table layout handed to `create_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub physical: PhysicalTable,
    /// Physical column names with their canonical types, in order
    pub columns: Vec<(String, ColumnType)>,
    /// Physical names of the primary-key columns
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn column_type(&self, name: &str) -> Option<&ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, ty)| ty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: PolyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub properties: PolyMap,
}

/// Fully materialized property graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphSnapshot {
    /// True when there are neither nodes nor edges.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
