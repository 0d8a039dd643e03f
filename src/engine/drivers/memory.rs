// SPDX-License-Identifier: Apache-2.0

//! In-memory adapter generic over a type space.
//!
//! Relational rows and documents are held in the family's native form, so
//! reads and writes go through that family's mapping unless it opts out
//! for the column's type. Graphs are held
//! as canonical snapshots. Any plan whose trait set names this adapter runs
//! here: scans are resolved against the store and everything above them is
//! evaluated in core.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use polyfed_core::{
    AdapterId, ColumnId, ColumnType, EngineError, EngineResult, PolyMap, PolyValue,
};

use crate::engine::traits::{AdapterDriver, BoundParameters, BoundStatement, RowCursor};
use crate::engine::types::{document_type, AdapterCapabilities, GraphSnapshot, Row, TableDefinition};
use crate::mapping::{Family, TypeSpace};
use crate::plan::eval::{self, SubplanSource};
use crate::plan::{ModifyColumn, ModifyInput, ModifyOp, ModifyTarget, PhysicalTable, Plan, PlanNode};

struct MemoryTable<N> {
    definition: TableDefinition,
    rows: Vec<Vec<N>>,
}

impl<N> MemoryTable<N> {
    fn column_index(&self, physical: &str) -> EngineResult<usize> {
        self.definition
            .columns
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(physical))
            .ok_or_else(|| {
                EngineError::validation(format!("No column '{physical}' in {}", self.definition.physical))
            })
    }

    fn key_indexes(&self) -> EngineResult<Vec<usize>> {
        self.definition.primary_key.iter().map(|k| self.column_index(k)).collect()
    }
}

struct MemoryState<N> {
    tables: BTreeMap<PhysicalTable, MemoryTable<N>>,
    collections: BTreeMap<PhysicalTable, Vec<N>>,
    graphs: BTreeMap<String, GraphSnapshot>,
}

impl<N> Default for MemoryState<N> {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            collections: BTreeMap::new(),
            graphs: BTreeMap::new(),
        }
    }
}

impl<N> MemoryState<N> {
    fn table(&self, table: &PhysicalTable) -> EngineResult<&MemoryTable<N>> {
        self.tables
            .get(table)
            .ok_or_else(|| EngineError::validation(format!("Table {table} does not exist")))
    }

    fn table_mut(&mut self, table: &PhysicalTable) -> EngineResult<&mut MemoryTable<N>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| EngineError::validation(format!("Table {table} does not exist")))
    }
}

pub struct MemoryAdapter<S: TypeSpace> {
    id: AdapterId,
    name: String,
    space: S,
    state: Arc<RwLock<MemoryState<S::Native>>>,
}

impl<S> MemoryAdapter<S>
where
    S: TypeSpace + Clone + 'static,
    S::Native: PartialEq,
{
    pub fn new(id: AdapterId, space: S) -> Self {
        Self {
            id,
            name: format!("memory-{}-{id}", space.family()),
            space,
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Inserts canonical rows covering every column of `table`.
    pub fn insert_rows(&self, table: &PhysicalTable, rows: Vec<Row>) -> EngineResult<u64> {
        let mut state = self.state.write();
        let target = state.table_mut(table)?;
        let types: Vec<ColumnType> = target.definition.columns.iter().map(|(_, ty)| ty.clone()).collect();
        let encoded = rows
            .iter()
            .map(|row| self.space.map_row_to_native(row, &types))
            .collect::<EngineResult<Vec<_>>>()?;
        let keys = target.key_indexes()?;
        check_unique(&target.rows, &encoded, &keys, table)?;
        let count = encoded.len() as u64;
        target.rows.extend(encoded);
        Ok(count)
    }

    /// Every row of `table` in canonical form, in insertion order.
    pub fn table_rows(&self, table: &PhysicalTable) -> EngineResult<Vec<Row>> {
        let state = self.state.read();
        let source = state.table(table)?;
        let types: Vec<ColumnType> = source.definition.columns.iter().map(|(_, ty)| ty.clone()).collect();
        source
            .rows
            .iter()
            .map(|row| self.space.map_row_to_canonical(row, &types))
            .collect()
    }

    pub fn put_graph(&self, name: impl Into<String>, graph: GraphSnapshot) {
        self.state.write().graphs.insert(name.into(), graph);
    }

    pub fn graph(&self, name: &str) -> Option<GraphSnapshot> {
        self.state.read().graphs.get(name).cloned()
    }

    pub fn put_documents(&self, collection: &PhysicalTable, documents: Vec<PolyMap>) -> EngineResult<()> {
        let ty = document_type();
        let encoded = documents
            .into_iter()
            .map(|doc| self.space.to_stored(&PolyValue::Map(doc), &ty))
            .collect::<EngineResult<Vec<_>>>()?;
        self.state
            .write()
            .collections
            .entry(collection.clone())
            .or_default()
            .extend(encoded);
        Ok(())
    }

    pub fn documents(&self, collection: &PhysicalTable) -> EngineResult<Vec<PolyMap>> {
        let state = self.state.read();
        let stored = state
            .collections
            .get(collection)
            .ok_or_else(|| EngineError::validation(format!("Collection {collection} does not exist")))?;
        decode_documents(&self.space, stored)
    }
}

fn decode_documents<S: TypeSpace>(space: &S, stored: &[S::Native]) -> EngineResult<Vec<PolyMap>> {
    let ty = document_type();
    stored
        .iter()
        .map(|native| match space.from_stored(native, &ty)? {
            PolyValue::Map(doc) => Ok(doc),
            other => Err(EngineError::internal(format!("Stored document decoded as {}", other.kind_name()))),
        })
        .collect()
}

/// Fails if any incoming row repeats a key already stored or seen earlier
/// in the same batch.
fn check_unique<N: PartialEq>(
    existing: &[Vec<N>],
    incoming: &[Vec<N>],
    keys: &[usize],
    table: &PhysicalTable,
) -> EngineResult<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let same_key = |a: &[N], b: &[N]| keys.iter().all(|&k| a[k] == b[k]);
    for (i, row) in incoming.iter().enumerate() {
        let clash = existing.iter().any(|e| same_key(e, row)) || incoming[..i].iter().any(|e| same_key(e, row));
        if clash {
            return Err(EngineError::execution_error(format!(
                "Duplicate primary key in {table}"
            )));
        }
    }
    Ok(())
}

/// Resolves scans of one memory store while evaluating a plan.
struct ScanSource<'a, S: TypeSpace> {
    adapter: AdapterId,
    space: &'a S,
    state: &'a MemoryState<S::Native>,
}

impl<S: TypeSpace> SubplanSource for ScanSource<'_, S> {
    fn try_execute(&self, plan: &Plan) -> EngineResult<Option<Vec<Row>>> {
        let PlanNode::Scan { adapter, table, columns } = &plan.node else {
            return Ok(None);
        };
        if *adapter != self.adapter {
            return Err(EngineError::validation(format!(
                "Scan for adapter {adapter} reached adapter {}",
                self.adapter
            )));
        }
        let source = self.state.table(table)?;
        let projection = columns
            .iter()
            .map(|c| {
                let index = source.column_index(&c.physical)?;
                Ok((index, source.definition.columns[index].1.clone()))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        source
            .rows
            .iter()
            .map(|row| {
                projection
                    .iter()
                    .map(|(i, ty)| self.space.from_stored(&row[*i], ty))
                    .collect::<EngineResult<Row>>()
            })
            .collect::<EngineResult<Vec<_>>>()
            .map(Some)
    }
}

impl<S> AdapterDriver for MemoryAdapter<S>
where
    S: TypeSpace + Clone + 'static,
    S::Native: PartialEq,
{
    fn adapter_id(&self) -> AdapterId {
        self.id
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> Family {
        self.space.family()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            transactions: true,
            pushdown: true,
            documents: true,
            graphs: true,
            blob_files: false,
        }
    }

    fn create_table(&self, definition: &TableDefinition) -> EngineResult<()> {
        let mut state = self.state.write();
        match state.tables.get(&definition.physical) {
            Some(existing) if existing.definition == *definition => Ok(()),
            Some(_) => Err(EngineError::validation(format!(
                "Table {} already exists with a different layout",
                definition.physical
            ))),
            None => {
                state.tables.insert(
                    definition.physical.clone(),
                    MemoryTable {
                        definition: definition.clone(),
                        rows: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn drop_table(&self, table: &PhysicalTable) -> EngineResult<()> {
        self.state.write().tables.remove(table);
        Ok(())
    }

    fn row_count_estimate(&self, table: &PhysicalTable) -> EngineResult<Option<u64>> {
        let state = self.state.read();
        Ok(state
            .tables
            .get(table)
            .map(|t| t.rows.len() as u64)
            .or_else(|| state.collections.get(table).map(|c| c.len() as u64)))
    }

    fn cursor(&self, plan: &Plan) -> EngineResult<RowCursor> {
        let state = self.state.read();
        let source = ScanSource {
            adapter: self.id,
            space: &self.space,
            state: &state,
        };
        let rows = eval::evaluate(plan, &source)?;
        Ok(RowCursor::from_rows(plan.fields(), rows))
    }

    fn prepare(&self, plan: &Plan) -> EngineResult<Box<dyn BoundStatement>> {
        let PlanNode::Modify {
            target,
            op,
            columns,
            input,
            ..
        } = &plan.node
        else {
            return Err(EngineError::validation("prepare expects a modify plan"));
        };
        Ok(Box::new(MemoryStatement {
            space: self.space.clone(),
            state: Arc::clone(&self.state),
            target: target.clone(),
            op: *op,
            params: BoundParameters::new(columns.clone()),
            source: match input {
                ModifyInput::Parameters => None,
                ModifyInput::Plan(plan) => Some(plan.as_ref().clone()),
            },
        }))
    }

    fn scan_graph(&self, name: &str) -> EngineResult<GraphSnapshot> {
        self.graph(name)
            .ok_or_else(|| EngineError::validation(format!("Graph '{name}' does not exist on {}", self.name)))
    }

    fn scan_collection(&self, collection: &PhysicalTable) -> EngineResult<Vec<PolyMap>> {
        self.documents(collection)
    }
}

struct MemoryStatement<S: TypeSpace> {
    space: S,
    state: Arc<RwLock<MemoryState<S::Native>>>,
    target: ModifyTarget,
    op: ModifyOp,
    params: BoundParameters,
    source: Option<Plan>,
}

impl<S> MemoryStatement<S>
where
    S: TypeSpace,
    S::Native: PartialEq,
{
    fn input_rows(&self) -> EngineResult<Vec<Row>> {
        match &self.source {
            Some(plan) => eval::evaluate(plan, &eval::CoreOnly),
            None => self.params.rows(),
        }
    }

    fn modify_table(&self, table: &PhysicalTable, rows: Vec<Row>) -> EngineResult<u64> {
        let columns = self.params.columns();
        let mut state = self.state.write();
        let target = state.table_mut(table)?;
        let indexes = columns
            .iter()
            .map(|c| target.column_index(&c.physical))
            .collect::<EngineResult<Vec<_>>>()?;
        let width = target.definition.columns.len();

        // Encode the whole batch before touching the table.
        let encoded = rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(columns)
                    .map(|(value, c)| self.space.to_stored(value, &c.ty))
                    .collect::<EngineResult<Vec<_>>>()
            })
            .collect::<EngineResult<Vec<_>>>()?;

        match self.op {
            ModifyOp::Insert => {
                let full: Vec<Vec<S::Native>> = encoded
                    .into_iter()
                    .map(|values| {
                        let mut row = vec![self.space.null(); width];
                        for (value, &i) in values.into_iter().zip(&indexes) {
                            row[i] = value;
                        }
                        row
                    })
                    .collect();
                check_unique(&target.rows, &full, &target.key_indexes()?, table)?;
                let count = full.len() as u64;
                target.rows.extend(full);
                Ok(count)
            }
            ModifyOp::Update | ModifyOp::Delete => {
                let key_positions = key_positions(columns);
                let matches = |stored: &[S::Native], values: &[S::Native]| {
                    key_positions.iter().all(|&p| stored[indexes[p]] == values[p])
                };
                let mut affected = 0u64;
                for values in &encoded {
                    if self.op == ModifyOp::Delete {
                        let before = target.rows.len();
                        target.rows.retain(|stored| !matches(stored, values));
                        affected += (before - target.rows.len()) as u64;
                        continue;
                    }
                    for stored in target.rows.iter_mut().filter(|stored| matches(stored, values)) {
                        for (p, c) in columns.iter().enumerate() {
                            if !c.key {
                                stored[indexes[p]] = values[p].clone();
                            }
                        }
                        affected += 1;
                    }
                }
                Ok(affected)
            }
        }
    }

    fn modify_collection(&self, collection: &PhysicalTable, rows: Vec<Row>) -> EngineResult<u64> {
        if self.op != ModifyOp::Insert {
            return Err(EngineError::not_supported("Only inserts are supported on collections"));
        }
        let ty = document_type();
        let encoded = rows
            .iter()
            .map(|row| match row.first() {
                Some(doc @ PolyValue::Map(_)) => self.space.to_stored(doc, &ty),
                other => Err(EngineError::validation(format!(
                    "Collection insert expects a document, got {}",
                    other.map_or("nothing", PolyValue::kind_name)
                ))),
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let count = encoded.len() as u64;
        self.state
            .write()
            .collections
            .entry(collection.clone())
            .or_default()
            .extend(encoded);
        Ok(count)
    }

    fn modify_graph(&self, name: &str) -> EngineResult<u64> {
        let Some(Plan {
            node: PlanNode::Graph { snapshot },
            ..
        }) = &self.source
        else {
            return Err(EngineError::validation("Graph modify expects a graph input"));
        };
        if self.op != ModifyOp::Insert {
            return Err(EngineError::not_supported("Only inserts are supported on graphs"));
        }
        let mut state = self.state.write();
        let graph = state.graphs.entry(name.to_string()).or_default();
        for node in &snapshot.nodes {
            graph.nodes.retain(|n| n.id != node.id);
            graph.nodes.push(node.clone());
        }
        for edge in &snapshot.edges {
            graph.edges.retain(|e| e.id != edge.id);
            graph.edges.push(edge.clone());
        }
        Ok((snapshot.nodes.len() + snapshot.edges.len()) as u64)
    }
}

fn key_positions(columns: &[ModifyColumn]) -> Vec<usize> {
    columns.iter().enumerate().filter(|(_, c)| c.key).map(|(i, _)| i).collect()
}

impl<S> BoundStatement for MemoryStatement<S>
where
    S: TypeSpace + 'static,
    S::Native: PartialEq,
{
    fn bind(&mut self, column: ColumnId, ty: &ColumnType, values: Vec<PolyValue>) -> EngineResult<()> {
        self.params.bind(column, ty, values)
    }

    fn execute_bound(&mut self) -> EngineResult<u64> {
        match &self.target {
            ModifyTarget::Table(table) => {
                let rows = self.input_rows()?;
                if rows.is_empty() {
                    return Ok(0);
                }
                self.modify_table(table, rows)
            }
            ModifyTarget::Collection(collection) => {
                let rows = self.input_rows()?;
                self.modify_collection(collection, rows)
            }
            ModifyTarget::Graph(name) => self.modify_graph(name),
        }
    }

    fn reset_bindings(&mut self) {
        self.params.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{DocumentSpace, JdbcSpace};
    use crate::plan::{Expr, Field, PlannerContext, ScanColumn};
    use polyfed_core::PolyType;

    fn definition() -> TableDefinition {
        TableDefinition {
            physical: PhysicalTable::new("s", "people"),
            columns: vec![
                ("id".into(), PolyType::Integer.into()),
                ("name".into(), PolyType::Varchar.into()),
            ],
            primary_key: vec!["id".into()],
        }
    }

    fn column(id: u64, name: &str, ty: PolyType, key: bool) -> ModifyColumn {
        ModifyColumn {
            column: ColumnId(id),
            physical: name.into(),
            ty: ty.into(),
            key,
        }
    }

    /// Canonical storage that counts every conversion it performs
    #[derive(Clone, Default)]
    struct CountingSpace {
        conversions: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl CountingSpace {
        fn count(&self) -> usize {
            self.conversions.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl TypeSpace for CountingSpace {
        type Native = PolyValue;

        fn family(&self) -> Family {
            Family::Canonical
        }

        fn null(&self) -> PolyValue {
            PolyValue::Null
        }

        fn is_null(&self, native: &PolyValue) -> bool {
            native.is_null()
        }

        fn needs_mapping(&self, _ty: PolyType) -> bool {
            false
        }

        fn passthrough_native(&self, value: &PolyValue) -> Option<PolyValue> {
            Some(value.clone())
        }

        fn passthrough_canonical(&self, native: &PolyValue) -> Option<PolyValue> {
            Some(native.clone())
        }

        fn encode(&self, _: polyfed_core::Conversion, value: &PolyValue, _: &ColumnType) -> EngineResult<PolyValue> {
            self.conversions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(value.clone())
        }

        fn decode(&self, _: polyfed_core::Conversion, native: &PolyValue, _: &ColumnType) -> EngineResult<PolyValue> {
            self.conversions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(native.clone())
        }
    }

    #[test]
    fn canonical_storage_skips_conversion() {
        let space = CountingSpace::default();
        let adapter = MemoryAdapter::new(AdapterId(1), space.clone());
        let def = definition();
        adapter.create_table(&def).unwrap();
        let rows = vec![vec![PolyValue::Integer(1), PolyValue::text("Ada")]];
        adapter.insert_rows(&def.physical, rows.clone()).unwrap();
        assert_eq!(adapter.table_rows(&def.physical).unwrap(), rows);
        assert_eq!(space.count(), 0);

        // The counter itself works when the conversion is called.
        space.map_to_native(&PolyValue::Integer(1), &ColumnType::of(PolyType::Integer)).unwrap();
        assert_eq!(space.count(), 1);
    }

    #[test]
    fn duplicate_keys_reject_the_whole_batch() {
        let adapter = MemoryAdapter::new(AdapterId(1), JdbcSpace);
        let def = definition();
        adapter.create_table(&def).unwrap();
        adapter
            .insert_rows(&def.physical, vec![vec![PolyValue::Integer(1), PolyValue::text("a")]])
            .unwrap();
        let err = adapter.insert_rows(
            &def.physical,
            vec![
                vec![PolyValue::Integer(2), PolyValue::text("b")],
                vec![PolyValue::Integer(1), PolyValue::text("c")],
            ],
        );
        assert!(err.is_err());
        assert_eq!(adapter.table_rows(&def.physical).unwrap().len(), 1);
    }

    #[test]
    fn partial_insert_then_update_by_key() {
        let adapter = MemoryAdapter::new(AdapterId(1), DocumentSpace);
        let def = definition();
        adapter.create_table(&def).unwrap();
        let ctx = PlannerContext::new();
        let b = ctx.builder();
        let target = ModifyTarget::Table(def.physical.clone());

        let insert = b
            .modify(AdapterId(1), target.clone(), ModifyOp::Insert, vec![column(1, "id", PolyType::Integer, true)], ModifyInput::Parameters)
            .unwrap();
        let mut stmt = adapter.prepare(&insert).unwrap();
        stmt.bind(ColumnId(1), &PolyType::Integer.into(), vec![PolyValue::Integer(7), PolyValue::Integer(8)])
            .unwrap();
        assert_eq!(stmt.execute_bound().unwrap(), 2);

        let update = b
            .modify(
                AdapterId(1),
                target,
                ModifyOp::Update,
                vec![column(1, "id", PolyType::Integer, true), column(2, "name", PolyType::Varchar, false)],
                ModifyInput::Parameters,
            )
            .unwrap();
        let mut stmt = adapter.prepare(&update).unwrap();
        stmt.bind(ColumnId(1), &PolyType::Integer.into(), vec![PolyValue::Integer(8)]).unwrap();
        stmt.bind(ColumnId(2), &PolyType::Varchar.into(), vec![PolyValue::text("eight")]).unwrap();
        assert_eq!(stmt.execute_bound().unwrap(), 1);

        assert_eq!(
            adapter.table_rows(&def.physical).unwrap(),
            vec![
                vec![PolyValue::Integer(7), PolyValue::Null],
                vec![PolyValue::Integer(8), PolyValue::text("eight")]
            ]
        );
    }

    #[test]
    fn cursor_evaluates_above_the_scan() {
        let adapter = MemoryAdapter::new(AdapterId(3), JdbcSpace);
        let def = definition();
        adapter.create_table(&def).unwrap();
        adapter
            .insert_rows(
                &def.physical,
                (1..=4).map(|i| vec![PolyValue::Integer(i), PolyValue::text(format!("n{i}"))]).collect(),
            )
            .unwrap();
        let ctx = PlannerContext::new();
        let b = ctx.builder();
        let scan = b.scan(
            AdapterId(3),
            def.physical.clone(),
            vec![ScanColumn {
                physical: "NAME".into(),
                field: Field::new("name", PolyType::Varchar),
            }],
        );
        let plan = b.filter(scan, Expr::eq(Expr::col(0), Expr::lit("n3"))).unwrap();
        let rows = adapter.cursor(&plan).unwrap().collect_rows().unwrap();
        assert_eq!(rows, vec![vec![PolyValue::text("n3")]]);
    }

    #[test]
    fn documents_round_trip_through_the_family() {
        let adapter = MemoryAdapter::new(AdapterId(1), DocumentSpace);
        let coll = PhysicalTable::new("db", "docs");
        let doc = PolyMap::new().with("a", 1).with("b", "x");
        adapter.put_documents(&coll, vec![doc.clone()]).unwrap();
        assert_eq!(adapter.scan_collection(&coll).unwrap(), vec![doc]);
        assert_eq!(adapter.row_count_estimate(&coll).unwrap(), Some(1));
    }
}
