// SPDX-License-Identifier: Apache-2.0

//! End-to-end migrations between in-memory, DuckDB and file-backed stores.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use polyfed::catalog::{table_definition, CatalogProvider, ColumnMeta, ColumnPlacement, MemoryCatalog, Partitioning, PhysicalName, TableMeta};
use polyfed::config::{RuntimeConfig, RuntimeSettings};
use polyfed::engine::drivers::{DuckDbAdapter, FileAdapter, MemoryAdapter};
use polyfed::engine::{AdapterDriver, AdapterRegistry, ExecutionContext, FederatedExecutor, GraphSnapshot, Row};
use polyfed::mapping::{CanonicalSpace, DocumentSpace, JdbcSpace};
use polyfed::partition::PartitionFunction;
use polyfed::plan::{Field, PhysicalTable, ScanColumn};
use polyfed::routing::{select_source_placements, DataMigrator, MigrationMode};
use polyfed::{AdapterId, ColumnId, PartitionId, PolyMap, PolyType, PolyValue, TableId};

const SOURCE: AdapterId = AdapterId(1);
const TARGET: AdapterId = AdapterId(2);

const ORDERS: TableId = TableId(1);
const ID: ColumnId = ColumnId(1);
const REGION: ColumnId = ColumnId(2);
const NOTE: ColumnId = ColumnId(3);
const US: PartitionId = PartitionId(0);
const EU: PartitionId = PartitionId(1);

fn region_partitioning(us: PartitionId, eu: PartitionId) -> Partitioning {
    Partitioning {
        column: REGION,
        function: PartitionFunction::List {
            lists: vec![(eu, vec![PolyValue::text("eu")])],
            unbound: us,
        },
    }
}

fn orders(id: TableId, partitions: Vec<PartitionId>, partitioning: Option<Partitioning>) -> TableMeta {
    TableMeta {
        id,
        namespace: "public".into(),
        name: "orders".into(),
        columns: vec![
            ColumnMeta { id: ID, name: "id".into(), ty: PolyType::BigInt.into() },
            ColumnMeta { id: REGION, name: "region".into(), ty: PolyType::Varchar.into() },
            ColumnMeta { id: NOTE, name: "note".into(), ty: PolyType::Varchar.into() },
        ],
        primary_key: vec![ID],
        partitions,
        partitioning,
    }
}

fn source_rows() -> Vec<Row> {
    [(1, "eu", Some("first")), (2, "us", Some("second")), (3, "eu", None), (4, "us", Some("")), (5, "us", Some("fifth"))]
        .into_iter()
        .map(|(id, region, note)| {
            vec![
                PolyValue::BigInt(id),
                PolyValue::text(region),
                note.map_or(PolyValue::Null, PolyValue::text),
            ]
        })
        .collect()
}

fn in_partition(rows: &[Row], partition: PartitionId) -> Vec<Row> {
    let function = region_partitioning(US, EU).function;
    rows.iter().filter(|r| function.assign_value(&r[1]) == partition).cloned().collect()
}

/// Places every column of `table` in each partition on `adapter`, under
/// `schema.<name>_p<partition>`, and creates the physical tables.
fn place_all(
    catalog: &MemoryCatalog,
    adapter: &dyn AdapterDriver,
    table: &TableMeta,
    schema: &str,
) -> Vec<PhysicalTable> {
    let mut physical = Vec::new();
    for &partition in &table.partitions {
        let name = format!("{}_p{}", table.name, partition.0);
        for column in &table.columns {
            catalog
                .add_placement(ColumnPlacement {
                    table: table.id,
                    column: column.id,
                    adapter: adapter.adapter_id(),
                    partition,
                    physical: PhysicalName::new(schema, name.clone(), column.name.clone()),
                })
                .unwrap();
        }
        let definition = table_definition(table, &catalog.placements(table.id).unwrap(), adapter.adapter_id(), partition).unwrap();
        adapter.create_table(&definition).unwrap();
        physical.push(definition.physical);
    }
    physical
}

struct Fixture {
    catalog: Arc<MemoryCatalog>,
    registry: AdapterRegistry,
    config: Arc<RuntimeConfig>,
}

impl Fixture {
    /// Partitioned orders table fully placed on the JDBC-family source.
    fn new(batch_size: usize) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let table = orders(ORDERS, vec![US, EU], Some(region_partitioning(US, EU)));
        catalog.add_table(table.clone()).unwrap();
        let source = Arc::new(MemoryAdapter::new(SOURCE, JdbcSpace));
        let physical = place_all(&catalog, source.as_ref(), &table, "src");
        for (partition, physical) in table.partitions.iter().zip(&physical) {
            source.insert_rows(physical, in_partition(&source_rows(), *partition)).unwrap();
        }
        let mut registry = AdapterRegistry::new();
        registry.register(source);
        let config = Arc::new(
            RuntimeConfig::new(RuntimeSettings {
                migration_batch_size: batch_size,
                ..RuntimeSettings::default()
            })
            .unwrap(),
        );
        Self {
            catalog,
            registry,
            config,
        }
    }

    fn add(&mut self, adapter: Arc<dyn AdapterDriver>) {
        self.registry.register(adapter);
    }

    fn migrator(self) -> (DataMigrator, Arc<MemoryCatalog>, Arc<AdapterRegistry>) {
        let registry = Arc::new(self.registry);
        let migrator = DataMigrator::new(self.catalog.clone(), Arc::clone(&registry), self.config);
        (migrator, self.catalog, registry)
    }
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new(Duration::from_secs(30))
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|r| match r[0] {
        PolyValue::BigInt(i) => i,
        _ => i64::MAX,
    });
    rows
}

fn read_back(registry: &Arc<AdapterRegistry>, adapter: AdapterId, tables: &[PhysicalTable]) -> Vec<Row> {
    let ctx = ctx();
    let mut out = Vec::new();
    for table in tables {
        let columns = [("id", PolyType::BigInt), ("region", PolyType::Varchar), ("note", PolyType::Varchar)]
            .into_iter()
            .map(|(name, ty)| ScanColumn { physical: name.into(), field: Field::new(name, ty) })
            .collect();
        let scan = ctx.planner().builder().scan(adapter, table.clone(), columns);
        out.extend(FederatedExecutor::new(Arc::clone(registry)).execute(&ctx, &scan).unwrap().collect_rows().unwrap());
    }
    sorted(out)
}

#[test]
fn partitioned_copy_to_a_fresh_document_store_inserts_every_row() {
    let mut fixture = Fixture::new(2);
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, _, _) = fixture.migrator();

    let report = migrator.copy_data(&ctx(), TARGET, ORDERS, &[REGION, NOTE], &[US, EU]).unwrap();

    assert_eq!(report.mode, MigrationMode::Insert);
    assert_eq!(report.rows, 5);
    // us: 3 rows in batches of 2 -> 2 executes, eu: 2 rows -> 1
    assert_eq!(report.batches, 3);
    assert_eq!(report.partitions[&US], 3);
    assert_eq!(report.partitions[&EU], 2);

    assert_eq!(sorted(target.table_rows(&physical[0]).unwrap()), sorted(in_partition(&source_rows(), US)));
    assert_eq!(sorted(target.table_rows(&physical[1]).unwrap()), sorted(in_partition(&source_rows(), EU)));
}

#[test]
fn copy_into_duckdb_round_trips_values() {
    let mut fixture = Fixture::new(4);
    let target = Arc::new(DuckDbAdapter::open_in_memory(TARGET).unwrap());
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, _, registry) = fixture.migrator();

    migrator.copy_data(&ctx(), TARGET, ORDERS, &[REGION, NOTE], &[US, EU]).unwrap();

    assert_eq!(read_back(&registry, TARGET, &physical), sorted(source_rows()));
}

#[test]
fn copy_into_the_file_store_round_trips_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::new(3);
    let target = Arc::new(FileAdapter::new(TARGET, dir.path()).unwrap());
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, _, registry) = fixture.migrator();

    let report = migrator.copy_data(&ctx(), TARGET, ORDERS, &[NOTE], &[US, EU]).unwrap();
    assert_eq!(report.rows, 5);

    assert_eq!(read_back(&registry, TARGET, &physical), sorted(source_rows()));
}

#[test]
fn second_copy_to_an_existing_placement_updates_by_key() {
    let mut fixture = Fixture::new(10);
    let target = Arc::new(MemoryAdapter::new(TARGET, CanonicalSpace));
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, _, _) = fixture.migrator();

    // Once every column is placed on the target, copying only the note
    // column updates the rows the first pass created.
    let first = migrator.copy_data(&ctx(), TARGET, ORDERS, &[REGION, NOTE], &[US, EU]).unwrap();
    assert_eq!(first.mode, MigrationMode::Insert);
    let second = migrator.copy_data(&ctx(), TARGET, ORDERS, &[NOTE], &[US, EU]).unwrap();
    assert_eq!(second.mode, MigrationMode::Update);
    assert_eq!(second.rows, 5);

    let mut stored = target.table_rows(&physical[0]).unwrap();
    stored.extend(target.table_rows(&physical[1]).unwrap());
    assert_eq!(sorted(stored), sorted(source_rows()));
}

#[test]
fn selective_copy_routes_rows_by_partition_value() {
    let mut fixture = Fixture::new(2);
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, catalog, _) = fixture.migrator();

    let distribution = select_source_placements(catalog.as_ref(), &table, &[NOTE], &[US, EU], Some(TARGET)).unwrap();
    let report = migrator
        .copy_selective_data(&ctx(), TARGET, ORDERS, &[NOTE], &distribution, &[US, EU])
        .unwrap();

    assert_eq!(report.rows, 5);
    assert_eq!(target.table_rows(&physical[0]).unwrap().len(), 3);
    assert_eq!(target.table_rows(&physical[1]).unwrap().len(), 2);
}

#[test]
fn repartitioning_moves_rows_to_their_new_partitions() {
    const FLAT: TableId = TableId(2);
    const NEW_US: PartitionId = PartitionId(10);
    const NEW_EU: PartitionId = PartitionId(11);

    let catalog = Arc::new(MemoryCatalog::new());
    let flat = TableMeta { name: "flat".into(), ..orders(FLAT, vec![PartitionId(0)], None) };
    let split = TableMeta {
        name: "split".into(),
        ..orders(ORDERS, vec![NEW_US, NEW_EU], Some(region_partitioning(NEW_US, NEW_EU)))
    };
    catalog.add_table(flat.clone()).unwrap();
    catalog.add_table(split.clone()).unwrap();

    let source = Arc::new(MemoryAdapter::new(SOURCE, JdbcSpace));
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let source_physical = place_all(&catalog, source.as_ref(), &flat, "src");
    source.insert_rows(&source_physical[0], source_rows()).unwrap();
    let target_physical = place_all(&catalog, target.as_ref(), &split, "dst");

    let mut registry = AdapterRegistry::new();
    registry.register(source);
    registry.register(target.clone());
    let migrator = DataMigrator::new(catalog, Arc::new(registry), Arc::new(RuntimeConfig::default()));

    let report = migrator
        .copy_partition_data(&ctx(), TARGET, FLAT, ORDERS, &[REGION, NOTE], &[PartitionId(0)], &[NEW_US, NEW_EU])
        .unwrap();

    assert_eq!(report.table, Some(ORDERS));
    assert_eq!(report.partitions[&NEW_US], 3);
    assert_eq!(report.partitions[&NEW_EU], 2);
    let eu = target.table_rows(&target_physical[1]).unwrap();
    assert!(eu.iter().all(|r| r[1] == PolyValue::text("eu")));
}

#[test]
fn source_without_the_partitioning_column_fills_the_unbound_partition() {
    const LEGACY: TableId = TableId(3);
    const NEW_US: PartitionId = PartitionId(10);
    const NEW_EU: PartitionId = PartitionId(11);

    let catalog = Arc::new(MemoryCatalog::new());
    let mut legacy = TableMeta { name: "legacy".into(), ..orders(LEGACY, vec![PartitionId(0)], None) };
    legacy.columns.retain(|c| c.id != REGION);
    let split = TableMeta {
        name: "split".into(),
        ..orders(ORDERS, vec![NEW_US, NEW_EU], Some(region_partitioning(NEW_US, NEW_EU)))
    };
    catalog.add_table(legacy.clone()).unwrap();
    catalog.add_table(split.clone()).unwrap();

    let source = Arc::new(MemoryAdapter::new(SOURCE, JdbcSpace));
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let source_physical = place_all(&catalog, source.as_ref(), &legacy, "src");
    let rows: Vec<Row> = source_rows().into_iter().map(|r| vec![r[0].clone(), r[2].clone()]).collect();
    source.insert_rows(&source_physical[0], rows).unwrap();
    let target_physical = place_all(&catalog, target.as_ref(), &split, "dst");

    let mut registry = AdapterRegistry::new();
    registry.register(source);
    registry.register(target.clone());
    let migrator = DataMigrator::new(catalog, Arc::new(registry), Arc::new(RuntimeConfig::default()));

    let report = migrator
        .copy_partition_data(&ctx(), TARGET, LEGACY, ORDERS, &[NOTE], &[PartitionId(0)], &[NEW_US, NEW_EU])
        .unwrap();

    assert_eq!(report.rows, 5);
    assert_eq!(report.partitions[&NEW_US], 5);
    assert!(!report.partitions.contains_key(&NEW_EU));
    assert_eq!(target.table_rows(&target_physical[0]).unwrap().len(), 5);
    assert!(target.table_rows(&target_physical[1]).unwrap().is_empty());
}

#[test]
fn empty_graphs_are_skipped() {
    let source = Arc::new(MemoryAdapter::new(SOURCE, CanonicalSpace));
    let target = Arc::new(MemoryAdapter::new(TARGET, CanonicalSpace));
    source.put_graph("empty", GraphSnapshot::default());

    let mut registry = AdapterRegistry::new();
    registry.register(source);
    registry.register(target.clone());
    let migrator = DataMigrator::new(Arc::new(MemoryCatalog::new()), Arc::new(registry), Arc::new(RuntimeConfig::default()));

    let report = migrator.copy_graph(&ctx(), SOURCE, "empty", TARGET, "copy").unwrap();
    assert!(report.skipped);
    assert_eq!(report.rows, 0);
    assert!(target.graph("copy").is_none());
}

#[test]
fn merge_concatenates_split_columns() {
    const PEOPLE: TableId = TableId(3);
    let (id, first, last, full) = (ColumnId(1), ColumnId(2), ColumnId(3), ColumnId(4));
    let table = TableMeta {
        id: PEOPLE,
        namespace: "public".into(),
        name: "people".into(),
        columns: vec![
            ColumnMeta { id, name: "id".into(), ty: PolyType::Integer.into() },
            ColumnMeta { id: first, name: "first".into(), ty: PolyType::Varchar.into() },
            ColumnMeta { id: last, name: "last".into(), ty: PolyType::Varchar.into() },
            ColumnMeta { id: full, name: "full".into(), ty: PolyType::Varchar.into() },
        ],
        primary_key: vec![id],
        partitions: vec![PartitionId(0)],
        partitioning: None,
    };
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.add_table(table.clone()).unwrap();

    let source = Arc::new(MemoryAdapter::new(SOURCE, JdbcSpace));
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let place = |column: ColumnId, adapter: AdapterId, schema: &str, name: &str| ColumnPlacement {
        table: PEOPLE,
        column,
        adapter,
        partition: PartitionId(0),
        physical: PhysicalName::new(schema, "people", name),
    };
    for (column, name) in [(id, "id"), (first, "first"), (last, "last")] {
        catalog.add_placement(place(column, SOURCE, "src", name)).unwrap();
    }
    for (column, name) in [(id, "id"), (full, "full")] {
        catalog.add_placement(place(column, TARGET, "dst", name)).unwrap();
    }
    let placements = catalog.placements(PEOPLE).unwrap();
    let source_def = table_definition(&table, &placements, SOURCE, PartitionId(0)).unwrap();
    let target_def = table_definition(&table, &placements, TARGET, PartitionId(0)).unwrap();
    source.create_table(&source_def).unwrap();
    target.create_table(&target_def).unwrap();

    let people: Vec<Row> = (1..=3)
        .map(|i| vec![PolyValue::Integer(i), PolyValue::text("Name1"), PolyValue::text("Name2")])
        .collect();
    source.insert_rows(&source_def.physical, people).unwrap();
    target
        .insert_rows(&target_def.physical, (1..=3).map(|i| vec![PolyValue::Integer(i), PolyValue::Null]).collect())
        .unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(source);
    registry.register(target.clone());
    let migrator = DataMigrator::new(catalog, Arc::new(registry), Arc::new(RuntimeConfig::default()));

    let report = migrator.merge_columns(&ctx(), TARGET, PEOPLE, &[first, last], full, " - ").unwrap();
    assert_eq!(report.mode, MigrationMode::Merge);
    assert_eq!(report.rows, 3);

    let merged = target.table_rows(&target_def.physical).unwrap();
    assert_eq!(merged.len(), 3);
    assert!(merged.iter().all(|r| r[1] == PolyValue::text("Name1 - Name2")));
}

#[test]
fn expired_deadline_aborts_before_writing() {
    let mut fixture = Fixture::new(2);
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    let table = fixture.catalog.table(ORDERS).unwrap();
    let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
    fixture.add(target.clone());
    let (migrator, _, _) = fixture.migrator();

    let err = migrator
        .copy_data(&ExecutionContext::new(Duration::ZERO), TARGET, ORDERS, &[NOTE], &[US, EU])
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(target.table_rows(&physical[0]).unwrap().is_empty());
}

#[test]
fn missing_source_placement_is_reported_with_the_table() {
    let mut fixture = Fixture::new(2);
    let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
    fixture.add(target);
    let (migrator, catalog, _) = fixture.migrator();
    assert!(catalog.remove_placement(ORDERS, NOTE, SOURCE, EU));

    let err = migrator.copy_data(&ctx(), TARGET, ORDERS, &[NOTE], &[EU]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("table 1"), "{message}");
}

#[test]
fn collections_are_copied_whole_and_empty_ones_skipped() {
    let source = Arc::new(MemoryAdapter::new(SOURCE, DocumentSpace));
    let target = Arc::new(MemoryAdapter::new(TARGET, CanonicalSpace));
    let users = PhysicalTable::new("app", "users");
    let empty = PhysicalTable::new("app", "empty");
    source
        .put_documents(
            &users,
            vec![
                PolyMap::new().with("name", PolyValue::text("ada")).with("age", PolyValue::BigInt(36)),
                PolyMap::new().with("name", PolyValue::text("alan")),
            ],
        )
        .unwrap();
    source.put_documents(&empty, Vec::new()).unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(source.clone());
    registry.register(target.clone());
    let migrator = DataMigrator::new(Arc::new(MemoryCatalog::new()), Arc::new(registry), Arc::new(RuntimeConfig::default()));

    let copy = PhysicalTable::new("app", "users_copy");
    let report = migrator.copy_collection(&ctx(), SOURCE, &users, TARGET, &copy).unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(target.documents(&copy).unwrap(), source.documents(&users).unwrap());

    let skipped = migrator.copy_collection(&ctx(), SOURCE, &empty, TARGET, &copy).unwrap();
    assert!(skipped.skipped);
    assert_eq!(skipped.batches, 0);
    assert_eq!(target.documents(&copy).unwrap().len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn final_rows_do_not_depend_on_batch_size(batch_size in 1usize..8) {
        let mut fixture = Fixture::new(batch_size);
        let target = Arc::new(MemoryAdapter::new(TARGET, DocumentSpace));
        let table = fixture.catalog.table(ORDERS).unwrap();
        let physical = place_all(&fixture.catalog, target.as_ref(), &table, "dst");
        fixture.add(target.clone());
        let (migrator, _, _) = fixture.migrator();

        let report = migrator.copy_data(&ctx(), TARGET, ORDERS, &[REGION, NOTE], &[US, EU]).unwrap();
        prop_assert_eq!(report.rows, 5);

        let mut stored = target.table_rows(&physical[0]).unwrap();
        stored.extend(target.table_rows(&physical[1]).unwrap());
        prop_assert_eq!(sorted(stored), sorted(source_rows()));
    }
}
