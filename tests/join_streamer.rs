// SPDX-License-Identifier: Apache-2.0

//! Streamed joins across two adapters.

use std::sync::Arc;
use std::time::Duration;

use polyfed::engine::drivers::MemoryAdapter;
use polyfed::engine::{AdapterDriver, AdapterRegistry, ExecutionContext, Row, TableDefinition};
use polyfed::mapping::{DocumentSpace, JdbcSpace};
use polyfed::plan::{CompareOp, Expr, Field, JoinKind, PhysicalTable, Plan, ScanColumn};
use polyfed::streamer::{synthesize, JoinPair, JoinStreamer};
use polyfed::{AdapterId, PolyType, PolyValue};

const SMALL: AdapterId = AdapterId(1);
const LARGE: AdapterId = AdapterId(2);

fn definition(name: &str) -> TableDefinition {
    TableDefinition {
        physical: PhysicalTable::new("app", name),
        columns: vec![
            ("id".into(), PolyType::Integer.into()),
            ("region".into(), PolyType::Varchar.into()),
        ],
        primary_key: vec!["id".into()],
    }
}

fn row(id: i32, region: &str) -> Row {
    vec![PolyValue::Integer(id), PolyValue::text(region)]
}

fn customer_rows() -> Vec<Row> {
    vec![row(2, "eu"), row(4, "us"), row(6, "eu")]
}

fn order_rows() -> Vec<Row> {
    (1..=10).map(|i| row(i, if i % 2 == 0 { "eu" } else { "us" })).collect()
}

fn row_text(row: &[PolyValue]) -> String {
    row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("|")
}

/// Inner join of the seeded tables by exhaustive comparison.
fn cross_product_join(condition: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    for customer in customer_rows() {
        for order in order_rows() {
            let joined: Row = customer.iter().chain(order.iter()).cloned().collect();
            if condition.matches(&joined).unwrap() {
                out.push(row_text(&joined));
            }
        }
    }
    out.sort();
    out
}

fn streamed_inner_join(condition: Expr) -> Vec<String> {
    let (registry, customers, orders) = registry();
    let ctx = ExecutionContext::new(Duration::from_secs(5));
    let join = ctx
        .planner()
        .builder()
        .join(scan(&ctx, SMALL, customers), scan(&ctx, LARGE, orders), JoinKind::Inner, condition)
        .unwrap();
    let rows = JoinStreamer::new(registry).execute(&ctx, &join).unwrap().collect_rows().unwrap();
    let mut out: Vec<String> = rows.iter().map(|r| row_text(r)).collect();
    out.sort();
    out
}

/// Three customers on a relational adapter, ten orders on a document one.
fn registry() -> (Arc<AdapterRegistry>, PhysicalTable, PhysicalTable) {
    let small = Arc::new(MemoryAdapter::new(SMALL, JdbcSpace));
    let large = Arc::new(MemoryAdapter::new(LARGE, DocumentSpace));
    let (customers, orders) = (definition("customers"), definition("orders"));
    small.create_table(&customers).unwrap();
    large.create_table(&orders).unwrap();
    small.insert_rows(&customers.physical, customer_rows()).unwrap();
    large.insert_rows(&orders.physical, order_rows()).unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(small);
    registry.register(large);
    (Arc::new(registry), customers.physical, orders.physical)
}

fn scan(ctx: &ExecutionContext, adapter: AdapterId, table: PhysicalTable) -> Plan {
    ctx.planner().builder().scan(
        adapter,
        table,
        vec![
            ScanColumn { physical: "id".into(), field: Field::new("id", PolyType::Integer) },
            ScanColumn { physical: "region".into(), field: Field::new("region", PolyType::Varchar) },
        ],
    )
}

fn ids(rows: &[Row], column: usize) -> Vec<PolyValue> {
    let mut ids: Vec<PolyValue> = rows.iter().map(|r| r[column].clone()).collect();
    ids.sort_by(|a, b| a.compare(b).unwrap_or(std::cmp::Ordering::Equal));
    ids
}

#[test]
fn smaller_side_becomes_a_three_way_disjunction() {
    let pairs = [JoinPair { executed: 0, pending: 0, op: CompareOp::Eq, conjunct: true }];
    let rows = vec![vec![PolyValue::Integer(2)], vec![PolyValue::Integer(4)], vec![PolyValue::Integer(6)]];
    let filter = synthesize(&pairs, &rows).unwrap();
    let Expr::Or(disjuncts) = filter else {
        panic!("expected a disjunction, got {filter:?}");
    };
    assert_eq!(
        disjuncts,
        vec![
            Expr::eq(Expr::col(0), Expr::lit(2)),
            Expr::eq(Expr::col(0), Expr::lit(4)),
            Expr::eq(Expr::col(0), Expr::lit(6)),
        ]
    );
}

#[test]
fn inner_join_returns_only_matching_keys() {
    let (registry, customers, orders) = registry();
    let ctx = ExecutionContext::new(Duration::from_secs(5));
    let join = ctx
        .planner()
        .builder()
        .join(
            scan(&ctx, SMALL, customers),
            scan(&ctx, LARGE, orders),
            JoinKind::Inner,
            Expr::eq(Expr::col(0), Expr::col(2)),
        )
        .unwrap();

    let rows = JoinStreamer::new(registry).execute(&ctx, &join).unwrap().collect_rows().unwrap();

    assert_eq!(rows.len(), 3);
    let expected: Vec<PolyValue> = [2, 4, 6].into_iter().map(PolyValue::Integer).collect();
    assert_eq!(ids(&rows, 0), expected);
    assert_eq!(ids(&rows, 2), expected);
    for r in &rows {
        assert_eq!(r.len(), 4);
    }
}

#[test]
fn composite_condition_filters_on_every_equality() {
    let (registry, customers, orders) = registry();
    let ctx = ExecutionContext::new(Duration::from_secs(5));
    let condition = Expr::and(vec![
        Expr::eq(Expr::col(0), Expr::col(2)),
        Expr::eq(Expr::col(1), Expr::col(3)),
    ]);
    let join = ctx
        .planner()
        .builder()
        .join(scan(&ctx, SMALL, customers), scan(&ctx, LARGE, orders), JoinKind::Inner, condition)
        .unwrap();

    let rows = JoinStreamer::new(registry).execute(&ctx, &join).unwrap().collect_rows().unwrap();

    // Customer 4 is in "us", order 4 in "eu".
    assert_eq!(ids(&rows, 0), vec![PolyValue::Integer(2), PolyValue::Integer(6)]);
}

#[test]
fn right_join_keeps_every_pending_row() {
    let (registry, customers, orders) = registry();
    let ctx = ExecutionContext::new(Duration::from_secs(5));
    let join = ctx
        .planner()
        .builder()
        .join(
            scan(&ctx, SMALL, customers),
            scan(&ctx, LARGE, orders),
            JoinKind::Right,
            Expr::eq(Expr::col(0), Expr::col(2)),
        )
        .unwrap();

    let rows = JoinStreamer::new(registry).execute(&ctx, &join).unwrap().collect_rows().unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(rows.iter().filter(|r| r[0].is_null()).count(), 7);
}

#[test]
fn expired_deadline_aborts_the_join() {
    let (registry, customers, orders) = registry();
    let planning = ExecutionContext::new(Duration::from_secs(5));
    let join = planning
        .planner()
        .builder()
        .join(
            scan(&planning, SMALL, customers),
            scan(&planning, LARGE, orders),
            JoinKind::Inner,
            Expr::eq(Expr::col(0), Expr::col(2)),
        )
        .unwrap();
    let bytes = polyfed::plan::payload::encode_plan(&join).unwrap();

    let ctx = ExecutionContext::new(Duration::ZERO);
    let err = JoinStreamer::new(registry).execute_payload(&ctx, &bytes).unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn disjunctive_condition_matches_the_cross_product() {
    let condition = Expr::or(vec![
        Expr::eq(Expr::col(0), Expr::col(2)),
        Expr::eq(Expr::col(1), Expr::col(3)),
    ]);
    let rows = streamed_inner_join(condition.clone());
    // Each customer meets its own order plus every order of its region.
    assert_eq!(rows.len(), 16);
    assert_eq!(rows, cross_product_join(&condition));
}

#[test]
fn disjunction_under_a_conjunction_keeps_the_outer_equality() {
    let condition = Expr::and(vec![
        Expr::eq(Expr::col(1), Expr::col(3)),
        Expr::or(vec![
            Expr::eq(Expr::col(0), Expr::col(2)),
            Expr::compare(CompareOp::Lt, Expr::col(2), Expr::lit(3)),
        ]),
    ]);
    let rows = streamed_inner_join(condition.clone());
    assert_eq!(rows, cross_product_join(&condition));
    assert_eq!(rows.len(), 4);
}

#[test]
fn not_equal_condition_matches_the_cross_product() {
    let condition = Expr::compare(CompareOp::NotEq, Expr::col(1), Expr::col(3));
    let rows = streamed_inner_join(condition.clone());
    assert_eq!(rows.len(), 15);
    assert_eq!(rows, cross_product_join(&condition));

    let mixed = Expr::and(vec![
        Expr::eq(Expr::col(0), Expr::col(2)),
        Expr::compare(CompareOp::NotEq, Expr::col(1), Expr::col(3)),
    ]);
    let rows = streamed_inner_join(mixed.clone());
    assert_eq!(rows, cross_product_join(&mixed));
    assert_eq!(rows.len(), 1);
}
