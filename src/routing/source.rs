// SPDX-License-Identifier: Apache-2.0

//! Source side of a migration: which placements to read and the plan that
//! reads them.

use std::collections::BTreeMap;

use polyfed_core::{AdapterId, ColumnId, EngineError, EngineResult, PartitionId};

use crate::catalog::{CatalogProvider, ColumnPlacement, TableMeta};
use crate::plan::{Expr, Field, JoinKind, Plan, PlanBuilder, ScanColumn};

use super::types::Distribution;

/// Picks, per partition, the placements to read `columns` (plus the primary
/// key) from. Adapters holding more of the still-missing columns are
/// preferred; ties go to the lower adapter id.
pub fn select_source_placements(
    catalog: &dyn CatalogProvider,
    table: &TableMeta,
    columns: &[ColumnId],
    partitions: &[PartitionId],
    excluded: Option<AdapterId>,
) -> EngineResult<Distribution> {
    let needed = table.with_primary_key(columns);
    let mut distribution = Distribution::new();

    for &partition in partitions {
        let candidates: Vec<ColumnPlacement> = catalog
            .placements_of_partition(table.id, partition)?
            .into_iter()
            .filter(|p| Some(p.adapter) != excluded)
            .collect();

        let mut remaining = needed.clone();
        let mut chosen: Vec<ColumnPlacement> = Vec::new();
        while let Some(&missing) = remaining.first() {
            let mut coverage: BTreeMap<AdapterId, usize> = BTreeMap::new();
            for p in candidates.iter().filter(|p| remaining.contains(&p.column)) {
                *coverage.entry(p.adapter).or_default() += 1;
            }
            let Some((adapter, _)) = coverage
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(a, c)| (*a, *c))
            else {
                let name = table.require_column(missing)?.name.clone();
                return Err(EngineError::planning(
                    table.id,
                    format!("no placements found for column {name} in partition {partition}"),
                ));
            };

            for column in &needed {
                let wanted = remaining.contains(column) || table.is_primary_key(*column);
                let already = chosen.iter().any(|p| p.adapter == adapter && p.column == *column);
                if !wanted || already {
                    continue;
                }
                match candidates.iter().find(|p| p.adapter == adapter && p.column == *column) {
                    Some(p) => chosen.push(p.clone()),
                    None if table.is_primary_key(*column) => {
                        return Err(EngineError::planning(
                            table.id,
                            format!(
                                "primary key column {} is missing on adapter {adapter} in partition {partition}",
                                table.require_column(*column)?.name
                            ),
                        ));
                    }
                    None => {}
                }
            }
            remaining.retain(|c| !chosen.iter().any(|p| p.column == *c));
        }
        distribution.insert(partition, chosen);
    }
    Ok(distribution)
}

/// Read plan producing the table's primary key plus `columns`, in
/// declaration order, named by logical column name. Columns split across
/// adapters are joined on the primary key; partitions are unioned.
pub fn build_source_plan(
    builder: PlanBuilder,
    table: &TableMeta,
    columns: &[ColumnId],
    distribution: &Distribution,
) -> EngineResult<Plan> {
    let output = table.with_primary_key(columns);
    if distribution.values().all(Vec::is_empty) {
        return Err(EngineError::planning(table.id, "no placements found"));
    }

    let mut partition_plans = Vec::new();
    for (partition, placements) in distribution {
        let mut by_adapter: BTreeMap<AdapterId, Vec<&ColumnPlacement>> = BTreeMap::new();
        for p in placements.iter().filter(|p| p.table == table.id) {
            by_adapter.entry(p.adapter).or_default().push(p);
        }
        if by_adapter.is_empty() {
            return Err(EngineError::planning(table.id, format!("no placements found in partition {partition}")));
        }

        let mut combined: Option<(Plan, Vec<ColumnId>)> = None;
        for (adapter, mut local) in by_adapter {
            local.sort_by_key(|p| table.position(p.column));
            local.dedup_by_key(|p| p.column);
            let fragment = scan_fragment(builder, table, adapter, &local)?;
            combined = Some(match combined {
                None => fragment,
                Some(left) => join_on_primary_key(builder, table, left, fragment)?,
            });
        }
        let Some((plan, ids)) = combined else {
            continue;
        };

        let indexes = output
            .iter()
            .map(|id| {
                ids.iter().position(|c| c == id).ok_or_else(|| {
                    EngineError::planning(
                        table.id,
                        format!("column {id} is not readable in partition {partition}"),
                    )
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        partition_plans.push(builder.project_columns(plan, &indexes)?);
    }
    builder.union(partition_plans, true)
}

fn scan_fragment(
    builder: PlanBuilder,
    table: &TableMeta,
    adapter: AdapterId,
    placements: &[&ColumnPlacement],
) -> EngineResult<(Plan, Vec<ColumnId>)> {
    let Some(first) = placements.first() else {
        return Err(EngineError::planning(table.id, format!("empty fragment on adapter {adapter}")));
    };
    let physical = first.physical_table();
    for key in &table.primary_key {
        if !placements.iter().any(|p| p.column == *key) {
            return Err(EngineError::planning(
                table.id,
                format!("primary key column {key} is missing from the fragment on adapter {adapter}"),
            ));
        }
    }

    let mut columns = Vec::with_capacity(placements.len());
    let mut ids = Vec::with_capacity(placements.len());
    for p in placements {
        if p.physical_table() != physical {
            return Err(EngineError::planning(
                table.id,
                format!("adapter {adapter} holds the partition in both {physical} and {}", p.physical_table()),
            ));
        }
        let column = table.require_column(p.column)?;
        columns.push(ScanColumn {
            physical: p.physical.column.clone(),
            field: Field::new(&column.name, column.ty.clone()),
        });
        ids.push(p.column);
    }
    Ok((builder.scan(adapter, physical, columns), ids))
}

fn join_on_primary_key(
    builder: PlanBuilder,
    table: &TableMeta,
    (left, left_ids): (Plan, Vec<ColumnId>),
    (right, right_ids): (Plan, Vec<ColumnId>),
) -> EngineResult<(Plan, Vec<ColumnId>)> {
    let width = left_ids.len();
    let mut condition = Vec::with_capacity(table.primary_key.len());
    for key in &table.primary_key {
        let l = left_ids.iter().position(|c| c == key);
        let r = right_ids.iter().position(|c| c == key);
        let (Some(l), Some(r)) = (l, r) else {
            return Err(EngineError::planning(table.id, format!("primary key column {key} missing from a join fragment")));
        };
        condition.push(Expr::eq(Expr::col(l), Expr::col(width + r)));
    }
    let plan = builder.join(left, right, JoinKind::Inner, Expr::and(condition))?;
    let mut ids = left_ids;
    ids.extend(right_ids);
    Ok((plan, ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, MemoryCatalog, PhysicalName};
    use crate::plan::{PlanNode, PlannerContext};
    use polyfed_core::{PolyType, TableId};

    fn catalog() -> (MemoryCatalog, TableMeta) {
        let table = TableMeta {
            id: TableId(1),
            namespace: "public".into(),
            name: "t".into(),
            columns: vec![
                ColumnMeta { id: ColumnId(1), name: "id".into(), ty: PolyType::Integer.into() },
                ColumnMeta { id: ColumnId(2), name: "a".into(), ty: PolyType::Varchar.into() },
                ColumnMeta { id: ColumnId(3), name: "b".into(), ty: PolyType::Varchar.into() },
            ],
            primary_key: vec![ColumnId(1)],
            partitions: vec![PartitionId(0)],
            partitioning: None,
        };
        let catalog = MemoryCatalog::new();
        catalog.add_table(table.clone()).unwrap();
        let place = |column: u64, adapter: u32| ColumnPlacement {
            table: TableId(1),
            column: ColumnId(column),
            adapter: AdapterId(adapter),
            partition: PartitionId(0),
            physical: PhysicalName::new("s", format!("t_{adapter}"), format!("c{column}")),
        };
        // adapter 1 holds id+a, adapter 2 holds id+b, adapter 3 holds id+a+b
        for (c, a) in [(1, 1), (2, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)] {
            catalog.add_placement(place(c, a)).unwrap();
        }
        (catalog, table)
    }

    #[test]
    fn prefers_the_adapter_holding_most_columns() {
        let (catalog, table) = catalog();
        let d = select_source_placements(&catalog, &table, &[ColumnId(2), ColumnId(3)], &[PartitionId(0)], None)
            .unwrap();
        assert!(d[&PartitionId(0)].iter().all(|p| p.adapter == AdapterId(3)));
        assert_eq!(d[&PartitionId(0)].len(), 3);
    }

    #[test]
    fn split_columns_are_joined_on_the_key() {
        let (catalog, table) = catalog();
        let d = select_source_placements(
            &catalog,
            &table,
            &[ColumnId(2), ColumnId(3)],
            &[PartitionId(0)],
            Some(AdapterId(3)),
        )
        .unwrap();
        let adapters: Vec<AdapterId> = d[&PartitionId(0)].iter().map(|p| p.adapter).collect();
        assert!(adapters.contains(&AdapterId(1)) && adapters.contains(&AdapterId(2)));

        let ctx = PlannerContext::new();
        let plan = build_source_plan(ctx.builder(), &table, &[ColumnId(3)], &d).unwrap();
        let names: Vec<String> = plan.fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["id", "b"]);
        let PlanNode::Project { input, .. } = &plan.node else {
            panic!("expected a projection, got {:?}", plan.node);
        };
        assert!(matches!(input.node, PlanNode::Join { kind: JoinKind::Inner, .. }));
    }

    #[test]
    fn missing_placement_is_a_planning_error() {
        let (catalog, table) = catalog();
        let err = select_source_placements(&catalog, &table, &[ColumnId(3)], &[PartitionId(0)], Some(AdapterId(3)))
            .and_then(|_| {
                select_source_placements(&catalog, &table, &[ColumnId(2)], &[PartitionId(7)], None)
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Planning { .. }));
    }
}
