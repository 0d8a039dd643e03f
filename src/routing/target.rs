// SPDX-License-Identifier: Apache-2.0

//! Target side of a migration: the row transform and the modify plan.

use polyfed_core::{AdapterId, ColumnId, ColumnType, Conversion, EngineError, EngineResult, PolyValue};

use crate::catalog::{ColumnPlacement, TableMeta};
use crate::plan::{field_index, Field, ModifyColumn, ModifyInput, ModifyOp, ModifyTarget, Plan, PlanBuilder};

use super::types::MigrationMode;

/// Where a target column's values come from in a source row
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSource {
    Field(usize),
    /// Non-null fields joined by `separator`; all-null yields null
    Concat { fields: Vec<usize>, separator: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetColumn {
    pub column: ColumnId,
    pub physical: String,
    pub ty: ColumnType,
    pub key: bool,
    pub source: TargetSource,
}

impl TargetColumn {
    pub fn value(&self, row: &[PolyValue]) -> EngineResult<PolyValue> {
        let field = |i: usize| {
            row.get(i)
                .ok_or_else(|| EngineError::internal(format!("source row has no field {i}")))
        };
        match &self.source {
            TargetSource::Field(i) => field(*i).cloned(),
            TargetSource::Concat { fields, separator } => {
                let mut parts = Vec::with_capacity(fields.len());
                for &i in fields {
                    let value = field(i)?;
                    if !value.is_null() {
                        parts.push(value.to_text());
                    }
                }
                if parts.is_empty() {
                    Ok(PolyValue::Null)
                } else {
                    Ok(PolyValue::text(parts.join(separator)))
                }
            }
        }
    }

    pub fn modify_column(&self) -> ModifyColumn {
        ModifyColumn {
            column: self.column,
            physical: self.physical.clone(),
            ty: self.ty.clone(),
            key: self.key,
        }
    }
}

/// INSERT when every column the target already holds for this table is
/// part of this copy (first placement), UPDATE by primary key otherwise.
pub fn choose_mode(table: &TableMeta, target_placements: &[ColumnPlacement], columns: &[ColumnId]) -> MigrationMode {
    let copied = table.with_primary_key(columns);
    let all_copied = target_placements
        .iter()
        .filter(|p| p.table == table.id)
        .all(|p| copied.contains(&p.column));
    if all_copied {
        MigrationMode::Insert
    } else {
        MigrationMode::Update
    }
}

fn placement_for<'a>(
    table: &TableMeta,
    placements: &'a [ColumnPlacement],
    column: ColumnId,
    name: &str,
) -> EngineResult<&'a ColumnPlacement> {
    placements
        .iter()
        .find(|p| p.table == table.id && p.column == column)
        .ok_or_else(|| EngineError::planning(table.id, format!("column {name} has no placement on the target")))
}

fn source_field(table: &TableMeta, fields: &[Field], name: &str) -> EngineResult<usize> {
    field_index(fields, name)
        .ok_or_else(|| EngineError::planning(table.id, format!("source provides no field named {name}")))
}

/// Target columns for a plain copy of `columns` (plus the primary key),
/// matched to source fields by case-insensitive name.
pub fn resolve_target_columns(
    table: &TableMeta,
    source_fields: &[Field],
    placements: &[ColumnPlacement],
    columns: &[ColumnId],
) -> EngineResult<Vec<TargetColumn>> {
    table
        .with_primary_key(columns)
        .into_iter()
        .map(|id| {
            let column = table.require_column(id)?;
            let placement = placement_for(table, placements, id, &column.name)?;
            Ok(TargetColumn {
                column: id,
                physical: placement.physical.column.clone(),
                ty: column.ty.clone(),
                key: table.is_primary_key(id),
                source: TargetSource::Field(source_field(table, source_fields, &column.name)?),
            })
        })
        .collect()
}

/// Primary key columns plus one character column filled with the
/// concatenation of `sources`.
pub fn resolve_merge_columns(
    table: &TableMeta,
    source_fields: &[Field],
    placements: &[ColumnPlacement],
    sources: &[ColumnId],
    target: ColumnId,
    separator: &str,
) -> EngineResult<Vec<TargetColumn>> {
    let target_meta = table.require_column(target)?;
    if !matches!(target_meta.ty.conversion(), Conversion::Char | Conversion::Varchar) {
        return Err(EngineError::planning(
            table.id,
            format!("merge target {} must be a character column, not {}", target_meta.name, target_meta.ty),
        ));
    }
    if table.is_primary_key(target) {
        return Err(EngineError::planning(table.id, "merge target cannot be a primary key column"));
    }

    let mut out = resolve_target_columns(table, source_fields, placements, &[])?;
    let fields = sources
        .iter()
        .map(|id| source_field(table, source_fields, &table.require_column(*id)?.name))
        .collect::<EngineResult<Vec<_>>>()?;
    out.push(TargetColumn {
        column: target,
        physical: placement_for(table, placements, target, &target_meta.name)?.physical.column.clone(),
        ty: target_meta.ty.clone(),
        key: false,
        source: TargetSource::Concat {
            fields,
            separator: separator.to_string(),
        },
    });
    Ok(out)
}

/// Parameterized modify plan writing `columns` into the target placement.
pub fn build_target_plan(
    builder: PlanBuilder,
    table: &TableMeta,
    adapter: AdapterId,
    placements: &[ColumnPlacement],
    mode: MigrationMode,
    columns: &[TargetColumn],
) -> EngineResult<Plan> {
    let first = columns
        .first()
        .ok_or_else(|| EngineError::planning(table.id, "no target columns"))?;
    let physical = placement_for(table, placements, first.column, &first.physical)?.physical_table();
    let op = match mode {
        MigrationMode::Insert => ModifyOp::Insert,
        MigrationMode::Update | MigrationMode::Merge => ModifyOp::Update,
    };
    builder.modify(
        adapter,
        ModifyTarget::Table(physical),
        op,
        columns.iter().map(TargetColumn::modify_column).collect(),
        ModifyInput::Parameters,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnMeta, PhysicalName};
    use polyfed_core::{PartitionId, PolyType, TableId};

    fn table() -> TableMeta {
        TableMeta {
            id: TableId(1),
            namespace: "public".into(),
            name: "t".into(),
            columns: vec![
                ColumnMeta { id: ColumnId(1), name: "id".into(), ty: PolyType::Integer.into() },
                ColumnMeta { id: ColumnId(2), name: "first".into(), ty: PolyType::Varchar.into() },
                ColumnMeta { id: ColumnId(3), name: "last".into(), ty: PolyType::Varchar.into() },
                ColumnMeta { id: ColumnId(4), name: "full".into(), ty: PolyType::Varchar.into() },
            ],
            primary_key: vec![ColumnId(1)],
            partitions: vec![PartitionId(0)],
            partitioning: None,
        }
    }

    fn placement(column: u64) -> ColumnPlacement {
        ColumnPlacement {
            table: TableId(1),
            column: ColumnId(column),
            adapter: AdapterId(2),
            partition: PartitionId(0),
            physical: PhysicalName::new("s", "t", format!("c{column}")),
        }
    }

    #[test]
    fn mode_depends_on_what_the_target_already_holds() {
        let fresh = vec![placement(1), placement(2)];
        assert_eq!(choose_mode(&table(), &fresh, &[ColumnId(2)]), MigrationMode::Insert);
        let existing = vec![placement(1), placement(2), placement(3)];
        assert_eq!(choose_mode(&table(), &existing, &[ColumnId(3)]), MigrationMode::Update);
    }

    #[test]
    fn fields_are_matched_case_insensitively() {
        let fields = vec![Field::new("ID", PolyType::Integer), Field::new("First", PolyType::Varchar)];
        let cols = resolve_target_columns(&table(), &fields, &[placement(1), placement(2)], &[ColumnId(2)]).unwrap();
        assert_eq!(cols[0].source, TargetSource::Field(0));
        assert_eq!(cols[1].source, TargetSource::Field(1));
        assert!(cols[0].key && !cols[1].key);
        assert!(resolve_target_columns(&table(), &fields, &[placement(1)], &[ColumnId(2)]).is_err());
    }

    #[test]
    fn concat_skips_nulls() {
        let fields = vec![
            Field::new("id", PolyType::Integer),
            Field::new("first", PolyType::Varchar),
            Field::new("last", PolyType::Varchar),
        ];
        let cols = resolve_merge_columns(
            &table(),
            &fields,
            &[placement(1), placement(4)],
            &[ColumnId(2), ColumnId(3)],
            ColumnId(4),
            " - ",
        )
        .unwrap();
        let merged = &cols[1];
        let row = |a: PolyValue, b: PolyValue| vec![PolyValue::Integer(1), a, b];
        assert_eq!(merged.value(&row("Ada".into(), "Lovelace".into())).unwrap(), PolyValue::text("Ada - Lovelace"));
        assert_eq!(merged.value(&row(PolyValue::Null, "Lovelace".into())).unwrap(), PolyValue::text("Lovelace"));
        assert_eq!(merged.value(&row(PolyValue::Null, PolyValue::Null)).unwrap(), PolyValue::Null);
    }
}
