// SPDX-License-Identifier: Apache-2.0

//! SQL Generator
//!
//! Renders plan fragments and modify statements for the DuckDB adapter.
//! Every intermediate relation exposes positional columns named `c0..cN`,
//! so a node only needs its input's arity to reference it. Literals are
//! never inlined: each becomes a `CAST(? AS T)` placeholder with the value
//! carried in [`SqlFragment::params`].

use polyfed_core::{ColumnType, Conversion, EngineError, EngineResult, PolyValue};

use crate::engine::types::TableDefinition;
use crate::plan::{
    AggregateFunction, CompareOp, Expr, Field, JoinKind, ModifyColumn, PhysicalTable, Plan, PlanNode,
};

/// Rendered statement plus the typed values for its placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<(PolyValue, ColumnType)>,
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified_table(table: &PhysicalTable) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.table))
}

/// DuckDB column type used to store a canonical type.
///
/// Decimals keep their exact text, intervals their scalar magnitude and
/// composites their canonical JSON form.
pub fn storage_type(ty: &ColumnType) -> &'static str {
    match ty.conversion() {
        Conversion::Boolean => "BOOLEAN",
        Conversion::TinyInt => "TINYINT",
        Conversion::SmallInt => "SMALLINT",
        Conversion::Integer => "INTEGER",
        Conversion::BigInt | Conversion::Interval => "BIGINT",
        Conversion::Real => "FLOAT",
        Conversion::Double => "DOUBLE",
        Conversion::Date => "DATE",
        Conversion::Time => "TIME",
        Conversion::Timestamp => "TIMESTAMP",
        Conversion::Binary | Conversion::Varbinary | Conversion::Multimedia => "BLOB",
        Conversion::Decimal
        | Conversion::Char
        | Conversion::Varchar
        | Conversion::Array
        | Conversion::Map
        | Conversion::Json
        | Conversion::Object
        | Conversion::Null => "VARCHAR",
    }
}

/// Whether SQL comparison and ordering on the stored form agree with
/// canonical semantics.
fn natively_ordered(ty: &ColumnType) -> bool {
    matches!(
        ty.conversion(),
        Conversion::Boolean
            | Conversion::TinyInt
            | Conversion::SmallInt
            | Conversion::Integer
            | Conversion::BigInt
            | Conversion::Real
            | Conversion::Double
            | Conversion::Date
            | Conversion::Time
            | Conversion::Timestamp
            | Conversion::Char
            | Conversion::Varchar
    )
}

fn placeholder(ty: &ColumnType) -> String {
    format!("CAST(? AS {})", storage_type(ty))
}

fn not_renderable(what: impl Into<String>) -> EngineError {
    EngineError::not_supported(format!("Cannot render {} as SQL", what.into()))
}

// ==================== Queries ====================

/// Renders a query tree whose every node runs on this adapter.
pub fn render_query(plan: &Plan) -> EngineResult<SqlFragment> {
    let mut params = Vec::new();
    let sql = render_node(plan, &mut params)?;
    Ok(SqlFragment { sql, params })
}

fn columns_of(alias: &str, width: usize, offset: usize) -> Vec<String> {
    (0..width).map(|i| format!("{alias}.c{i} AS c{}", i + offset)).collect()
}

fn render_node(plan: &Plan, params: &mut Vec<(PolyValue, ColumnType)>) -> EngineResult<String> {
    match &plan.node {
        PlanNode::Scan { table, columns, .. } => {
            if columns.is_empty() {
                return Err(not_renderable(format!("scan of {table} without columns")));
            }
            let select: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} AS c{i}", quote_ident(&c.physical)))
                .collect();
            Ok(format!("SELECT {} FROM {}", select.join(", "), qualified_table(table)))
        }
        PlanNode::Filter { input, condition } => {
            let inner = render_node(input, params)?;
            let fields = input.fields();
            let cond = render_expr(condition, &|i| column_ref("t", i), &fields, params)?;
            Ok(format!("SELECT * FROM ({inner}) AS t WHERE {cond}"))
        }
        PlanNode::Project { input, exprs } => {
            let inner = render_node(input, params)?;
            let fields = input.fields();
            let select = exprs
                .iter()
                .enumerate()
                .map(|(i, (expr, field))| {
                    let rendered = match expr {
                        Expr::Literal(value) => {
                            params.push((value.clone(), field.ty.clone()));
                            placeholder(&field.ty)
                        }
                        other => render_expr(other, &|c| column_ref("t", c), &fields, params)?,
                    };
                    Ok(format!("{rendered} AS c{i}"))
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(format!("SELECT {} FROM ({inner}) AS t", select.join(", ")))
        }
        PlanNode::Sort { input, keys } => {
            let fields = input.fields();
            if let Some(key) = keys.iter().find(|k| !natively_ordered(&fields[k.column].ty)) {
                return Err(not_renderable(format!("ordering on {}", fields[key.column].ty)));
            }
            let inner = render_node(input, params)?;
            let order: Vec<String> = keys
                .iter()
                .map(|k| {
                    let dir = if k.descending { "DESC" } else { "ASC" };
                    format!("t.c{} {dir} NULLS FIRST", k.column)
                })
                .collect();
            Ok(format!("SELECT * FROM ({inner}) AS t ORDER BY {}", order.join(", ")))
        }
        PlanNode::Union { inputs, all } => {
            let parts = inputs
                .iter()
                .map(|p| render_node(p, params).map(|sql| format!("({sql})")))
                .collect::<EngineResult<Vec<_>>>()?;
            let op = if *all { " UNION ALL " } else { " UNION " };
            Ok(format!("SELECT * FROM ({}) AS t", parts.join(op)))
        }
        PlanNode::Join {
            left,
            right,
            kind,
            condition,
        } => {
            let l = render_node(left, params)?;
            let r = render_node(right, params)?;
            let left_width = left.field_count();
            let mut fields = left.fields();
            fields.extend(right.fields());
            let resolve = |i: usize| {
                if i < left_width {
                    column_ref("l", i)
                } else {
                    column_ref("r", i - left_width)
                }
            };
            let cond = render_expr(condition, &resolve, &fields, params)?;
            let mut select = columns_of("l", left_width, 0);
            select.extend(columns_of("r", right.field_count(), left_width));
            let join = match kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
                JoinKind::Right => "RIGHT JOIN",
                JoinKind::Full => "FULL JOIN",
            };
            Ok(format!(
                "SELECT {} FROM ({l}) AS l {join} ({r}) AS r ON {cond}",
                select.join(", ")
            ))
        }
        PlanNode::Aggregate { input, group, calls } => {
            let fields = input.fields();
            let mut select: Vec<String> = group.iter().enumerate().map(|(i, g)| format!("t.c{g} AS c{i}")).collect();
            for (offset, call) in calls.iter().enumerate() {
                let out = group.len() + offset;
                let rendered = match (call.function, call.column) {
                    (AggregateFunction::Count, None) => "COUNT(*)".to_string(),
                    (AggregateFunction::Count, Some(c)) => format!("COUNT(t.c{c})"),
                    (function, Some(c)) if natively_ordered(&fields[c].ty) => {
                        let name = match function {
                            AggregateFunction::Sum => "SUM",
                            AggregateFunction::Min => "MIN",
                            AggregateFunction::Max => "MAX",
                            AggregateFunction::Count => "COUNT",
                        };
                        format!("{name}(t.c{c})")
                    }
                    (function, _) => return Err(not_renderable(format!("{function:?} aggregate"))),
                };
                select.push(format!("{rendered} AS c{out}"));
            }
            let inner = render_node(input, params)?;
            let mut sql = format!("SELECT {} FROM ({inner}) AS t", select.join(", "));
            if !group.is_empty() {
                let keys: Vec<String> = group.iter().map(|g| format!("t.c{g}")).collect();
                sql.push_str(&format!(" GROUP BY {}", keys.join(", ")));
            }
            Ok(sql)
        }
        PlanNode::Values { .. } | PlanNode::Modify { .. } | PlanNode::Graph { .. } => {
            Err(not_renderable("values, modify or graph node"))
        }
    }
}

fn column_ref(alias: &str, index: usize) -> String {
    format!("{alias}.c{index}")
}

fn render_expr(
    expr: &Expr,
    resolve: &dyn Fn(usize) -> String,
    fields: &[Field],
    params: &mut Vec<(PolyValue, ColumnType)>,
) -> EngineResult<String> {
    match expr {
        Expr::Column(i) => Ok(resolve(*i)),
        Expr::Literal(PolyValue::Boolean(b)) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Expr::Literal(PolyValue::Null) => Ok("NULL".to_string()),
        Expr::Literal(other) => Err(not_renderable(format!("untyped literal {other}"))),
        Expr::Compare { op, left, right } => {
            let ty = match (left.as_ref(), right.as_ref()) {
                (Expr::Column(i), _) | (_, Expr::Column(i)) => fields
                    .get(*i)
                    .map(|f| f.ty.clone())
                    .ok_or_else(|| not_renderable(format!("column ${i}")))?,
                _ => return Err(not_renderable(format!("comparison {expr} without a column"))),
            };
            if !natively_ordered(&ty) {
                return Err(not_renderable(format!("comparison on {ty}")));
            }
            let l = render_operand(left, &ty, resolve, fields, params)?;
            let r = render_operand(right, &ty, resolve, fields, params)?;
            Ok(format!("({l} {} {r})", sql_operator(*op)))
        }
        Expr::And(items) | Expr::Or(items) => {
            let sep = if matches!(expr, Expr::And(_)) { " AND " } else { " OR " };
            let parts = items
                .iter()
                .map(|e| render_expr(e, resolve, fields, params))
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(sep)))
        }
        Expr::Not(inner) => Ok(format!("(NOT {})", render_expr(inner, resolve, fields, params)?)),
        Expr::IsNull(inner) => Ok(format!("({} IS NULL)", render_expr(inner, resolve, fields, params)?)),
    }
}

fn render_operand(
    expr: &Expr,
    ty: &ColumnType,
    resolve: &dyn Fn(usize) -> String,
    fields: &[Field],
    params: &mut Vec<(PolyValue, ColumnType)>,
) -> EngineResult<String> {
    match expr {
        Expr::Literal(value) if !value.is_null() => {
            params.push((value.clone(), ty.clone()));
            Ok(placeholder(ty))
        }
        other => render_expr(other, resolve, fields, params),
    }
}

fn sql_operator(op: CompareOp) -> &'static str {
    // `=`, `<>` and the orderings are spelled the same in SQL.
    op.symbol()
}

// ==================== Statements ====================

pub fn render_create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

pub fn render_create_table(definition: &TableDefinition) -> EngineResult<String> {
    if definition.columns.is_empty() {
        return Err(EngineError::validation(format!(
            "Cannot create table {}: no columns",
            definition.physical
        )));
    }
    let mut parts: Vec<String> = definition
        .columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), storage_type(ty)))
        .collect();
    if !definition.primary_key.is_empty() {
        let keys: Vec<String> = definition.primary_key.iter().map(|k| quote_ident(k)).collect();
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_table(&definition.physical),
        parts.join(", ")
    ))
}

pub fn render_drop_table(table: &PhysicalTable) -> String {
    format!("DROP TABLE IF EXISTS {}", qualified_table(table))
}

pub fn render_count(table: &PhysicalTable) -> String {
    format!("SELECT COUNT(*) FROM {}", qualified_table(table))
}

/// INSERT with one placeholder per column, in column order.
pub fn render_insert(table: &PhysicalTable, columns: &[ModifyColumn]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.physical)).collect();
    let values: Vec<String> = columns.iter().map(|c| placeholder(&c.ty)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(table),
        names.join(", "),
        values.join(", ")
    )
}

/// UPDATE keyed by the key columns. Placeholders: non-key columns first,
/// then key columns, each group in column order.
pub fn render_update(table: &PhysicalTable, columns: &[ModifyColumn]) -> EngineResult<String> {
    let (keys, values): (Vec<&ModifyColumn>, Vec<&ModifyColumn>) = columns.iter().partition(|c| c.key);
    if keys.is_empty() {
        return Err(EngineError::validation("Cannot generate UPDATE without key columns"));
    }
    if values.is_empty() {
        return Err(EngineError::validation("Cannot generate UPDATE without columns to set"));
    }
    let set: Vec<String> = values
        .iter()
        .map(|c| format!("{} = {}", quote_ident(&c.physical), placeholder(&c.ty)))
        .collect();
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table(table),
        set.join(", "),
        key_predicate(&keys)
    ))
}

pub fn render_delete(table: &PhysicalTable, columns: &[ModifyColumn]) -> EngineResult<String> {
    let keys: Vec<&ModifyColumn> = columns.iter().filter(|c| c.key).collect();
    if keys.is_empty() {
        return Err(EngineError::validation("Cannot generate DELETE without key columns"));
    }
    Ok(format!("DELETE FROM {} WHERE {}", qualified_table(table), key_predicate(&keys)))
}

fn key_predicate(keys: &[&ModifyColumn]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|c| format!("{} = {}", quote_ident(&c.physical), placeholder(&c.ty)))
        .collect();
    parts.join(" AND ")
}
