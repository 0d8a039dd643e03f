// SPDX-License-Identifier: Apache-2.0

//! DuckDB Adapter
//!
//! Relational adapter on the native `duckdb` crate. The JDBC type space's
//! native form is the bound parameter itself, so values go straight from
//! the mapping into the statement and back.
//!
//! ## Storage
//!
//! Each canonical type has one DuckDB storage type (see
//! [`sql_generator::storage_type`]). Decimals are kept as their exact text,
//! intervals as a scalar, arrays and maps as canonical JSON. Every
//! placeholder is wrapped in `CAST(? AS T)` so text-bound dates and times
//! land in their typed columns.
//!
//! ## Concurrency Model
//!
//! The `duckdb` crate is synchronous and `Connection` is `!Sync`, so the
//! connection sits behind a `parking_lot::Mutex` shared with every prepared
//! statement. Each executed batch runs in its own transaction.

use std::path::Path;
use std::sync::Arc;

use ::duckdb::{params_from_iter, types::Value, Connection};
use parking_lot::Mutex;

use polyfed_core::{AdapterId, ColumnId, ColumnType, EngineError, EngineResult, PolyValue};

use crate::engine::sql_generator::{self, SqlFragment};
use crate::engine::traits::{AdapterDriver, BoundParameters, BoundStatement, RowCursor};
use crate::engine::types::{AdapterCapabilities, Row, TableDefinition};
use crate::mapping::{Family, JdbcSpace, TypeSpace};
use crate::plan::eval::{self, CoreOnly};
use crate::plan::{Field, ModifyInput, ModifyOp, ModifyTarget, PhysicalTable, Plan, PlanNode};

const FAMILY: Family = Family::Jdbc;

pub struct DuckDbAdapter {
    id: AdapterId,
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbAdapter {
    pub fn open_in_memory(id: AdapterId) -> EngineResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::internal(format!("Failed to open DuckDB: {e}")))?;
        Ok(Self::with_connection(id, conn))
    }

    pub fn open(id: AdapterId, path: &Path) -> EngineResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| EngineError::internal(format!("Failed to open DuckDB at {}: {e}", path.display())))?;
        Ok(Self::with_connection(id, conn))
    }

    fn with_connection(id: AdapterId, conn: Connection) -> Self {
        Self {
            id,
            name: format!("duckdb-{id}"),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn query(&self, fragment: &SqlFragment, fields: &[Field]) -> EngineResult<Vec<Row>> {
        let params = fragment
            .params
            .iter()
            .map(|(value, ty)| JdbcSpace.to_stored(value, ty))
            .collect::<EngineResult<Vec<_>>>()?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&fragment.sql).map_err(|e| classify_error("prepare", e))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| classify_error("query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| classify_error("fetch", e))? {
            let values = fields
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let native = row
                        .get::<_, Value>(i)
                        .map_err(|e| classify_error("read column", e))?;
                    JdbcSpace.from_stored(&native, &field.ty)
                })
                .collect::<EngineResult<Row>>()?;
            out.push(values);
        }
        Ok(out)
    }
}

fn classify_error(context: &str, e: ::duckdb::Error) -> EngineError {
    EngineError::execution_error(format!("DuckDB {context} failed: {e}"))
}

// ==================== AdapterDriver Implementation ====================

impl AdapterDriver for DuckDbAdapter {
    fn adapter_id(&self) -> AdapterId {
        self.id
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> Family {
        FAMILY
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            transactions: true,
            pushdown: true,
            documents: false,
            graphs: false,
            blob_files: false,
        }
    }

    fn can_execute(&self, plan: &Plan) -> bool {
        plan.pushdown_adapter() == Some(self.id) && sql_generator::render_query(plan).is_ok()
    }

    fn create_table(&self, definition: &TableDefinition) -> EngineResult<()> {
        let sql = format!(
            "{};\n{};",
            sql_generator::render_create_schema(&definition.physical.schema),
            sql_generator::render_create_table(definition)?
        );
        self.conn
            .lock()
            .execute_batch(&sql)
            .map_err(|e| classify_error("create table", e))?;
        tracing::debug!(adapter = %self.id, table = %definition.physical, "Created table");
        Ok(())
    }

    fn drop_table(&self, table: &PhysicalTable) -> EngineResult<()> {
        self.conn
            .lock()
            .execute_batch(&sql_generator::render_drop_table(table))
            .map_err(|e| classify_error("drop table", e))
    }

    fn row_count_estimate(&self, table: &PhysicalTable) -> EngineResult<Option<u64>> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(&sql_generator::render_count(table), [], |row| row.get(0))
            .map_err(|e| classify_error("count", e))?;
        Ok(Some(count.max(0) as u64))
    }

    fn cursor(&self, plan: &Plan) -> EngineResult<RowCursor> {
        let fragment = sql_generator::render_query(plan)?;
        let fields = plan.fields();
        let rows = self.query(&fragment, &fields)?;
        Ok(RowCursor::from_rows(fields, rows))
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
        let ModifyTarget::Table(table) = target else {
            return Err(EngineError::not_supported(format!(
                "{} only stores relational tables",
                self.name
            )));
        };

        // Placeholder order: INSERT all columns, UPDATE non-keys then keys,
        // DELETE keys only.
        let (sql, order): (String, Vec<usize>) = match op {
            ModifyOp::Insert => (
                sql_generator::render_insert(table, columns),
                (0..columns.len()).collect(),
            ),
            ModifyOp::Update => {
                let sql = sql_generator::render_update(table, columns)?;
                let values = columns.iter().enumerate().filter(|(_, c)| !c.key).map(|(i, _)| i);
                let keys = columns.iter().enumerate().filter(|(_, c)| c.key).map(|(i, _)| i);
                (sql, values.chain(keys).collect())
            }
            ModifyOp::Delete => (
                sql_generator::render_delete(table, columns)?,
                columns.iter().enumerate().filter(|(_, c)| c.key).map(|(i, _)| i).collect(),
            ),
        };

        let source = match input {
            ModifyInput::Parameters => None,
            ModifyInput::Plan(plan) => Some(plan.as_ref().clone()),
        };

        Ok(Box::new(DuckDbStatement {
            conn: Arc::clone(&self.conn),
            sql,
            order,
            params: BoundParameters::new(columns.clone()),
            source,
        }))
    }
}

struct DuckDbStatement {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    order: Vec<usize>,
    params: BoundParameters,
    /// Values-producing input evaluated at execution instead of bindings
    source: Option<Plan>,
}

impl BoundStatement for DuckDbStatement {
    fn bind(&mut self, column: ColumnId, ty: &ColumnType, values: Vec<PolyValue>) -> EngineResult<()> {
        self.params.bind(column, ty, values)
    }

    fn execute_bound(&mut self) -> EngineResult<u64> {
        let rows = match &self.source {
            Some(plan) => eval::evaluate(plan, &CoreOnly)?,
            None => self.params.rows()?,
        };
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = self.params.columns();

        let conn = self.conn.lock();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| classify_error("transaction", e))?;
        let mut affected = 0u64;
        {
            let mut stmt = tx.prepare_cached(&self.sql).map_err(|e| classify_error("prepare", e))?;
            for row in &rows {
                let values = self
                    .order
                    .iter()
                    .map(|&i| JdbcSpace.to_stored(&row[i], &columns[i].ty))
                    .collect::<EngineResult<Vec<Value>>>()?;
                affected += stmt
                    .execute(params_from_iter(values.iter()))
                    .map_err(|e| classify_error("execute", e))? as u64;
            }
        }
        tx.commit().map_err(|e| classify_error("commit", e))?;
        Ok(affected)
    }

    fn reset_bindings(&mut self) {
        self.params.reset();
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Expr, ModifyColumn, PlannerContext, ScanColumn};
    use polyfed_core::{PolyList, PolyType, TimestampString};

    fn definition() -> TableDefinition {
        TableDefinition {
            physical: PhysicalTable::new("public", "items"),
            columns: vec![
                ("id".into(), PolyType::Integer.into()),
                ("price".into(), PolyType::Decimal.into()),
                ("seen".into(), PolyType::Timestamp.into()),
                ("tags".into(), ColumnType::array(PolyType::Varchar.into())),
            ],
            primary_key: vec!["id".into()],
        }
    }

    fn modify_columns(def: &TableDefinition) -> Vec<ModifyColumn> {
        def.columns
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| ModifyColumn {
                column: ColumnId(i as u64 + 1),
                physical: name.clone(),
                ty: ty.clone(),
                key: name == "id",
            })
            .collect()
    }

    fn scan(ctx: &PlannerContext, def: &TableDefinition) -> Plan {
        ctx.builder().scan(
            AdapterId(1),
            def.physical.clone(),
            def.columns
                .iter()
                .map(|(name, ty)| ScanColumn {
                    physical: name.clone(),
                    field: Field::new(name.clone(), ty.clone()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_insert_and_scan_round_trip() {
        let adapter = DuckDbAdapter::open_in_memory(AdapterId(1)).unwrap();
        let def = definition();
        adapter.create_table(&def).unwrap();

        let ctx = PlannerContext::new();
        let columns = modify_columns(&def);
        let insert = ctx
            .builder()
            .modify(
                AdapterId(1),
                ModifyTarget::Table(def.physical.clone()),
                ModifyOp::Insert,
                columns.clone(),
                ModifyInput::Parameters,
            )
            .unwrap();
        let mut stmt = adapter.prepare(&insert).unwrap();

        let price = PolyValue::decimal("12345678901234567890.125").unwrap();
        let seen = PolyValue::Timestamp(TimestampString::from_millis_since_epoch(1_700_000_000_123));
        let tags = PolyValue::List(PolyList::new(vec![PolyValue::text("a"), PolyValue::Null]));
        stmt.bind(ColumnId(1), &columns[0].ty, vec![PolyValue::Integer(1), PolyValue::Integer(2)]).unwrap();
        stmt.bind(ColumnId(2), &columns[1].ty, vec![price.clone(), PolyValue::Null]).unwrap();
        stmt.bind(ColumnId(3), &columns[2].ty, vec![seen.clone(), PolyValue::Null]).unwrap();
        stmt.bind(ColumnId(4), &columns[3].ty, vec![tags.clone(), PolyValue::Null]).unwrap();
        assert_eq!(stmt.execute_bound().unwrap(), 2);
        stmt.reset_bindings();

        let plan = ctx
            .builder()
            .filter(scan(&ctx, &def), Expr::eq(Expr::col(0), Expr::lit(1)))
            .unwrap();
        assert!(adapter.can_execute(&plan));
        let rows = adapter.cursor(&plan).unwrap().collect_rows().unwrap();
        assert_eq!(rows, vec![vec![PolyValue::Integer(1), price, seen, tags]]);
        assert_eq!(adapter.row_count_estimate(&def.physical).unwrap(), Some(2));
    }

    #[test]
    fn test_update_by_key() {
        let adapter = DuckDbAdapter::open_in_memory(AdapterId(1)).unwrap();
        let def = TableDefinition {
            physical: PhysicalTable::new("s", "t"),
            columns: vec![("id".into(), PolyType::BigInt.into()), ("name".into(), PolyType::Varchar.into())],
            primary_key: vec!["id".into()],
        };
        adapter.create_table(&def).unwrap();
        let ctx = PlannerContext::new();
        let columns = modify_columns(&def);
        let b = ctx.builder();
        let target = ModifyTarget::Table(def.physical.clone());

        let mut insert = adapter
            .prepare(&b.modify(AdapterId(1), target.clone(), ModifyOp::Insert, columns.clone(), ModifyInput::Parameters).unwrap())
            .unwrap();
        insert.bind(ColumnId(1), &columns[0].ty, vec![PolyValue::BigInt(5)]).unwrap();
        insert.bind(ColumnId(2), &columns[1].ty, vec![PolyValue::text("old")]).unwrap();
        insert.execute_bound().unwrap();

        let mut update = adapter
            .prepare(&b.modify(AdapterId(1), target, ModifyOp::Update, columns.clone(), ModifyInput::Parameters).unwrap())
            .unwrap();
        update.bind(ColumnId(2), &columns[1].ty, vec![PolyValue::text("new")]).unwrap();
        update.bind(ColumnId(1), &columns[0].ty, vec![PolyValue::BigInt(5)]).unwrap();
        assert_eq!(update.execute_bound().unwrap(), 1);

        let rows = adapter.cursor(&scan(&ctx, &def)).unwrap().collect_rows().unwrap();
        assert_eq!(rows, vec![vec![PolyValue::BigInt(5), PolyValue::text("new")]]);
    }

    #[test]
    fn test_decimal_filter_falls_back_to_core() {
        let adapter = DuckDbAdapter::open_in_memory(AdapterId(1)).unwrap();
        let def = definition();
        let ctx = PlannerContext::new();
        let plan = ctx
            .builder()
            .filter(scan(&ctx, &def), Expr::eq(Expr::col(1), Expr::lit(1)))
            .unwrap();
        assert!(!adapter.can_execute(&plan));
    }
}
