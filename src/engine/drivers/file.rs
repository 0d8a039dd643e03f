// SPDX-License-Identifier: Apache-2.0

//! File Adapter
//!
//! Stores each table as `<root>/<schema>/<table>.csv` with a header row and
//! a `<table>.schema.json` sidecar holding its definition. Multimedia
//! values are written to `<table>.blobs/<uuid>.bin` and the cell keeps a
//! reference to the side file.
//!
//! Cell encoding: `\N` is null, `\B<file>` is a blob reference, and text
//! starting with a backslash gets one more backslash in front.
//!
//! Every write rewrites the table through a temporary file followed by a
//! rename, so a failed batch leaves the previous contents in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use polyfed_core::{AdapterId, ColumnId, ColumnType, Conversion, EngineError, EngineResult, PolyValue};

use crate::engine::traits::{AdapterDriver, BoundParameters, BoundStatement, RowCursor};
use crate::engine::types::{AdapterCapabilities, Row, TableDefinition};
use crate::mapping::{canonical_bytes, FileCell, FileSpace, Family, TypeSpace};
use crate::plan::eval::{self, CoreOnly, SubplanSource};
use crate::plan::{ModifyInput, ModifyOp, ModifyTarget, PhysicalTable, Plan, PlanNode};

const NULL_CELL: &str = "\\N";
const BLOB_PREFIX: &str = "\\B";

fn io_error(context: &str, path: &Path, e: impl std::fmt::Display) -> EngineError {
    EngineError::execution_error(format!("File store {context} failed for {}: {e}", path.display()))
}

/// Paths making up one stored table.
#[derive(Debug, Clone)]
struct TableFiles {
    dir: PathBuf,
    data: PathBuf,
    schema: PathBuf,
    blobs: PathBuf,
}

impl TableFiles {
    fn new(root: &Path, table: &PhysicalTable) -> Self {
        let dir = root.join(&table.schema);
        Self {
            data: dir.join(format!("{}.csv", table.table)),
            schema: dir.join(format!("{}.schema.json", table.table)),
            blobs: dir.join(format!("{}.blobs", table.table)),
            dir,
        }
    }

    fn exists(&self) -> bool {
        self.schema.exists()
    }

    fn definition(&self) -> EngineResult<TableDefinition> {
        let text = fs::read_to_string(&self.schema).map_err(|e| io_error("read schema", &self.schema, e))?;
        serde_json::from_str(&text).map_err(|e| io_error("parse schema", &self.schema, e))
    }

    fn read_cells(&self, width: usize) -> EngineResult<Vec<Vec<FileCell>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.data)
            .map_err(|e| io_error("open", &self.data, e))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| io_error("read", &self.data, e))?;
            if record.len() != width {
                return Err(io_error(
                    "read",
                    &self.data,
                    format!("record has {} cells, expected {width}", record.len()),
                ));
            }
            rows.push(record.iter().map(|text| self.decode_cell(text)).collect());
        }
        Ok(rows)
    }

    fn write_cells(&self, definition: &TableDefinition, rows: &[Vec<FileCell>]) -> EngineResult<()> {
        let tmp = self.data.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp).map_err(|e| io_error("create", &tmp, e))?;
            writer
                .write_record(definition.columns.iter().map(|(name, _)| name.as_str()))
                .map_err(|e| io_error("write", &tmp, e))?;
            for row in rows {
                writer
                    .write_record(row.iter().map(|cell| self.encode_cell(cell)))
                    .map_err(|e| io_error("write", &tmp, e))?;
            }
            writer.flush().map_err(|e| io_error("flush", &tmp, e))?;
        }
        fs::rename(&tmp, &self.data).map_err(|e| io_error("rename", &self.data, e))
    }

    fn encode_cell(&self, cell: &FileCell) -> String {
        match cell {
            FileCell::Null => NULL_CELL.to_string(),
            FileCell::Blob(path) => {
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                format!("{BLOB_PREFIX}{name}")
            }
            FileCell::Text(text) if text.starts_with('\\') => format!("\\{text}"),
            FileCell::Text(text) => text.clone(),
        }
    }

    fn decode_cell(&self, text: &str) -> FileCell {
        if text == NULL_CELL {
            FileCell::Null
        } else if let Some(name) = text.strip_prefix(BLOB_PREFIX) {
            FileCell::Blob(self.blobs.join(name))
        } else if let Some(escaped) = text.strip_prefix('\\') {
            FileCell::Text(escaped.to_string())
        } else {
            FileCell::Text(text.to_string())
        }
    }

    /// Encodes one value, spilling multimedia bytes to a side file.
    fn encode_value(&self, value: &PolyValue, ty: &ColumnType) -> EngineResult<FileCell> {
        if value.is_null() || ty.conversion() != Conversion::Multimedia {
            return FileSpace.to_stored(value, ty);
        }
        let bytes = canonical_bytes(value, ty, Family::File)?;
        fs::create_dir_all(&self.blobs).map_err(|e| io_error("create blob dir", &self.blobs, e))?;
        let path = self.blobs.join(format!("{}.bin", Uuid::new_v4()));
        fs::write(&path, &bytes.0).map_err(|e| io_error("write blob", &path, e))?;
        Ok(FileCell::Blob(path))
    }

    fn remove_blobs(&self, row: &[FileCell]) {
        for cell in row {
            if let FileCell::Blob(path) = cell {
                if let Err(e) = fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove blob file");
                }
            }
        }
    }
}

fn column_index(definition: &TableDefinition, physical: &str) -> EngineResult<usize> {
    definition
        .columns
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(physical))
        .ok_or_else(|| EngineError::validation(format!("No column '{physical}' in {}", definition.physical)))
}

pub struct FileAdapter {
    id: AdapterId,
    name: String,
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileAdapter {
    pub fn new(id: AdapterId, root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error("create root", &root, e))?;
        Ok(Self {
            id,
            name: format!("file-{id}"),
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files(&self, table: &PhysicalTable) -> EngineResult<TableFiles> {
        let files = TableFiles::new(&self.root, table);
        if !files.exists() {
            return Err(EngineError::validation(format!("Table {table} does not exist")));
        }
        Ok(files)
    }
}

struct FileScanSource<'a> {
    adapter: &'a FileAdapter,
}

impl SubplanSource for FileScanSource<'_> {
    fn try_execute(&self, plan: &Plan) -> EngineResult<Option<Vec<Row>>> {
        let PlanNode::Scan { adapter, table, columns } = &plan.node else {
            return Ok(None);
        };
        if *adapter != self.adapter.id {
            return Err(EngineError::validation(format!(
                "Scan for adapter {adapter} reached adapter {}",
                self.adapter.id
            )));
        }
        let files = self.adapter.files(table)?;
        let definition = files.definition()?;
        let projection = columns
            .iter()
            .map(|c| {
                let index = column_index(&definition, &c.physical)?;
                Ok((index, definition.columns[index].1.clone()))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        files
            .read_cells(definition.columns.len())?
            .iter()
            .map(|row| {
                projection
                    .iter()
                    .map(|(i, ty)| FileSpace.from_stored(&row[*i], ty))
                    .collect::<EngineResult<Row>>()
            })
            .collect::<EngineResult<Vec<_>>>()
            .map(Some)
    }
}

impl AdapterDriver for FileAdapter {
    fn adapter_id(&self) -> AdapterId {
        self.id
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> Family {
        Family::File
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            transactions: true,
            pushdown: true,
            documents: false,
            graphs: false,
            blob_files: true,
        }
    }

    fn create_table(&self, definition: &TableDefinition) -> EngineResult<()> {
        let _guard = self.write_lock.lock();
        let files = TableFiles::new(&self.root, &definition.physical);
        if files.exists() {
            return if files.definition()? == *definition {
                Ok(())
            } else {
                Err(EngineError::validation(format!(
                    "Table {} already exists with a different layout",
                    definition.physical
                )))
            };
        }
        fs::create_dir_all(&files.dir).map_err(|e| io_error("create schema dir", &files.dir, e))?;
        let json = serde_json::to_string_pretty(definition)
            .map_err(|e| EngineError::internal(format!("Failed to serialize table definition: {e}")))?;
        fs::write(&files.schema, json).map_err(|e| io_error("write schema", &files.schema, e))?;
        files.write_cells(definition, &[])?;
        tracing::debug!(adapter = %self.id, table = %definition.physical, "Created table");
        Ok(())
    }

    fn drop_table(&self, table: &PhysicalTable) -> EngineResult<()> {
        let _guard = self.write_lock.lock();
        let files = TableFiles::new(&self.root, table);
        for path in [&files.data, &files.schema] {
            if path.exists() {
                fs::remove_file(path).map_err(|e| io_error("remove", path, e))?;
            }
        }
        if files.blobs.exists() {
            fs::remove_dir_all(&files.blobs).map_err(|e| io_error("remove", &files.blobs, e))?;
        }
        Ok(())
    }

    fn row_count_estimate(&self, table: &PhysicalTable) -> EngineResult<Option<u64>> {
        let files = TableFiles::new(&self.root, table);
        if !files.exists() {
            return Ok(None);
        }
        let width = files.definition()?.columns.len();
        Ok(Some(files.read_cells(width)?.len() as u64))
    }

    fn cursor(&self, plan: &Plan) -> EngineResult<RowCursor> {
        let rows = eval::evaluate(plan, &FileScanSource { adapter: self })?;
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
        let ModifyTarget::Table(table) = target else {
            return Err(EngineError::not_supported(format!("{} only stores tables", self.name)));
        };
        Ok(Box::new(FileStatement {
            files: self.files(table)?,
            write_lock: Arc::clone(&self.write_lock),
            op: *op,
            params: BoundParameters::new(columns.clone()),
            source: match input {
                ModifyInput::Parameters => None,
                ModifyInput::Plan(plan) => Some(plan.as_ref().clone()),
            },
        }))
    }
}

struct FileStatement {
    files: TableFiles,
    write_lock: Arc<Mutex<()>>,
    op: ModifyOp,
    params: BoundParameters,
    source: Option<Plan>,
}

impl FileStatement {
    fn apply(&self, rows: Vec<Row>) -> EngineResult<u64> {
        let _guard = self.write_lock.lock();
        let definition = self.files.definition()?;
        let columns = self.params.columns();
        let indexes = columns
            .iter()
            .map(|c| column_index(&definition, &c.physical))
            .collect::<EngineResult<Vec<_>>>()?;
        let keys = definition
            .primary_key
            .iter()
            .map(|k| column_index(&definition, k))
            .collect::<EngineResult<Vec<_>>>()?;
        let mut stored = self.files.read_cells(definition.columns.len())?;

        let affected = match self.op {
            ModifyOp::Insert => {
                let mut incoming = Vec::with_capacity(rows.len());
                for row in &rows {
                    let mut cells = vec![FileCell::Null; definition.columns.len()];
                    for ((value, c), &i) in row.iter().zip(columns).zip(&indexes) {
                        cells[i] = self.files.encode_value(value, &c.ty)?;
                    }
                    let clash = |other: &Vec<FileCell>| !keys.is_empty() && keys.iter().all(|&k| other[k] == cells[k]);
                    if stored.iter().any(clash) || incoming.iter().any(clash) {
                        incoming.iter().for_each(|r: &Vec<FileCell>| self.files.remove_blobs(r));
                        return Err(EngineError::execution_error(format!(
                            "Duplicate primary key in {}",
                            definition.physical
                        )));
                    }
                    incoming.push(cells);
                }
                let count = incoming.len() as u64;
                stored.extend(incoming);
                count
            }
            ModifyOp::Update | ModifyOp::Delete => {
                let key_positions: Vec<usize> = columns.iter().enumerate().filter(|(_, c)| c.key).map(|(p, _)| p).collect();
                let mut affected = 0u64;
                for row in &rows {
                    let probe = key_positions
                        .iter()
                        .map(|&p| FileSpace.to_stored(&row[p], &columns[p].ty).map(|cell| (indexes[p], cell)))
                        .collect::<EngineResult<Vec<_>>>()?;
                    let matches = |cells: &[FileCell]| probe.iter().all(|(i, cell)| cells[*i] == *cell);
                    if self.op == ModifyOp::Delete {
                        let (removed, kept): (Vec<_>, Vec<_>) = stored.into_iter().partition(|cells| matches(cells));
                        removed.iter().for_each(|r| self.files.remove_blobs(r));
                        affected += removed.len() as u64;
                        stored = kept;
                        continue;
                    }
                    for cells in stored.iter_mut().filter(|cells| matches(cells)) {
                        for (p, c) in columns.iter().enumerate() {
                            if !c.key {
                                cells[indexes[p]] = self.files.encode_value(&row[p], &c.ty)?;
                            }
                        }
                        affected += 1;
                    }
                }
                affected
            }
        };
        self.files.write_cells(&definition, &stored)?;
        Ok(affected)
    }
}

impl BoundStatement for FileStatement {
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
        self.apply(rows)
    }

    fn reset_bindings(&mut self) {
        self.params.reset();
    }
}
