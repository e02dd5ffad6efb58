//! Parquet writing.
//!
//! The Arrow schema is inferred from the first row: booleans, 64-bit
//! integers, and 64-bit floats keep their type, everything else (including
//! nulls and byte sequences) becomes nullable text. Rows accumulate into
//! bounded record batches that are handed to the Arrow writer as they fill,
//! so memory stays constant regardless of row count.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

/// Rows per record batch handed to the Arrow writer.
const BATCH_ROWS: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Null | Value::Text(_) | Value::Bytes(_) => Self::Text,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            Self::Bool => DataType::Boolean,
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Text => DataType::Utf8,
        }
    }
}

struct Inner {
    writer: ArrowWriter<File>,
    schema: Arc<Schema>,
    kinds: Vec<ColumnKind>,
}

/// Buffering Parquet writer.
pub struct ParquetWriter {
    path: PathBuf,
    columns: Vec<String>,
    /// Created on the first row; a zero-row close still writes the
    /// (all-text) schema so the output is a valid Parquet file.
    inner: Option<Inner>,
    file: Option<File>,
    pending: Vec<Row>,
}

impl ParquetWriter {
    /// Create `path` for the given column set.
    pub fn open(path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            EngineError::sink_write_with(format!("create {}", path.display()), e)
        })?;
        Ok(Self {
            path,
            columns: columns.to_vec(),
            inner: None,
            file: Some(file),
            pending: Vec::with_capacity(BATCH_ROWS),
        })
    }

    /// Append one row, inferring the schema from the first.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if self.inner.is_none() {
            let kinds: Vec<ColumnKind> = (0..self.columns.len())
                .map(|i| row.get(i).map(ColumnKind::infer).unwrap_or(ColumnKind::Text))
                .collect();
            self.open_writer(kinds)?;
        }

        self.pending.push(row.clone());
        if self.pending.len() >= BATCH_ROWS {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Hand accumulated rows to the Arrow writer and finish the current
    /// row group.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_pending()?;
        if let Some(inner) = self.inner.as_mut() {
            inner.writer.flush().map_err(|e| {
                EngineError::sink_write_with(format!("flush {}", self.path.display()), e)
            })?;
        }
        Ok(())
    }

    /// Flush remaining rows and write the file footer.
    pub fn close(mut self) -> Result<()> {
        if self.inner.is_none() {
            // No rows were ever written; emit a schema-only file.
            let kinds = vec![ColumnKind::Text; self.columns.len()];
            self.open_writer(kinds)?;
        }
        self.flush_pending()?;
        let inner = self.inner.take().expect("writer opened above");
        inner.writer.close().map_err(|e| {
            EngineError::sink_write_with(format!("finish {}", self.path.display()), e)
        })?;
        Ok(())
    }

    fn open_writer(&mut self, kinds: Vec<ColumnKind>) -> Result<()> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| Field::new(name, kind.data_type(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let file = self.file.take().expect("file consumed once");
        let props = WriterProperties::builder().build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(|e| {
            EngineError::sink_write_with(format!("open parquet writer for {}", self.path.display()), e)
        })?;

        self.inner = Some(Inner {
            writer,
            schema,
            kinds,
        });
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let inner = self.inner.as_mut().expect("writer opened before rows");

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(inner.kinds.len());
        for (col, kind) in inner.kinds.iter().enumerate() {
            arrays.push(build_array(
                &self.columns[col],
                *kind,
                self.pending.iter().map(|row| row.get(col)),
                self.pending.len(),
            )?);
        }

        let batch = RecordBatch::try_new(inner.schema.clone(), arrays).map_err(|e| {
            EngineError::sink_write_with(format!("assemble batch for {}", self.path.display()), e)
        })?;
        inner.writer.write(&batch).map_err(|e| {
            EngineError::sink_write_with(format!("write batch to {}", self.path.display()), e)
        })?;

        self.pending.clear();
        Ok(())
    }
}

fn build_array<'a>(
    column: &str,
    kind: ColumnKind,
    values: impl Iterator<Item = Option<&'a Value>>,
    len: usize,
) -> Result<ArrayRef> {
    let mismatch = |value: &Value| {
        EngineError::sink_write(format!(
            "column {column} was inferred as {kind:?} but got {value:?}"
        ))
    };

    match kind {
        ColumnKind::Bool => {
            let mut b = BooleanBuilder::with_capacity(len);
            for v in values {
                match v.unwrap_or(&Value::Null) {
                    Value::Null => b.append_null(),
                    Value::Bool(x) => b.append_value(*x),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        ColumnKind::Int => {
            let mut b = Int64Builder::with_capacity(len);
            for v in values {
                match v.unwrap_or(&Value::Null) {
                    Value::Null => b.append_null(),
                    Value::Int(x) => b.append_value(*x),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        ColumnKind::Float => {
            let mut b = Float64Builder::with_capacity(len);
            for v in values {
                match v.unwrap_or(&Value::Null) {
                    Value::Null => b.append_null(),
                    Value::Float(x) => b.append_value(*x),
                    // Integers widen losslessly enough for a column that
                    // already holds floats.
                    Value::Int(x) => b.append_value(*x as f64),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        ColumnKind::Text => {
            let mut b = StringBuilder::new();
            for v in values {
                match v.unwrap_or(&Value::Null) {
                    Value::Null => b.append_null(),
                    other => b.append_value(other.render_text()),
                }
            }
            Ok(Arc::new(b.finish()))
        }
    }
}
