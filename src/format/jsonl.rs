//! JSONL (newline-delimited JSON) reading and writing.
//!
//! Columns are the key set of the first decoded line, in that object's own
//! insertion order. Every line decodes independently and is re-projected
//! onto the fixed column order: absent keys become null, extra keys are
//! ignored. Blank lines are skipped; any other unparsable line is fatal.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use serde_json::Map;

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

type JsonObject = Map<String, serde_json::Value>;

/// Streaming JSONL reader.
#[derive(Debug)]
pub struct JsonlReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: u64,
    columns: Vec<String>,
    /// First object, decoded during open and replayed as the first row.
    pending: Option<JsonObject>,
}

impl JsonlReader {
    /// Open `path` and decode the first line to establish the column set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            EngineError::source_read_with(format!("open {}", path.display()), e)
        })?;
        let mut lines = BufReader::new(file).lines();

        // Scan to the first non-blank line.
        let mut line_no: u64 = 0;
        let first = loop {
            line_no += 1;
            match lines.next() {
                None => {
                    return Err(EngineError::source_read(format!(
                        "empty file: {}",
                        path.display()
                    )));
                }
                Some(line) => {
                    let line = line.map_err(|e| {
                        EngineError::source_read_with(
                            format!("read line {line_no} of {}", path.display()),
                            e,
                        )
                    })?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
            }
        };

        let first_obj = parse_object(&first, line_no, &path)?;
        let columns: Vec<String> = first_obj.keys().cloned().collect();

        Ok(Self {
            path,
            lines,
            line_no,
            columns,
            pending: Some(first_obj),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Decode the next line and project it onto the column set.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(obj) = self.pending.take() {
            return Ok(Some(self.project(&obj)));
        }

        loop {
            self.line_no += 1;
            match self.lines.next() {
                None => return Ok(None),
                Some(line) => {
                    let line = line.map_err(|e| {
                        EngineError::source_read_with(
                            format!("read line {} of {}", self.line_no, self.path.display()),
                            e,
                        )
                    })?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let obj = parse_object(&line, self.line_no, &self.path)?;
                    return Ok(Some(self.project(&obj)));
                }
            }
        }
    }

    fn project(&self, obj: &JsonObject) -> Row {
        self.columns
            .iter()
            .map(|col| obj.get(col).map(Value::from_json).unwrap_or(Value::Null))
            .collect()
    }

    /// Release the file handle.
    pub fn close(self) {}
}

fn parse_object(line: &str, line_no: u64, path: &Path) -> Result<JsonObject> {
    serde_json::from_str::<JsonObject>(line).map_err(|e| {
        EngineError::source_read_with(
            format!("invalid JSON on line {line_no} of {}", path.display()),
            e,
        )
    })
}

/// Buffered JSONL writer: one compact JSON object per line.
pub struct JsonlWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    columns: Vec<String>,
}

impl JsonlWriter {
    /// Create `path`. No header line is written; the column names key every
    /// emitted object instead.
    pub fn open(path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            EngineError::sink_write_with(format!("create {}", path.display()), e)
        })?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
            columns: columns.to_vec(),
        })
    }

    /// Append one row as a JSON object keyed by column name.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let mut obj = JsonObject::with_capacity(self.columns.len());
        for (i, col) in self.columns.iter().enumerate() {
            let value = row
                .get(i)
                .map(Value::to_json)
                .unwrap_or(serde_json::Value::Null);
            obj.insert(col.clone(), value);
        }

        serde_json::to_writer(&mut self.writer, &obj).map_err(|e| {
            EngineError::sink_write_with(format!("encode row for {}", self.path.display()), e)
        })?;
        self.writer.write_all(b"\n").map_err(|e| {
            EngineError::sink_write_with(format!("write to {}", self.path.display()), e)
        })
    }

    /// Flush buffered lines to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| {
            EngineError::sink_write_with(format!("flush {}", self.path.display()), e)
        })
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}
