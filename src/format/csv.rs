//! CSV/TSV reading and writing.
//!
//! One reader/writer pair covers both formats; the delimiter is fixed per
//! instantiation. Reading is lenient about quoting and surrounding
//! whitespace, and records shorter than the header are padded with nulls.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

/// Streaming CSV/TSV reader. The first physical record is the header.
#[derive(Debug)]
pub struct CsvReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    record: csv::StringRecord,
    columns: Vec<String>,
}

impl CsvReader {
    /// Open `path` and read the header record.
    pub fn open(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            EngineError::source_read_with(format!("open {}", path.display()), e)
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = reader.headers().map_err(|e| {
            EngineError::source_read_with(format!("read header of {}", path.display()), e)
        })?;
        if header.is_empty() || (header.len() == 1 && header[0].is_empty()) {
            return Err(EngineError::source_read(format!(
                "empty file or missing header: {}",
                path.display()
            )));
        }
        let columns: Vec<String> = header.iter().map(str::to_string).collect();

        Ok(Self {
            path,
            reader,
            record: csv::StringRecord::new(),
            columns,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read the next record, padded with nulls up to the column count.
    /// A record with more fields than the header is a read error.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let more = self.reader.read_record(&mut self.record).map_err(|e| {
            EngineError::source_read_with(format!("read record in {}", self.path.display()), e)
        })?;
        if !more {
            return Ok(None);
        }

        if self.record.len() > self.columns.len() {
            let line = self
                .record
                .position()
                .map(|p| p.line())
                .unwrap_or_default();
            return Err(EngineError::source_read(format!(
                "record on line {line} of {} has {} fields, expected {}",
                self.path.display(),
                self.record.len(),
                self.columns.len()
            )));
        }

        let mut row = Row::with_capacity(self.columns.len());
        for i in 0..self.columns.len() {
            match self.record.get(i) {
                Some(field) => row.push(Value::Text(field.to_string())),
                None => row.push(Value::Null),
            }
        }
        Ok(Some(row))
    }

    /// Release the file handle.
    pub fn close(self) {}
}

/// Buffered CSV/TSV writer. The header record is emitted at open.
pub struct CsvWriter {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
}

impl CsvWriter {
    /// Create `path` and write the header record from `columns`.
    pub fn open(path: impl AsRef<Path>, delimiter: u8, columns: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            EngineError::sink_write_with(format!("create {}", path.display()), e)
        })?;
        let buf = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(buf);
        writer.write_record(columns).map_err(|e| {
            EngineError::sink_write_with(format!("write header to {}", path.display()), e)
        })?;

        Ok(Self { path, writer })
    }

    /// Append one record, rendering each value as text.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.writer
            .write_record(row.iter().map(Value::render_text))
            .map_err(|e| {
                EngineError::sink_write_with(format!("write record to {}", self.path.display()), e)
            })
    }

    /// Flush buffered records through to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| {
            EngineError::sink_write_with(format!("flush {}", self.path.display()), e)
        })
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        let buf = self.writer.into_inner().map_err(|e| {
            EngineError::sink_write(format!("finish {}: {e}", self.path.display()))
        })?;
        buf.into_inner()
            .map_err(|e| EngineError::sink_write(format!("finish {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn short_records_are_padded() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pad.csv");
        let mut f = File::create(&path)?;
        writeln!(f, "a,b,c")?;
        writeln!(f, "1,2")?;
        drop(f);

        let mut reader = CsvReader::open(&path, b',')?;
        let row = reader.next_row()?.unwrap();
        assert_eq!(
            row,
            vec![
                Value::Text("1".into()),
                Value::Text("2".into()),
                Value::Null
            ]
        );
        Ok(())
    }
}
