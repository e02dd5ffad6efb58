//! XLSX reading.
//!
//! The first row of the first sheet is the header. A hard file-size ceiling
//! is enforced before the archive is opened: XLSX is a compressed container,
//! so decompressed worksheet data cannot be bounded any other way.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Range, Reader, Xlsx};

use crate::error::{EngineError, Result};
use crate::value::{Row, Value};

/// Maximum allowed XLSX file size, in bytes.
pub const MAX_XLSX_BYTES: u64 = 100 * 1024 * 1024;

/// Row-by-row XLSX reader over the first worksheet.
#[derive(Debug)]
pub struct XlsxReader {
    range: Range<Data>,
    columns: Vec<String>,
    next_row: usize,
    height: usize,
}

impl XlsxReader {
    /// Open `path`, enforcing the size ceiling, and read the header row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_size(&path, MAX_XLSX_BYTES)?;

        let mut workbook: Xlsx<BufReader<File>> = open_workbook(&path).map_err(|e| {
            EngineError::source_read_with(format!("open XLSX file {}", path.display()), e)
        })?;

        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names.first().cloned().ok_or_else(|| {
            EngineError::source_read(format!("no sheets found in {}", path.display()))
        })?;
        log::info!("reading sheet: {sheet_name}");

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                EngineError::source_read(format!("no sheets found in {}", path.display()))
            })?
            .map_err(|e| {
                EngineError::source_read_with(
                    format!("read sheet {sheet_name} of {}", path.display()),
                    e,
                )
            })?;

        let height = range.height();
        if height == 0 || range.width() == 0 {
            return Err(EngineError::source_read(format!(
                "empty sheet in {}",
                path.display()
            )));
        }

        let columns: Vec<String> = (0..range.width())
            .map(|c| header_text(range.get((0, c))))
            .collect();

        Ok(Self {
            range,
            columns,
            next_row: 1,
            height,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The next data row, padded with nulls up to the column count.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.next_row >= self.height {
            return Ok(None);
        }
        let r = self.next_row;
        self.next_row += 1;

        let row = (0..self.columns.len())
            .map(|c| self.range.get((r, c)).map(cell_value).unwrap_or(Value::Null))
            .collect();
        Ok(Some(row))
    }

    /// Release the worksheet data.
    pub fn close(self) {}
}

fn check_size(path: &Path, limit: u64) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        EngineError::source_read_with(format!("stat {}", path.display()), e)
    })?;
    if meta.len() >= limit {
        return Err(EngineError::config(format!(
            "XLSX file too large: {} bytes (max {limit} bytes); convert to CSV for large files",
            meta.len()
        )));
    }
    Ok(())
}

fn header_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => {
            // Spreadsheets store most numbers as floats; surface whole
            // numbers in range as integers.
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::Int(*f as i64)
            } else {
                Value::Float(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::Text(naive.to_string()),
            None => Value::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Value::Text(s.clone()),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_ceiling_rejects_before_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("big.xlsx");
        let file = File::create(&path)?;
        file.set_len(64)?;

        let err = check_size(&path, 64).unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(check_size(&path, 65).is_ok());
        Ok(())
    }

    #[test]
    fn cell_conversion_covers_the_closed_set() {
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(cell_value(&Data::Bool(true)), Value::Bool(true));
        assert_eq!(cell_value(&Data::Float(3.0)), Value::Int(3));
        assert_eq!(cell_value(&Data::Float(3.5)), Value::Float(3.5));
        assert_eq!(
            cell_value(&Data::String("x".into())),
            Value::Text("x".into())
        );
    }
}
