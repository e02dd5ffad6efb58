//! Format codecs: per-format row readers and writers behind one closed
//! dispatch surface, plus file-format auto-detection.
//!
//! Readers produce an ordered sequence of [`Row`]s after discovering the
//! column set at open; writers consume one. Both are small state machines:
//! unopened → open → streaming → closed. End of input is signalled as
//! `Ok(None)`, never as an error.

pub mod csv;
pub mod jsonl;
pub mod parquet;
pub mod xlsx;

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::value::Row;

use self::csv::{CsvReader, CsvWriter};
use self::jsonl::{JsonlReader, JsonlWriter};
use self::parquet::ParquetWriter;
use self::xlsx::XlsxReader;

/// Supported input (import) formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Tsv,
    Jsonl,
    Xlsx,
}

impl InputFormat {
    /// Parse an explicit (non-`auto`) format name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "jsonl" => Ok(Self::Jsonl),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(EngineError::config(format!(
                "unsupported input format: {other}"
            ))),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Jsonl => "jsonl",
            Self::Xlsx => "xlsx",
        })
    }
}

/// Supported output (export) formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Tsv,
    Jsonl,
    Parquet,
}

impl OutputFormat {
    /// Parse an output format name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "jsonl" => Ok(Self::Jsonl),
            "parquet" => Ok(Self::Parquet),
            other => Err(EngineError::config(format!(
                "unsupported output format: {other}"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Jsonl => "jsonl",
            Self::Parquet => "parquet",
        })
    }
}

// File-signature prefixes checked by the content sniffer.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const OLE2_MAGIC: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

/// Detect the input format of `path` from its extension, falling back to a
/// content sniff of the first 512 bytes.
///
/// Legacy Excel (`.xls`, or an OLE2 signature) and bare JSON files are
/// rejected here with guidance, so no reader is ever constructed for them.
pub fn detect_format(path: impl AsRef<Path>) -> Result<InputFormat> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => return Ok(InputFormat::Csv),
        "tsv" => return Ok(InputFormat::Tsv),
        "jsonl" | "ndjson" => return Ok(InputFormat::Jsonl),
        "xlsx" => return Ok(InputFormat::Xlsx),
        "xls" => {
            return Err(EngineError::config(
                "XLS format is not supported (legacy Excel format); convert to XLSX or CSV",
            ));
        }
        "json" => {
            return Err(EngineError::config(
                "JSON arrays are not supported; use JSONL (newline-delimited JSON) instead",
            ));
        }
        _ => {}
    }

    // Extension was inconclusive: sniff the leading bytes.
    let mut file = File::open(path).map_err(|e| {
        EngineError::source_read_with(format!("open {} to detect format", path.display()), e)
    })?;
    let mut header = [0u8; 512];
    let n = file.read(&mut header).map_err(|e| {
        EngineError::source_read_with(format!("read {} to detect format", path.display()), e)
    })?;
    if n == 0 {
        return Err(EngineError::source_read(format!(
            "cannot detect format of empty file: {}",
            path.display()
        )));
    }

    if header[..n].starts_with(&ZIP_MAGIC) {
        return Ok(InputFormat::Xlsx);
    }
    if header[..n].starts_with(&OLE2_MAGIC) {
        return Err(EngineError::config(
            "XLS format detected (legacy Excel format); convert to XLSX or CSV",
        ));
    }

    // Plain text defaults to CSV.
    Ok(InputFormat::Csv)
}

/// A format-tagged row reader. One variant per supported input format,
/// dispatched through a shared open/next/close surface.
pub enum FormatReader {
    Csv(CsvReader),
    Jsonl(JsonlReader),
    Xlsx(XlsxReader),
}

impl FormatReader {
    /// Open `path` as `format`, discovering the column set.
    pub fn open(format: InputFormat, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match format {
            InputFormat::Csv => Ok(Self::Csv(CsvReader::open(path, b',')?)),
            InputFormat::Tsv => Ok(Self::Csv(CsvReader::open(path, b'\t')?)),
            InputFormat::Jsonl => Ok(Self::Jsonl(JsonlReader::open(path)?)),
            InputFormat::Xlsx => Ok(Self::Xlsx(XlsxReader::open(path)?)),
        }
    }

    /// The column set discovered at open.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Csv(r) => r.columns(),
            Self::Jsonl(r) => r.columns(),
            Self::Xlsx(r) => r.columns(),
        }
    }

    /// The next row, or `Ok(None)` once the input is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        match self {
            Self::Csv(r) => r.next_row(),
            Self::Jsonl(r) => r.next_row(),
            Self::Xlsx(r) => r.next_row(),
        }
    }

    /// Release the underlying source.
    pub fn close(self) {
        match self {
            Self::Csv(r) => r.close(),
            Self::Jsonl(r) => r.close(),
            Self::Xlsx(r) => r.close(),
        }
    }
}

/// A format-tagged row writer. One variant per supported output format.
pub enum FormatWriter {
    Csv(CsvWriter),
    Jsonl(JsonlWriter),
    Parquet(ParquetWriter),
}

impl FormatWriter {
    /// Create `path` as `format` with the given column set. CSV/TSV emit
    /// the header record immediately.
    pub fn open(format: OutputFormat, path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        let path = path.as_ref();
        match format {
            OutputFormat::Csv => Ok(Self::Csv(CsvWriter::open(path, b',', columns)?)),
            OutputFormat::Tsv => Ok(Self::Csv(CsvWriter::open(path, b'\t', columns)?)),
            OutputFormat::Jsonl => Ok(Self::Jsonl(JsonlWriter::open(path, columns)?)),
            OutputFormat::Parquet => Ok(Self::Parquet(ParquetWriter::open(path, columns)?)),
        }
    }

    /// Append one row.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        match self {
            Self::Csv(w) => w.write_row(row),
            Self::Jsonl(w) => w.write_row(row),
            Self::Parquet(w) => w.write_row(row),
        }
    }

    /// Flush buffered output to the file.
    pub fn flush(&mut self) -> Result<()> {
        match self {
            Self::Csv(w) => w.flush(),
            Self::Jsonl(w) => w.flush(),
            Self::Parquet(w) => w.flush(),
        }
    }

    /// Flush any remaining buffered state and close the file. Safe to call
    /// whether or not [`FormatWriter::flush`] ran first.
    pub fn close(self) -> Result<()> {
        match self {
            Self::Csv(w) => w.close(),
            Self::Jsonl(w) => w.close(),
            Self::Parquet(w) => w.close(),
        }
    }
}
