//! Run configuration: one JSON document read at startup, validated and
//! normalized into an immutable struct the orchestrators consume.

use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::format::{self, InputFormat, OutputFormat};

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;
/// Upper bound on the configured batch size.
pub const MAX_BATCH_SIZE: usize = 50_000;
/// Default informational progress interval, in rows.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100_000;

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Import,
    Export,
}

/// Complete configuration for one import or export run.
///
/// Deserialize, then call [`Config::validate`] and [`Config::normalize`]
/// before handing the value to an orchestrator. After normalization the
/// struct is treated as immutable.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mode: Mode,
    /// Database connection string.
    pub dsn: String,
    /// Rows per batch; 0 selects the default.
    #[serde(default)]
    pub batch_size: usize,
    /// Worker count; 0 resolves to the logical CPU count.
    #[serde(default)]
    pub workers: usize,
    /// Informational progress interval in rows.
    #[serde(default)]
    pub progress_every: u64,

    // Import-only fields.
    #[serde(default)]
    pub input_file: String,
    /// `"auto"` or an explicit format name.
    #[serde(default)]
    pub input_format: String,
    #[serde(default)]
    pub table: String,

    // Export-only fields.
    #[serde(default)]
    pub output_file: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub query: String,
}

impl Config {
    /// Check required fields and ranges, applying defaults where the field
    /// was omitted. Fails with a [`EngineError::Config`] before any I/O.
    pub fn validate(&mut self) -> Result<()> {
        if self.dsn.is_empty() {
            return Err(EngineError::config("dsn is required"));
        }

        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(EngineError::config(format!(
                "batch_size too large (max {MAX_BATCH_SIZE}): {}",
                self.batch_size
            )));
        }

        if self.progress_every == 0 {
            self.progress_every = DEFAULT_PROGRESS_EVERY;
        }

        match self.mode {
            Mode::Import => self.validate_import(),
            Mode::Export => self.validate_export(),
        }
    }

    fn validate_import(&mut self) -> Result<()> {
        if self.input_file.is_empty() {
            return Err(EngineError::config("input_file is required for import mode"));
        }
        if !std::path::Path::new(&self.input_file).exists() {
            return Err(EngineError::config(format!(
                "input file does not exist: {}",
                self.input_file
            )));
        }
        if self.table.is_empty() {
            return Err(EngineError::config("table is required for import mode"));
        }

        if self.input_format.is_empty() {
            self.input_format = "auto".to_string();
        }
        match self.input_format.as_str() {
            "auto" | "csv" | "tsv" | "jsonl" | "xlsx" => Ok(()),
            other => Err(EngineError::config(format!(
                "invalid input_format: {other} (must be one of: auto, csv, tsv, jsonl, xlsx)"
            ))),
        }
    }

    fn validate_export(&self) -> Result<()> {
        if self.output_file.is_empty() {
            return Err(EngineError::config("output_file is required for export mode"));
        }
        if self.query.is_empty() {
            return Err(EngineError::config("query is required for export mode"));
        }
        match self.output_format.as_str() {
            "" => Err(EngineError::config("output_format is required for export mode")),
            "csv" | "tsv" | "jsonl" | "parquet" => Ok(()),
            other => Err(EngineError::config(format!(
                "invalid output_format: {other} (must be one of: csv, tsv, jsonl, parquet)"
            ))),
        }
    }

    /// Resolve `workers = 0` to the logical CPU count and auto-detect the
    /// input format when it was left as `"auto"`.
    pub fn normalize(&mut self) -> Result<()> {
        if self.workers == 0 {
            self.workers = num_cpus::get();
        }

        if self.mode == Mode::Import && self.input_format == "auto" {
            let detected = format::detect_format(&self.input_file)?;
            log::info!("auto-detected format: {detected}");
            self.input_format = detected.to_string();
        }

        Ok(())
    }

    /// The resolved input format tag. Call after [`Config::normalize`].
    pub fn input_format(&self) -> Result<InputFormat> {
        InputFormat::parse(&self.input_format)
    }

    /// The resolved output format tag.
    pub fn output_format(&self) -> Result<OutputFormat> {
        OutputFormat::parse(&self.output_format)
    }
}
