//! Error types for the engine.
//!
//! Every failure is classified into one of five categories so callers can
//! react without string-matching:
//! - [`EngineError::Config`]: invalid or unsupported configuration, raised
//!   before any I/O begins
//! - [`EngineError::SourceRead`]: malformed records or I/O failures while
//!   reading the input file
//! - [`EngineError::SinkWrite`]: encode or I/O failures while writing the
//!   output file
//! - [`EngineError::Database`]: connection, query, or insert failures
//! - [`EngineError::Cancelled`]: the run was stopped on request; not a
//!   failure in the usual sense

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Terminal error of a run. The first error wins; later errors observed
/// while draining are discarded.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing/invalid configuration field, unsupported format or dialect,
    /// or a size limit exceeded.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The input file could not be read or decoded.
    #[error("source read error: {message}")]
    SourceRead {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The output file could not be encoded or written.
    #[error("sink write error: {message}")]
    SinkWrite {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Connection, streaming query, or batch insert failure.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The run-scoped cancellation signal fired before completion.
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Configuration error with a plain message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Source read error with a plain message.
    pub fn source_read(message: impl Into<String>) -> Self {
        Self::SourceRead {
            message: message.into(),
            source: None,
        }
    }

    /// Source read error wrapping an underlying cause.
    pub fn source_read_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceRead {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Sink write error with a plain message.
    pub fn sink_write(message: impl Into<String>) -> Self {
        Self::SinkWrite {
            message: message.into(),
            source: None,
        }
    }

    /// Sink write error wrapping an underlying cause.
    pub fn sink_write_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SinkWrite {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Database error with a plain message.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Database error wrapping an underlying cause.
    pub fn database_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is a user-requested stop rather than a failure.
    #[inline]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_visible_in_display() {
        assert!(
            EngineError::config("dsn is required")
                .to_string()
                .starts_with("configuration error:")
        );
        assert!(
            EngineError::source_read("bad row")
                .to_string()
                .starts_with("source read error:")
        );
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::database("boom").is_cancelled());
    }
}
