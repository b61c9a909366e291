use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure, timeout or non-success status for a URL.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Malformed HTML/CSV content or an unparseable cell.
    #[error("parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    /// A table is missing columns the next step depends on.
    #[error("schema mismatch in {origin}: missing columns {missing:?}")]
    SchemaMismatch { origin: String, missing: Vec<String> },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown output mode {0:?}, expected \"csv\" or \"table\"")]
    UnknownOutputMode(String),

    #[error("invalid column mapping: {0}")]
    Mapping(String),

    #[error("task graph error: {0}")]
    TaskGraph(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn fetch(url: &str, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
