use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile {name}: {reason}")]
    Profile { name: String, reason: String },

    #[error("profile JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad pattern `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("bad selector `{css}`: {reason}")]
    Selector { css: String, reason: String },

    #[error("export to {path:?} failed: {reason}")]
    Export { path: PathBuf, reason: String },

    #[error("prior table {path:?}: {reason}")]
    Prior { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, LeadError>;

impl LeadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LeadError::Io {
            path: path.into(),
            source,
        }
    }
}
