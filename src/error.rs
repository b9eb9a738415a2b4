use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file {path:?}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read zip archive {path:?}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no file matching {pattern} for dataset {identifier}")]
    MissingDatasetFile { identifier: String, pattern: String },

    #[error("{} files match {pattern} for dataset {identifier}: {matches:?}", .matches.len())]
    AmbiguousDatasetFile {
        identifier: String,
        pattern: String,
        matches: Vec<PathBuf>,
    },

    #[error("{path:?} has no header row")]
    NoHeader { path: PathBuf },

    #[error("failed to parse {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("database error while {action}")]
    Database {
        action: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn db(action: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let action = action.into();
        move |source| PipelineError::Database { action, source }
    }
}
