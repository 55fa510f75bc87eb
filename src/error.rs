// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::migrate::anchor::AnchorError;

/// Every failure aborts the whole run; nothing here is recovered per row.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row} has {found} fields, header declares {expected}")]
    RowArity {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{table} is missing required column {header:?}")]
    MissingHeader { table: String, header: String },

    #[error("duplicate join key {key:?} in column {column:?}")]
    DuplicateJoinKey { column: String, key: String },

    #[error("customer {customer:?}: {source}")]
    Anchor {
        customer: String,
        #[source]
        source: AnchorError,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[source] rayon::ThreadPoolBuildError),

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error("failed to read config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, MigrateError>;
