use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown split: {0}")]
    UnknownSplit(String),

    #[error("manifest {path} has no column {column}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("manifest {path} has an empty {column} value at row {row}")]
    MissingValue {
        path: PathBuf,
        column: String,
        row: usize,
    },

    #[error("error reading manifest {path}: {source}")]
    Polars {
        path: PathBuf,
        #[source]
        source: polars::prelude::PolarsError,
    },
}
