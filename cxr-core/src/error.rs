//! Error types for configuration, datasets, loaders and data modules.
//!
//! Nothing here recovers locally: every failure is wrapped once and handed
//! back to the caller.

use std::path::PathBuf;

use cxr_data::DataError;
use cxr_transforms::TransformError;
use physio_api::FilerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("error reading vocabulary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vocabulary has no {0} token")]
    MissingSpecialToken(&'static str),

    #[error("caption length {0} cannot hold [CLS] and [SEP]")]
    MaxLength(usize),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error("error reading report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("dataset returned no item for index {index}")]
    MissingItem { index: usize },

    #[error("loader worker {worker} stopped before its batches were delivered")]
    WorkerDisconnected { worker: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Error)]
pub enum ImaGenomeError {
    #[error(transparent)]
    Filer(#[from] FilerError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("unknown ImaGenome slice: {0}")]
    UnknownSlice(String),

    #[error("slice {0} was not listed in split_slices")]
    SliceNotLoaded(&'static str),

    #[error("prepare_data must run before requesting the {0} loader")]
    NotPrepared(&'static str),

    #[error("index worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("error caching index {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DataModuleError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    ImaGenome(#[from] ImaGenomeError),

    #[error(transparent)]
    Filer(#[from] FilerError),
}
