use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilerError {
    #[error("{what} not found at {path}; download it from PhysioNet first")]
    Missing { what: &'static str, path: PathBuf },

    #[error("unknown ImaGenome slice: {0}")]
    UnknownSlice(String),

    #[error("error loading PhysioNet credentials: {0}")]
    Credentials(#[from] confy::ConfyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
