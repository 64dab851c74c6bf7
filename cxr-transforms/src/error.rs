use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Normalization method not implemented: {0}")]
    UnknownNorm(String),

    #[error("image buffer holds {actual} values, shape {shape:?} needs {expected}")]
    Shape {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("image size must be at least 1 pixel")]
    ZeroImageSize,

    #[error("error reading image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
