mod error;
mod io;
mod ops;
mod pipeline;
mod tensor;

pub use error::TransformError;
pub use io::{read_xray, Letterbox};
pub use ops::{CenterCrop, ColorJitter, Normalize, RandomAffine, RandomCrop, RandomHorizontalFlip};
pub use pipeline::{AffineConfig, ColorJitterConfig, CropConfig, Pipeline, Transform, TransformConfig};
pub use tensor::ImageTensor;
