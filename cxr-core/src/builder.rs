use cxr_data::Split;
use cxr_transforms::{Pipeline, TransformError};

use crate::ExperimentConfig;

/// Image pipeline for `split`, driven by the `transforms` config section.
pub fn build_transformation(cfg: &ExperimentConfig, split: Split) -> Result<Pipeline, TransformError> {
    Pipeline::for_split(&cfg.transforms, split)
}
