use std::fmt;

use cxr_data::Split;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    CenterCrop, ColorJitter, ImageTensor, Normalize, RandomAffine, RandomCrop, RandomHorizontalFlip,
    TransformError,
};

/// A per-sample image operation.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, image: ImageTensor) -> ImageTensor;

    /// Applies the operation and moves `[x1, y1, x2, y2]` pixel boxes with
    /// the image. Boxes that leave the image are removed. Photometric ops
    /// keep the default, which leaves boxes untouched.
    fn apply_with_boxes(&self, image: ImageTensor, _boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        self.apply(image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    pub crop_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineConfig {
    pub degrees: f32,
    #[serde(default)]
    pub translate: [f32; 2],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 2],
}

fn unit_scale() -> [f32; 2] {
    [1.0, 1.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorJitterConfig {
    #[serde(default)]
    pub brightness: f32,
    #[serde(default)]
    pub contrast: f32,
}

/// `transforms` section of an experiment config. Absent entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub random_crop: Option<CropConfig>,
    pub random_horizontal_flip: Option<f32>,
    pub random_affine: Option<AffineConfig>,
    pub color_jitter: Option<ColorJitterConfig>,
    /// `imagenet` or `half`.
    pub norm: Option<String>,
}

/// Ordered composition of transforms.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { steps: Vec::new() }
    }

    pub fn push<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.steps.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Augmentations only run on the train split; every other split gets the
    /// deterministic center crop. Normalization always comes last.
    pub fn for_split(cfg: &TransformConfig, split: Split) -> Result<Self, TransformError> {
        let mut pipeline = Pipeline::new();

        if split == Split::Train {
            if let Some(crop) = cfg.random_crop {
                pipeline = pipeline.push(RandomCrop::new(crop.crop_size));
            }
            if let Some(probability) = cfg.random_horizontal_flip {
                pipeline = pipeline.push(RandomHorizontalFlip::new(probability));
            }
            if let Some(affine) = cfg.random_affine {
                pipeline = pipeline.push(RandomAffine {
                    degrees: affine.degrees,
                    translate: affine.translate,
                    scale: affine.scale,
                });
            }
            if let Some(jitter) = cfg.color_jitter {
                pipeline = pipeline.push(ColorJitter {
                    brightness: jitter.brightness,
                    contrast: jitter.contrast,
                });
            }
        } else if let Some(crop) = cfg.random_crop {
            pipeline = pipeline.push(CenterCrop::new(crop.crop_size));
        }

        if let Some(norm) = &cfg.norm {
            let normalize = match norm.as_str() {
                "imagenet" => Normalize::imagenet(),
                "half" => Normalize::half(),
                other => return Err(TransformError::UnknownNorm(other.to_string())),
            };
            pipeline = pipeline.push(normalize);
        }

        debug!("{} transforms: {:?}", split, pipeline.names());
        Ok(pipeline)
    }
}

impl Transform for Pipeline {
    fn name(&self) -> &'static str {
        "Compose"
    }

    fn apply(&self, image: ImageTensor) -> ImageTensor {
        self.steps.iter().fold(image, |image, step| step.apply(image))
    }

    fn apply_with_boxes(&self, image: ImageTensor, boxes: &mut Vec<[f32; 4]>) -> ImageTensor {
        self.steps
            .iter()
            .fold(image, |image, step| step.apply_with_boxes(image, boxes))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pipeline").field(&self.names()).finish()
    }
}
