use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Data, Int, Shape, Tensor},
};
use cxr_data::Split;
use cxr_transforms::{ImageTensor, Pipeline, Transform};
use log::{debug, warn};

use crate::{
    build_transformation,
    data::{
        dataset::{LabeledImage, MultimodalSample, PneumoniaSample},
        imagenome::ImaGenomeInstance,
        tokenizer::Tokenizer,
    },
    DatasetError, ExperimentConfig,
};

/// Stacks CHW images into `[N, C, H, W]`. Every image is expected to have the
/// shape of the first one; a mismatched image is copied into its overlap.
fn stack_images<B: Backend>(images: &[&ImageTensor], device: &B::Device) -> Tensor<B, 4> {
    let [channels, height, width] = images.first().map(|image| image.shape()).unwrap_or([3, 0, 0]);
    let size = channels * height * width;
    let mut values = vec![0.0f32; images.len() * size];

    for (n, image) in images.iter().enumerate() {
        let out = &mut values[n * size..(n + 1) * size];
        if image.shape() == [channels, height, width] {
            out.copy_from_slice(image.data());
            continue;
        }
        warn!("Image shape {:?} differs from batch shape {:?}", image.shape(), [channels, height, width]);
        for c in 0..channels.min(image.channels()) {
            for y in 0..height.min(image.height()) {
                for x in 0..width.min(image.width()) {
                    out[(c * height + y) * width + x] = image.get(c, y, x);
                }
            }
        }
    }

    Tensor::<B, 4>::from_data(Data::new(values, Shape::new([images.len(), channels, height, width])).convert())
        .to_device(device)
}

fn stack_labels<B: Backend>(labels: &[&[f32]], device: &B::Device) -> Tensor<B, 2> {
    let width = labels.iter().map(|l| l.len()).max().unwrap_or(0);
    let mut values = vec![0.0f32; labels.len() * width];
    for (n, row) in labels.iter().enumerate() {
        values[n * width..n * width + row.len()].copy_from_slice(row);
    }
    Tensor::<B, 2>::from_data(Data::new(values, Shape::new([labels.len(), width])).convert()).to_device(device)
}

fn stack_ids<B: Backend>(rows: &[&[i64]], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let values: Vec<i64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Tensor::<B, 2, Int>::from_data(Data::new(values, Shape::new([rows.len(), width])).convert()).to_device(device)
}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 2>,
    pub paths: Vec<String>,
}

/// Default collation: images and label vectors stacked along the batch axis.
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend, S: LabeledImage> Batcher<S, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<S>) -> ImageBatch<B> {
        let images: Vec<&ImageTensor> = items.iter().map(|s| s.image()).collect();
        let labels: Vec<&[f32]> = items.iter().map(|s| s.labels()).collect();
        ImageBatch {
            images: stack_images::<B>(&images, &self.device),
            labels: stack_labels::<B>(&labels, &self.device),
            paths: items.iter().map(|s| s.path().to_string()).collect(),
        }
    }
}

/// Boxes for one image, `[x1, y1, x2, y2]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionTarget {
    pub boxes: Vec<[f32; 4]>,
    pub labels: Vec<i64>,
}

#[derive(Clone, Debug)]
pub struct DetectionBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Vec<DetectionTarget>,
    pub paths: Vec<String>,
}

/// Stacks images but keeps the variable-length box targets per image.
pub struct DetectionBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> DetectionBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<PneumoniaSample, DetectionBatch<B>> for DetectionBatcher<B> {
    fn batch(&self, items: Vec<PneumoniaSample>) -> DetectionBatch<B> {
        let images: Vec<&ImageTensor> = items.iter().map(|s| &s.image).collect();
        let images = stack_images::<B>(&images, &self.device);
        let targets = items
            .iter()
            .map(|s| DetectionTarget {
                boxes: s.boxes.clone(),
                labels: vec![1; s.boxes.len()],
            })
            .collect();
        DetectionBatch {
            images,
            targets,
            paths: items.into_iter().map(|s| s.path).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum PneumoniaBatch<B: Backend> {
    Classification(ImageBatch<B>),
    Detection(DetectionBatch<B>),
}

/// Collation chosen from the experiment phase.
pub enum PneumoniaBatcher<B: Backend> {
    Classification(ImageBatcher<B>),
    Detection(DetectionBatcher<B>),
}

impl<B: Backend> Batcher<PneumoniaSample, PneumoniaBatch<B>> for PneumoniaBatcher<B> {
    fn batch(&self, items: Vec<PneumoniaSample>) -> PneumoniaBatch<B> {
        match self {
            PneumoniaBatcher::Classification(batcher) => PneumoniaBatch::Classification(batcher.batch(items)),
            PneumoniaBatcher::Detection(batcher) => PneumoniaBatch::Detection(batcher.batch(items)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MultimodalBatch<B: Backend> {
    pub imgs: Tensor<B, 4>,
    pub caption_ids: Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub token_type_ids: Tensor<B, 2, Int>,
    pub cap_lens: Vec<usize>,
    pub paths: Vec<String>,
}

/// Image/caption collation, longest caption first.
pub struct MultimodalBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> MultimodalBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<MultimodalSample, MultimodalBatch<B>> for MultimodalBatcher<B> {
    fn batch(&self, mut items: Vec<MultimodalSample>) -> MultimodalBatch<B> {
        items.sort_by(|a, b| b.caption.len.cmp(&a.caption.len));

        let images: Vec<&ImageTensor> = items.iter().map(|s| &s.image).collect();
        let ids: Vec<&[i64]> = items.iter().map(|s| s.caption.input_ids.as_slice()).collect();
        let masks: Vec<&[i64]> = items.iter().map(|s| s.caption.attention_mask.as_slice()).collect();
        let types: Vec<&[i64]> = items.iter().map(|s| s.caption.token_type_ids.as_slice()).collect();

        MultimodalBatch {
            imgs: stack_images::<B>(&images, &self.device),
            caption_ids: stack_ids::<B>(&ids, &self.device),
            attention_mask: stack_ids::<B>(&masks, &self.device),
            token_type_ids: stack_ids::<B>(&types, &self.device),
            cap_lens: items.iter().map(|s| s.caption.len).collect(),
            paths: items.into_iter().map(|s| s.path).collect(),
        }
    }
}

/// Collates raw ImaGenome instances: the split transform and the tokenizer
/// run here rather than in the dataset.
pub struct GloriaCollateFn<B: Backend> {
    split: Split,
    transform: Pipeline,
    tokenizer: Arc<Tokenizer>,
    imsize: usize,
    inner: MultimodalBatcher<B>,
}

impl<B: Backend> GloriaCollateFn<B> {
    pub fn new(cfg: &ExperimentConfig, split: Split, device: B::Device) -> Result<Self, DatasetError> {
        let tokenizer = Tokenizer::from_vocab_file(&cfg.data.text.vocab_path, cfg.data.text.word_num)?;
        Self::with_tokenizer(cfg, split, Arc::new(tokenizer), device)
    }

    pub fn with_tokenizer(
        cfg: &ExperimentConfig,
        split: Split,
        tokenizer: Arc<Tokenizer>,
        device: B::Device,
    ) -> Result<Self, DatasetError> {
        Ok(Self {
            split,
            transform: build_transformation(cfg, split)?,
            tokenizer,
            imsize: cfg.data.image.imsize as usize,
            inner: MultimodalBatcher::new(device),
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }
}

impl<B: Backend> Batcher<ImaGenomeInstance, MultimodalBatch<B>> for GloriaCollateFn<B> {
    fn batch(&self, items: Vec<ImaGenomeInstance>) -> MultimodalBatch<B> {
        debug!("Collating {} ImaGenome instances for {}", items.len(), self.split);
        let samples = items
            .into_iter()
            .map(|instance| {
                let image = instance
                    .image
                    .unwrap_or_else(|| ImageTensor::zeros(3, self.imsize, self.imsize));
                MultimodalSample {
                    image: self.transform.apply(image),
                    caption: self.tokenizer.encode(instance.report.as_deref().unwrap_or("")),
                    path: instance.dicom_id,
                }
            })
            .collect();
        self.inner.batch(samples)
    }
}
