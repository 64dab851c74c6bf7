use burn::data::dataset::{Dataset, DatasetIterator};
use cxr_data::{
    read_chexpert, read_pneumonia, read_pneumothorax, read_pretraining, sample_fraction, CheXpertRecord, DataConfig,
    PneumoniaRecord, PneumothoraxRecord, PretrainingRecord, Split,
};
use cxr_transforms::{read_xray, ImageTensor, Letterbox, Pipeline, Transform};
use log::info;

use crate::{
    data::tokenizer::{Encoding, Tokenizer},
    DatasetError, ExperimentConfig, Phase,
};

/// Dataset items carry their own loading error so it reaches the loader intact.
pub type Loaded<T> = Result<T, DatasetError>;

/// Samples that can be collated as image plus label vector.
pub trait LabeledImage {
    fn image(&self) -> &ImageTensor;
    fn labels(&self) -> &[f32];
    fn path(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ImageSample {
    pub image: ImageTensor,
    pub labels: Vec<f32>,
    pub path: String,
}

impl LabeledImage for ImageSample {
    fn image(&self) -> &ImageTensor {
        &self.image
    }

    fn labels(&self) -> &[f32] {
        &self.labels
    }

    fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct PneumoniaSample {
    pub image: ImageTensor,
    /// `[target]`
    pub labels: Vec<f32>,
    /// `[x1, y1, x2, y2]` on the resized image; empty outside detection.
    pub boxes: Vec<[f32; 4]>,
    pub path: String,
}

impl LabeledImage for PneumoniaSample {
    fn image(&self) -> &ImageTensor {
        &self.image
    }

    fn labels(&self) -> &[f32] {
        &self.labels
    }

    fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct MultimodalSample {
    pub image: ImageTensor,
    pub caption: Encoding,
    pub path: String,
}

/// Shared by the image datasets: where the files are and how to read them.
struct ImageSource {
    data: DataConfig,
    transform: Pipeline,
}

impl ImageSource {
    fn new(cfg: &ExperimentConfig, transform: Pipeline) -> Self {
        ImageSource {
            data: cfg.data.clone(),
            transform,
        }
    }

    fn read(&self, path: &str) -> Loaded<(ImageTensor, Letterbox)> {
        Ok(read_xray(&self.data.resolve(path), self.data.image.imsize)?)
    }

    fn load(&self, path: &str) -> Loaded<ImageTensor> {
        let (image, _) = self.read(path)?;
        Ok(self.transform.apply(image))
    }
}

fn train_fraction<T>(cfg: &ExperimentConfig, split: Split, records: Vec<T>) -> Vec<T> {
    if split == Split::Train && cfg.data.frac < 1.0 {
        let before = records.len();
        let records = sample_fraction(records, cfg.data.frac, cfg.train.seed);
        info!("Kept {} of {} train records (frac {})", records.len(), before, cfg.data.frac);
        records
    } else {
        records
    }
}

pub struct CheXpertImageDataset {
    records: Vec<CheXpertRecord>,
    source: ImageSource,
}

impl CheXpertImageDataset {
    pub fn new(cfg: &ExperimentConfig, split: Split, transform: Pipeline) -> Result<Self, DatasetError> {
        let records = train_fraction(cfg, split, read_chexpert(&cfg.data, split)?);
        Ok(Self {
            records,
            source: ImageSource::new(cfg, transform),
        })
    }
}

impl Dataset<Loaded<ImageSample>> for CheXpertImageDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Option<Loaded<ImageSample>> {
        let record = self.records.get(index)?;
        Some(self.source.load(&record.path).map(|image| ImageSample {
            image,
            labels: record.labels.to_vec(),
            path: record.path.clone(),
        }))
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn iter(&self) -> DatasetIterator<'_, Loaded<ImageSample>> {
        DatasetIterator::new(self)
    }
}

pub struct PneumothoraxImageDataset {
    records: Vec<PneumothoraxRecord>,
    source: ImageSource,
}

impl PneumothoraxImageDataset {
    pub fn new(cfg: &ExperimentConfig, split: Split, transform: Pipeline) -> Result<Self, DatasetError> {
        let records = train_fraction(cfg, split, read_pneumothorax(&cfg.data, split)?);
        Ok(Self {
            records,
            source: ImageSource::new(cfg, transform),
        })
    }
}

impl Dataset<Loaded<ImageSample>> for PneumothoraxImageDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Option<Loaded<ImageSample>> {
        let record = self.records.get(index)?;
        Some(self.source.load(&record.path).map(|image| ImageSample {
            image,
            labels: vec![record.label],
            path: record.path.clone(),
        }))
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn iter(&self) -> DatasetIterator<'_, Loaded<ImageSample>> {
        DatasetIterator::new(self)
    }
}

pub struct PneumoniaImageDataset {
    records: Vec<PneumoniaRecord>,
    source: ImageSource,
    detection: bool,
}

impl PneumoniaImageDataset {
    pub fn new(cfg: &ExperimentConfig, split: Split, transform: Pipeline) -> Result<Self, DatasetError> {
        let records = train_fraction(cfg, split, read_pneumonia(&cfg.data, split)?);
        Ok(Self {
            records,
            source: ImageSource::new(cfg, transform),
            detection: cfg.phase == Phase::Detection,
        })
    }

    /// Boxes are letterboxed with the image, then moved by the same
    /// geometric transforms.
    fn sample(&self, record: &PneumoniaRecord) -> Loaded<PneumoniaSample> {
        let (image, boxes) = if self.detection {
            let (image, letterbox) = self.source.read(&record.path)?;
            let mut boxes: Vec<[f32; 4]> = record.boxes.iter().map(|b| letterbox.map_corners(b.corners())).collect();
            let image = self.source.transform.apply_with_boxes(image, &mut boxes);
            (image, boxes)
        } else {
            (self.source.load(&record.path)?, Vec::new())
        };
        Ok(PneumoniaSample {
            image,
            labels: vec![record.target],
            boxes,
            path: record.path.clone(),
        })
    }
}

impl Dataset<Loaded<PneumoniaSample>> for PneumoniaImageDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Option<Loaded<PneumoniaSample>> {
        self.records.get(index).map(|record| self.sample(record))
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn iter(&self) -> DatasetIterator<'_, Loaded<PneumoniaSample>> {
        DatasetIterator::new(self)
    }
}

pub struct MultimodalPretrainingDataset {
    records: Vec<PretrainingRecord>,
    source: ImageSource,
    tokenizer: Tokenizer,
}

impl MultimodalPretrainingDataset {
    pub fn new(cfg: &ExperimentConfig, split: Split, transform: Pipeline) -> Result<Self, DatasetError> {
        let records = train_fraction(cfg, split, read_pretraining(&cfg.data, split)?);
        let tokenizer = Tokenizer::from_vocab_file(&cfg.data.text.vocab_path, cfg.data.text.word_num)?;
        Ok(Self {
            records,
            source: ImageSource::new(cfg, transform),
            tokenizer,
        })
    }
}

impl Dataset<Loaded<MultimodalSample>> for MultimodalPretrainingDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, index: usize) -> Option<Loaded<MultimodalSample>> {
        let record = self.records.get(index)?;
        Some(self.source.load(&record.path).map(|image| MultimodalSample {
            image,
            caption: self.tokenizer.encode(&record.caption),
            path: record.path.clone(),
        }))
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn iter(&self) -> DatasetIterator<'_, Loaded<MultimodalSample>> {
        DatasetIterator::new(self)
    }
}
