use std::sync::Arc;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::backend::Backend,
};
use cxr_data::Split;
use cxr_transforms::Pipeline;
use log::info;
use logging_timer::time;

use crate::{
    build_transformation,
    data::{
        collate::{
            DetectionBatcher, ImageBatch, ImageBatcher, MultimodalBatch, MultimodalBatcher, PneumoniaBatch,
            PneumoniaBatcher,
        },
        dataset::{
            CheXpertImageDataset, ImageSample, Loaded, MultimodalPretrainingDataset, MultimodalSample,
            PneumoniaImageDataset, PneumoniaSample, PneumothoraxImageDataset,
        },
        loader::{DataLoader, DataLoaderBuilder, LoaderOptions},
    },
    DataModuleError, DatasetError, ExperimentConfig, Phase,
};

/// Lifecycle shared by every dataset: optional preparation, then one loader
/// per split.
pub trait DataModule {
    type Item;
    type Batch;

    fn prepare_data(&mut self) -> Result<(), DataModuleError> {
        Ok(())
    }

    fn train_dataloader(&self) -> Result<DataLoader<Self::Item, Self::Batch>, DataModuleError>;

    fn val_dataloader(&self) -> Result<DataLoader<Self::Item, Self::Batch>, DataModuleError>;

    fn test_dataloader(&self) -> Result<DataLoader<Self::Item, Self::Batch>, DataModuleError>;
}

/// Builds the `split` dataset with the `transform_split` transform and wraps
/// it in a loader configured by the split policy.
#[time("debug")]
fn split_loader<I, O, D, C>(
    cfg: &ExperimentConfig,
    split: Split,
    transform_split: Split,
    dataset: impl FnOnce(&ExperimentConfig, Split, Pipeline) -> Result<D, DatasetError>,
    collate: C,
) -> Result<DataLoader<I, O>, DataModuleError>
where
    D: Dataset<Loaded<I>> + 'static,
    C: Batcher<I, O> + 'static,
{
    let transform = build_transformation(cfg, transform_split)?;
    let dataset = dataset(cfg, split, transform)?;
    info!("{} split: {} items", split, dataset.len());
    Ok(DataLoaderBuilder::new(collate)
        .with_options(LoaderOptions::from_config(&cfg.train, split))
        .build(dataset)?)
}

pub struct PretrainingDataModule<B: Backend> {
    cfg: Arc<ExperimentConfig>,
    device: B::Device,
}

impl<B: Backend> PretrainingDataModule<B> {
    pub fn new(cfg: Arc<ExperimentConfig>, device: B::Device) -> Self {
        Self { cfg, device }
    }
}

impl<B: Backend> DataModule for PretrainingDataModule<B> {
    type Item = MultimodalSample;
    type Batch = MultimodalBatch<B>;

    fn train_dataloader(&self) -> Result<DataLoader<MultimodalSample, MultimodalBatch<B>>, DataModuleError> {
        split_loader(
            &self.cfg,
            Split::Train,
            Split::Train,
            MultimodalPretrainingDataset::new,
            MultimodalBatcher::<B>::new(self.device.clone()),
        )
    }

    // validation images get the deterministic test-time transform
    fn val_dataloader(&self) -> Result<DataLoader<MultimodalSample, MultimodalBatch<B>>, DataModuleError> {
        split_loader(
            &self.cfg,
            Split::Valid,
            Split::Test,
            MultimodalPretrainingDataset::new,
            MultimodalBatcher::<B>::new(self.device.clone()),
        )
    }

    fn test_dataloader(&self) -> Result<DataLoader<MultimodalSample, MultimodalBatch<B>>, DataModuleError> {
        split_loader(
            &self.cfg,
            Split::Test,
            Split::Test,
            MultimodalPretrainingDataset::new,
            MultimodalBatcher::<B>::new(self.device.clone()),
        )
    }
}

pub struct CheXpertDataModule<B: Backend> {
    cfg: Arc<ExperimentConfig>,
    device: B::Device,
}

impl<B: Backend> CheXpertDataModule<B> {
    pub fn new(cfg: Arc<ExperimentConfig>, device: B::Device) -> Self {
        Self { cfg, device }
    }

    fn loader(&self, split: Split) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        split_loader(
            &self.cfg,
            split,
            split,
            CheXpertImageDataset::new,
            ImageBatcher::<B>::new(self.device.clone()),
        )
    }
}

impl<B: Backend> DataModule for CheXpertDataModule<B> {
    type Item = ImageSample;
    type Batch = ImageBatch<B>;

    fn train_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Train)
    }

    fn val_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Valid)
    }

    fn test_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Test)
    }
}

pub struct PneumothoraxDataModule<B: Backend> {
    cfg: Arc<ExperimentConfig>,
    device: B::Device,
}

impl<B: Backend> PneumothoraxDataModule<B> {
    pub fn new(cfg: Arc<ExperimentConfig>, device: B::Device) -> Self {
        Self { cfg, device }
    }

    fn loader(&self, split: Split) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        split_loader(
            &self.cfg,
            split,
            split,
            PneumothoraxImageDataset::new,
            ImageBatcher::<B>::new(self.device.clone()),
        )
    }
}

impl<B: Backend> DataModule for PneumothoraxDataModule<B> {
    type Item = ImageSample;
    type Batch = ImageBatch<B>;

    fn train_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Train)
    }

    fn val_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Valid)
    }

    fn test_dataloader(&self) -> Result<DataLoader<ImageSample, ImageBatch<B>>, DataModuleError> {
        self.loader(Split::Test)
    }
}

pub struct PneumoniaDataModule<B: Backend> {
    cfg: Arc<ExperimentConfig>,
    device: B::Device,
}

impl<B: Backend> PneumoniaDataModule<B> {
    pub fn new(cfg: Arc<ExperimentConfig>, device: B::Device) -> Self {
        Self { cfg, device }
    }

    fn collate(&self) -> PneumoniaBatcher<B> {
        if self.cfg.phase == Phase::Detection {
            PneumoniaBatcher::Detection(DetectionBatcher::new(self.device.clone()))
        } else {
            PneumoniaBatcher::Classification(ImageBatcher::new(self.device.clone()))
        }
    }

    fn loader(&self, split: Split) -> Result<DataLoader<PneumoniaSample, PneumoniaBatch<B>>, DataModuleError> {
        split_loader(&self.cfg, split, split, PneumoniaImageDataset::new, self.collate())
    }
}

impl<B: Backend> DataModule for PneumoniaDataModule<B> {
    type Item = PneumoniaSample;
    type Batch = PneumoniaBatch<B>;

    fn train_dataloader(&self) -> Result<DataLoader<PneumoniaSample, PneumoniaBatch<B>>, DataModuleError> {
        self.loader(Split::Train)
    }

    fn val_dataloader(&self) -> Result<DataLoader<PneumoniaSample, PneumoniaBatch<B>>, DataModuleError> {
        self.loader(Split::Valid)
    }

    fn test_dataloader(&self) -> Result<DataLoader<PneumoniaSample, PneumoniaBatch<B>>, DataModuleError> {
        self.loader(Split::Test)
    }
}
