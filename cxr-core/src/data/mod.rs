pub mod collate;
pub mod data_module;
pub mod dataset;
pub mod imagenome;
pub mod loader;
pub mod tokenizer;

pub use collate::{
    DetectionBatch, DetectionBatcher, DetectionTarget, GloriaCollateFn, ImageBatch, ImageBatcher, MultimodalBatch,
    MultimodalBatcher, PneumoniaBatch, PneumoniaBatcher,
};
pub use data_module::{CheXpertDataModule, DataModule, PneumoniaDataModule, PneumothoraxDataModule, PretrainingDataModule};
pub use dataset::{
    CheXpertImageDataset, ImageSample, LabeledImage, Loaded, MultimodalPretrainingDataset, MultimodalSample,
    PneumoniaImageDataset, PneumoniaSample, PneumothoraxImageDataset,
};
pub use imagenome::{
    ImaGenomeDataModule, ImaGenomeDataset, ImaGenomeEntry, ImaGenomeInstance, ImaGenomeOptions,
    ImaGenomePretrainingDataModule, Slice,
};
pub use loader::{DataLoader, DataLoaderBuilder, DataLoaderIter, LoaderOptions};
pub use tokenizer::{Encoding, Tokenizer};
