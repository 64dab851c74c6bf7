mod chexpert;
mod config;
mod constants;
mod error;
mod imagenome;
mod manifest;
mod pneumonia;
mod pneumothorax;
mod pretraining;
mod split;

pub use chexpert::{map_chexpert_label, read_chexpert, CheXpertRecord};
pub use config::{DataConfig, ImageConfig, TextConfig};
pub use constants::*;
pub use error::DataError;
pub use imagenome::{read_imagenome_split, ImaGenomeRow};
pub use manifest::{sample_fraction, Manifest};
pub use pneumonia::{read_pneumonia, BoundingBox, PneumoniaRecord};
pub use pneumothorax::{read_pneumothorax, PneumothoraxRecord};
pub use pretraining::{read_pretraining, PretrainingRecord};
pub use split::Split;
