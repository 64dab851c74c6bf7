use std::{fs, path::Path};

use burn::config::Config;
use cxr_data::DataConfig;
use cxr_transforms::TransformConfig;
use log::info;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Config, Debug)]
pub struct TrainConfig {
    #[config(default = 64)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 42)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pretrain,
    #[default]
    Classification,
    Segmentation,
    Detection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default = "TrainConfig::new")]
    pub train: TrainConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub transforms: TransformConfig,
}

impl ExperimentConfig {
    pub fn new(phase: Phase, train: TrainConfig) -> Self {
        ExperimentConfig {
            phase,
            train,
            data: DataConfig::default(),
            transforms: TransformConfig::default(),
        }
    }

    pub fn with_data(mut self, data: DataConfig) -> Self {
        self.data = data;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformConfig) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: ExperimentConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Loaded {} config for {} (batch size {}, {} workers)",
            path.display(),
            cfg.data.dataset,
            cfg.train.batch_size,
            cfg.train.num_workers
        );
        Ok(cfg)
    }
}
