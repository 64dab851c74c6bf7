use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Split;

/// `data` section of an experiment config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dataset: String,
    /// Relative image paths in the manifests are resolved against this directory.
    pub root: PathBuf,
    /// Fraction of the train split kept.
    pub frac: f64,
    pub train_csv: PathBuf,
    pub valid_csv: PathBuf,
    pub test_csv: PathBuf,
    pub image: ImageConfig,
    pub text: TextConfig,
    pub mimic_cxr_dir: PathBuf,
    pub imagenome_dir: PathBuf,
    pub physionet_config: PathBuf,
}

impl DataConfig {
    pub fn manifest(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train_csv,
            Split::Valid => &self.valid_csv,
            Split::Test => &self.test_csv,
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            dataset: String::from("chexpert"),
            root: PathBuf::from("data"),
            frac: 1.0,
            train_csv: PathBuf::from("data/train.csv"),
            valid_csv: PathBuf::from("data/valid.csv"),
            test_csv: PathBuf::from("data/test.csv"),
            image: ImageConfig::default(),
            text: TextConfig::default(),
            mimic_cxr_dir: PathBuf::from("data/mimic-cxr"),
            imagenome_dir: PathBuf::from("data/imagenome"),
            physionet_config: PathBuf::from("physionet.toml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub imsize: u32,
    pub frontal_only: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            imsize: 256,
            frontal_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Caption length in tokens, including `[CLS]` and `[SEP]`.
    pub word_num: usize,
    pub vocab_path: PathBuf,
    pub captions_column: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        TextConfig {
            word_num: 97,
            vocab_path: PathBuf::from("data/vocab.txt"),
            captions_column: String::from("Report Impression"),
        }
    }
}
