use log::{info, warn};

use crate::{DataConfig, DataError, Manifest, Split, PRETRAINING_PATH_COL};

#[derive(Debug, Clone, PartialEq)]
pub struct PretrainingRecord {
    pub path: String,
    pub caption: String,
}

/// Image/report pairs; rows without a report are skipped.
pub fn read_pretraining(cfg: &DataConfig, split: Split) -> Result<Vec<PretrainingRecord>, DataError> {
    let manifest = Manifest::read(cfg.manifest(split))?;
    let paths = manifest.strings(PRETRAINING_PATH_COL)?;
    let captions = manifest.optional_strings(&cfg.text.captions_column)?;

    let total = paths.len();
    let records: Vec<PretrainingRecord> = paths
        .into_iter()
        .zip(captions)
        .filter_map(|(path, caption)| {
            let caption = caption?.trim().to_string();
            if caption.is_empty() {
                None
            } else {
                Some(PretrainingRecord { path, caption })
            }
        })
        .collect();

    if records.len() < total {
        warn!("Dropped {} {} rows without a report", total - records.len(), split);
    }
    info!("Pretraining {}: {} image/report pairs", split, records.len());
    Ok(records)
}
