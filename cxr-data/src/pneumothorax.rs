use log::info;

use crate::{DataConfig, DataError, Manifest, Split, PNEUMOTHORAX_LABEL_COL, PNEUMOTHORAX_PATH_COL};

#[derive(Debug, Clone, PartialEq)]
pub struct PneumothoraxRecord {
    pub path: String,
    pub label: f32,
}

pub fn read_pneumothorax(cfg: &DataConfig, split: Split) -> Result<Vec<PneumothoraxRecord>, DataError> {
    let manifest = Manifest::read(cfg.manifest(split))?;
    let paths = manifest.strings(PNEUMOTHORAX_PATH_COL)?;
    let labels = manifest.floats(PNEUMOTHORAX_LABEL_COL)?;

    info!("Pneumothorax {}: {} images", split, paths.len());
    Ok(paths
        .into_iter()
        .zip(labels)
        .map(|(path, label)| PneumothoraxRecord {
            path,
            label: label.map(|l| if l > 0.0 { 1.0 } else { 0.0 }).unwrap_or(0.0),
        })
        .collect())
}
