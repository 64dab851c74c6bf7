use std::collections::HashMap;

use log::info;

use crate::{DataConfig, DataError, Manifest, Split, PNEUMONIA_BOX_COLS, PNEUMONIA_PATH_COL, PNEUMONIA_TARGET_COL};

/// Box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// `[x1, y1, x2, y2]`
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PneumoniaRecord {
    pub path: String,
    pub target: f32,
    pub boxes: Vec<BoundingBox>,
}

/// One record per image. RSNA lists one row per box, so rows sharing a path
/// are merged; the manifest order of first appearance is kept.
pub fn read_pneumonia(cfg: &DataConfig, split: Split) -> Result<Vec<PneumoniaRecord>, DataError> {
    let manifest = Manifest::read(cfg.manifest(split))?;
    let paths = manifest.strings(PNEUMONIA_PATH_COL)?;
    let targets = manifest.floats(PNEUMONIA_TARGET_COL)?;

    let boxes: Option<Vec<Vec<Option<f64>>>> = if PNEUMONIA_BOX_COLS.iter().all(|c| manifest.has_column(c)) {
        Some(
            PNEUMONIA_BOX_COLS
                .iter()
                .map(|c| manifest.floats(c))
                .collect::<Result<_, _>>()?,
        )
    } else {
        None
    };

    let mut records: Vec<PneumoniaRecord> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    for (row, path) in paths.into_iter().enumerate() {
        let target = targets[row].unwrap_or(0.0) as f32;
        let index = *by_path.entry(path.clone()).or_insert_with(|| {
            records.push(PneumoniaRecord {
                path,
                target: 0.0,
                boxes: Vec::new(),
            });
            records.len() - 1
        });
        let record = &mut records[index];
        record.target = record.target.max(target);

        if let Some(columns) = &boxes {
            if let [Some(x), Some(y), Some(width), Some(height)] =
                [columns[0][row], columns[1][row], columns[2][row], columns[3][row]]
            {
                record.boxes.push(BoundingBox {
                    x: x as f32,
                    y: y as f32,
                    width: width as f32,
                    height: height as f32,
                });
            }
        }
    }

    info!("Pneumonia {}: {} images", split, records.len());
    Ok(records)
}
