use log::info;

use crate::{
    DataConfig, DataError, Manifest, Split, CHEXPERT_COMPETITION_TASKS, CHEXPERT_FRONTAL,
    CHEXPERT_PATH_COL, CHEXPERT_UNCERTAIN_MAPPINGS, CHEXPERT_VIEW_COL,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheXpertRecord {
    pub path: String,
    /// One entry per competition task.
    pub labels: [f32; 5],
}

/// Missing labels become 0 and uncertain ones (-1) take the per-task mapping.
pub fn map_chexpert_label(task: usize, value: Option<f64>) -> f32 {
    match value {
        None => 0.0,
        Some(v) if v == -1.0 => CHEXPERT_UNCERTAIN_MAPPINGS[task],
        Some(v) => v as f32,
    }
}

pub fn read_chexpert(cfg: &DataConfig, split: Split) -> Result<Vec<CheXpertRecord>, DataError> {
    let path = cfg.manifest(split);
    let manifest = if cfg.image.frontal_only {
        Manifest::read_where(path, CHEXPERT_VIEW_COL, CHEXPERT_FRONTAL)?
    } else {
        Manifest::read(path)?
    };

    let paths = manifest.strings(CHEXPERT_PATH_COL)?;
    let mut labels = vec![[0.0f32; 5]; paths.len()];
    for (task, name) in CHEXPERT_COMPETITION_TASKS.iter().enumerate() {
        for (row, value) in manifest.floats(name)?.into_iter().enumerate() {
            labels[row][task] = map_chexpert_label(task, value);
        }
    }

    info!("CheXpert {}: {} images", split, paths.len());
    Ok(paths
        .into_iter()
        .zip(labels)
        .map(|(path, labels)| CheXpertRecord { path, labels })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn uncertain_labels_follow_task_mapping() {
        assert_eq!(map_chexpert_label(0, Some(-1.0)), 1.0);
        assert_eq!(map_chexpert_label(1, Some(-1.0)), 0.0);
        assert_eq!(map_chexpert_label(4, Some(-1.0)), 1.0);
        assert_eq!(map_chexpert_label(2, None), 0.0);
        assert_eq!(map_chexpert_label(3, Some(1.0)), 1.0);
    }

    #[test]
    fn reads_frontal_rows_with_mapped_labels() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("train.csv");
        fs::write(
            &csv,
            "Path,Frontal/Lateral,Atelectasis,Cardiomegaly,Consolidation,Edema,Pleural Effusion\n\
             p1.jpg,Frontal,-1,-1,,1,0\n\
             p2.jpg,Lateral,1,1,1,1,1\n\
             p3.jpg,Frontal,0,1,-1,-1,-1\n",
        )
        .unwrap();
        let cfg = DataConfig {
            train_csv: csv,
            ..DataConfig::default()
        };

        let records = read_chexpert(&cfg, Split::Train).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "p1.jpg");
        assert_eq!(records[0].labels, [1.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(records[1].labels, [0.0, 1.0, 0.0, 1.0, 1.0]);
    }
}
