use std::path::Path;

use crate::{DataError, Manifest, IMAGENOME_DICOM_COL, IMAGENOME_STUDY_COL, IMAGENOME_SUBJECT_COL};

/// One image of an ImaGenome split file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImaGenomeRow {
    pub dicom_id: String,
    pub subject_id: String,
    pub study_id: String,
}

pub fn read_imagenome_split(path: &Path) -> Result<Vec<ImaGenomeRow>, DataError> {
    let manifest = Manifest::read(path)?;
    let dicoms = manifest.strings(IMAGENOME_DICOM_COL)?;
    let subjects = manifest.strings(IMAGENOME_SUBJECT_COL)?;
    let studies = manifest.strings(IMAGENOME_STUDY_COL)?;

    Ok(dicoms
        .into_iter()
        .zip(subjects)
        .zip(studies)
        .map(|((dicom_id, subject_id), study_id)| ImaGenomeRow {
            dicom_id,
            subject_id,
            study_id,
        })
        .collect())
}
