use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{FilerError, PhysioNetCredentials};

const INDEX_DIR: &str = ".cxr-index";
const PREPARED_FILE: &str = "prepared.json";

/// Local copy of MIMIC-CXR-JPG plus its free-text reports.
///
/// Layout: `files/pXX/pSUBJECT/sSTUDY.txt` for reports and
/// `files/pXX/pSUBJECT/sSTUDY/DICOM.jpg` for images.
#[derive(Debug, Clone)]
pub struct MimicCxrFiler {
    download_directory: PathBuf,
    credentials: PhysioNetCredentials,
}

impl MimicCxrFiler {
    pub fn new(download_directory: impl Into<PathBuf>, credentials: PhysioNetCredentials) -> Self {
        MimicCxrFiler {
            download_directory: download_directory.into(),
            credentials,
        }
    }

    pub fn download_directory(&self) -> &Path {
        &self.download_directory
    }

    pub fn credentials(&self) -> &PhysioNetCredentials {
        &self.credentials
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn password(&self) -> &str {
        &self.credentials.password
    }

    pub fn files_dir(&self) -> PathBuf {
        self.download_directory.join("files")
    }

    pub fn study_dir(&self, subject_id: &str, study_id: &str) -> PathBuf {
        self.subject_dir(subject_id).join(format!("s{}", study_id))
    }

    pub fn report_path(&self, subject_id: &str, study_id: &str) -> PathBuf {
        self.subject_dir(subject_id).join(format!("s{}.txt", study_id))
    }

    pub fn image_path(&self, subject_id: &str, study_id: &str, dicom_id: &str) -> PathBuf {
        self.study_dir(subject_id, study_id).join(format!("{}.jpg", dicom_id))
    }

    pub fn check(&self) -> Result<(), FilerError> {
        let files = self.files_dir();
        if !files.is_dir() {
            return Err(FilerError::Missing {
                what: "MIMIC-CXR files directory",
                path: files,
            });
        }
        debug!("MIMIC-CXR found at {}", self.download_directory.display());
        Ok(())
    }

    // subject ids are grouped by their first two digits: p10/p10000032
    fn subject_dir(&self, subject_id: &str) -> PathBuf {
        let group: String = subject_id.chars().take(2).collect();
        self.files_dir()
            .join(format!("p{}", group))
            .join(format!("p{}", subject_id))
    }
}

/// Written next to the split indexes once `prepare_data` completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedMarker {
    pub prepared_at: DateTime<Utc>,
    pub slices: Vec<String>,
}

/// Local copy of the Chest ImaGenome dataset.
#[derive(Debug, Clone)]
pub struct ImaGenomeFiler {
    download_directory: PathBuf,
    credentials: PhysioNetCredentials,
}

impl ImaGenomeFiler {
    pub const SLICES: [&'static str; 4] = ["train", "valid", "test", "gold"];

    pub fn new(download_directory: impl Into<PathBuf>, credentials: PhysioNetCredentials) -> Self {
        ImaGenomeFiler {
            download_directory: download_directory.into(),
            credentials,
        }
    }

    pub fn download_directory(&self) -> &Path {
        &self.download_directory
    }

    pub fn credentials(&self) -> &PhysioNetCredentials {
        &self.credentials
    }

    pub fn split_path(&self, slice: &str) -> Result<PathBuf, FilerError> {
        match slice {
            "gold" => Ok(self.download_directory.join("gold_dataset").join("gold_split.csv")),
            "train" | "valid" | "test" => Ok(self
                .download_directory
                .join("silver_dataset")
                .join("splits")
                .join(format!("{}.csv", slice))),
            other => Err(FilerError::UnknownSlice(other.to_string())),
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.download_directory.join(INDEX_DIR)
    }

    pub fn index_path(&self, slice: &str) -> PathBuf {
        self.index_dir().join(format!("{}.json", slice))
    }

    pub fn check(&self, slices: &[&str]) -> Result<(), FilerError> {
        for slice in slices {
            let path = self.split_path(slice)?;
            if !path.is_file() {
                return Err(FilerError::Missing {
                    what: "ImaGenome split file",
                    path,
                });
            }
        }
        Ok(())
    }

    pub fn mark_prepared(&self, slices: &[&str]) -> Result<PreparedMarker, FilerError> {
        fs::create_dir_all(self.index_dir())?;
        let marker = PreparedMarker {
            prepared_at: Utc::now(),
            slices: slices.iter().map(|s| s.to_string()).collect(),
        };
        fs::write(self.index_dir().join(PREPARED_FILE), serde_json::to_vec_pretty(&marker)?)?;
        info!("ImaGenome prepared at {}", marker.prepared_at);
        Ok(marker)
    }

    pub fn prepared_marker(&self) -> Result<Option<PreparedMarker>, FilerError> {
        let path = self.index_dir().join(PREPARED_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let marker = serde_json::from_slice(&fs::read(path)?)?;
        Ok(Some(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> PhysioNetCredentials {
        PhysioNetCredentials::new("user", "pw")
    }

    #[test]
    fn mimic_paths_follow_subject_grouping() {
        let filer = MimicCxrFiler::new("/data/mimic", credentials());
        assert_eq!(
            filer.report_path("10000032", "50414267"),
            PathBuf::from("/data/mimic/files/p10/p10000032/s50414267.txt")
        );
        assert_eq!(
            filer.image_path("10000032", "50414267", "abc"),
            PathBuf::from("/data/mimic/files/p10/p10000032/s50414267/abc.jpg")
        );
    }

    #[test]
    fn mimic_check_requires_files_dir() {
        let dir = tempfile::tempdir().unwrap();
        let filer = MimicCxrFiler::new(dir.path(), credentials());
        assert!(matches!(filer.check(), Err(FilerError::Missing { .. })));

        fs::create_dir_all(dir.path().join("files")).unwrap();
        assert!(filer.check().is_ok());
    }

    #[test]
    fn imagenome_split_paths() {
        let filer = ImaGenomeFiler::new("/data/imagenome", credentials());
        assert_eq!(
            filer.split_path("valid").unwrap(),
            PathBuf::from("/data/imagenome/silver_dataset/splits/valid.csv")
        );
        assert_eq!(
            filer.split_path("gold").unwrap(),
            PathBuf::from("/data/imagenome/gold_dataset/gold_split.csv")
        );
        assert!(matches!(filer.split_path("dev"), Err(FilerError::UnknownSlice(_))));
    }

    #[test]
    fn prepared_marker_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let filer = ImaGenomeFiler::new(dir.path(), credentials());
        assert!(filer.prepared_marker().unwrap().is_none());

        let written = filer.mark_prepared(&["train", "test"]).unwrap();
        let read = filer.prepared_marker().unwrap().unwrap();
        assert_eq!(written, read);
        assert_eq!(read.slices, vec!["train", "test"]);
    }
}
