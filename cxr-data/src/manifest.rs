use std::path::{Path, PathBuf};

use log::debug;
use polars::prelude::*;
use rand::{rngs::StdRng, seq::index, SeedableRng};

use crate::DataError;

/// A CSV manifest loaded through polars.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    frame: DataFrame,
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self, DataError> {
        let frame = Self::scan(path)?
            .collect()
            .map_err(|source| polars_error(path, source))?;
        Self::loaded(path, frame)
    }

    /// Reads only the rows whose `column` equals `value`.
    pub fn read_where(path: &Path, column: &str, value: &str) -> Result<Self, DataError> {
        let lazy = Self::scan(path)?;
        let schema = lazy.schema().map_err(|source| polars_error(path, source))?;
        if schema.get(column).is_none() {
            return Err(DataError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
        let frame = lazy
            .filter(col(column).eq(lit(value)))
            .collect()
            .map_err(|source| polars_error(path, source))?;
        Self::loaded(path, frame)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.get_column_names().contains(&column)
    }

    /// Every value of `column` as text; an empty cell is an error.
    pub fn strings(&self, column: &str) -> Result<Vec<String>, DataError> {
        self.optional_strings(column)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| DataError::MissingValue {
                    path: self.path.clone(),
                    column: column.to_string(),
                    row,
                })
            })
            .collect()
    }

    pub fn optional_strings(&self, column: &str) -> Result<Vec<Option<String>>, DataError> {
        let series = self
            .column(column)?
            .cast(&DataType::Utf8)
            .map_err(|source| polars_error(&self.path, source))?;
        let values = series.utf8().map_err(|source| polars_error(&self.path, source))?;
        Ok(values
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    pub fn floats(&self, column: &str) -> Result<Vec<Option<f64>>, DataError> {
        let series = self
            .column(column)?
            .cast(&DataType::Float64)
            .map_err(|source| polars_error(&self.path, source))?;
        let values = series.f64().map_err(|source| polars_error(&self.path, source))?;
        Ok(values.into_iter().collect())
    }

    fn column(&self, column: &str) -> Result<&Series, DataError> {
        if !self.has_column(column) {
            return Err(DataError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            });
        }
        self.frame
            .column(column)
            .map_err(|source| polars_error(&self.path, source))
    }

    fn scan(path: &Path) -> Result<LazyFrame, DataError> {
        LazyCsvReader::new(path)
            .has_header(true)
            .finish()
            .map_err(|source| polars_error(path, source))
    }

    fn loaded(path: &Path, frame: DataFrame) -> Result<Self, DataError> {
        debug!("Read {} rows from {}", frame.height(), path.display());
        Ok(Manifest {
            path: path.to_path_buf(),
            frame,
        })
    }
}

fn polars_error(path: &Path, source: PolarsError) -> DataError {
    DataError::Polars {
        path: path.to_path_buf(),
        source,
    }
}

/// Keeps a seeded random `frac` of the records, in manifest order.
pub fn sample_fraction<T>(records: Vec<T>, frac: f64, seed: u64) -> Vec<T> {
    if frac >= 1.0 {
        return records;
    }
    let amount = ((records.len() as f64) * frac.max(0.0)).round() as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = index::sample(&mut rng, records.len(), amount).into_vec();
    keep.sort_unstable();

    let mut keep = keep.into_iter().peekable();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(record)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("manifest.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_strings_and_floats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Path,Label\na.png,1\nb.png,\n");

        let manifest = Manifest::read(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.strings("Path").unwrap(), vec!["a.png", "b.png"]);
        assert_eq!(manifest.floats("Label").unwrap(), vec![Some(1.0), None]);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Path\na.png\n");

        let manifest = Manifest::read(&path).unwrap();
        assert!(matches!(manifest.floats("Label"), Err(DataError::MissingColumn { .. })));
        assert!(matches!(
            Manifest::read_where(&path, "View", "Frontal"),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn read_where_filters_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "Path,View\na.png,Frontal\nb.png,Lateral\nc.png,Frontal\n");

        let manifest = Manifest::read_where(&path, "View", "Frontal").unwrap();
        assert_eq!(manifest.strings("Path").unwrap(), vec!["a.png", "c.png"]);
    }

    #[test]
    fn sample_fraction_is_seeded_and_ordered() {
        let records: Vec<usize> = (0..100).collect();
        let a = sample_fraction(records.clone(), 0.25, 7);
        let b = sample_fraction(records.clone(), 0.25, 7);
        assert_eq!(a.len(), 25);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_fraction(records.clone(), 1.0, 7), records);
    }
}
