//! Chest ImaGenome pretraining on top of a local MIMIC-CXR copy.
//!
//! `prepare_data` turns each ImaGenome split file into an index of resolved
//! image and report paths, cached as JSON next to the dataset. Loaders serve
//! raw instances; the collate functions transform and tokenize them.

use std::{
    collections::HashMap,
    fmt, fs,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    thread,
};

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{Dataset, DatasetIterator},
    },
    tensor::backend::Backend,
};
use cxr_data::{read_imagenome_split, ImaGenomeRow, Split};
use cxr_transforms::{read_xray, ImageTensor};
use log::{debug, info, warn};
use logging_timer::time;
use physio_api::{ImaGenomeFiler, MimicCxrFiler, PhysioNetCredentials};
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        collate::{GloriaCollateFn, MultimodalBatch},
        data_module::DataModule,
        dataset::Loaded,
        loader::{DataLoader, DataLoaderBuilder, LoaderOptions},
        tokenizer::Tokenizer,
    },
    DataModuleError, DatasetError, ExperimentConfig, ImaGenomeError,
};

pub const DEFAULT_SPLIT_SLICES: &str = "train,valid,test,gold";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slice {
    Train,
    Valid,
    Test,
    Gold,
}

impl Slice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slice::Train => "train",
            Slice::Valid => "valid",
            Slice::Test => "test",
            Slice::Gold => "gold",
        }
    }

    /// Parses a comma separated list such as `train,valid,test,gold`.
    pub fn parse_list(list: &str) -> Result<Vec<Slice>, ImaGenomeError> {
        let mut slices = Vec::new();
        for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let slice = name.parse()?;
            if !slices.contains(&slice) {
                slices.push(slice);
            }
        }
        Ok(slices)
    }
}

impl From<Split> for Slice {
    fn from(split: Split) -> Self {
        match split {
            Split::Train => Slice::Train,
            Split::Valid => Slice::Valid,
            Split::Test => Slice::Test,
        }
    }
}

impl FromStr for Slice {
    type Err = ImaGenomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Slice::Train),
            "valid" => Ok(Slice::Valid),
            "test" => Ok(Slice::Test),
            "gold" => Ok(Slice::Gold),
            other => Err(ImaGenomeError::UnknownSlice(other.to_string())),
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed image. Paths are `None` when not requested or not on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImaGenomeEntry {
    pub dicom_id: String,
    pub subject_id: String,
    pub study_id: String,
    pub image_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

/// Untransformed item handed to the ImaGenome collate functions.
#[derive(Debug, Clone)]
pub struct ImaGenomeInstance {
    pub dicom_id: String,
    pub image: Option<ImageTensor>,
    pub report: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexCache {
    get_images: bool,
    get_reports: bool,
    entries: Vec<ImaGenomeEntry>,
}

pub struct ImaGenomeDataset {
    entries: Arc<Vec<ImaGenomeEntry>>,
    imsize: u32,
}

impl ImaGenomeDataset {
    pub fn new(entries: Arc<Vec<ImaGenomeEntry>>, imsize: u32) -> Self {
        ImaGenomeDataset { entries, imsize }
    }

    fn load(&self, entry: &ImaGenomeEntry) -> Loaded<ImaGenomeInstance> {
        let image = match &entry.image_path {
            Some(path) => Some(read_xray(path, self.imsize)?.0),
            None => None,
        };
        let report = match &entry.report_path {
            Some(path) => Some(fs::read_to_string(path).map_err(|source| DatasetError::Report {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        Ok(ImaGenomeInstance {
            dicom_id: entry.dicom_id.clone(),
            image,
            report,
        })
    }
}

impl Dataset<Loaded<ImaGenomeInstance>> for ImaGenomeDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Option<Loaded<ImaGenomeInstance>> {
        self.entries.get(index).map(|entry| self.load(entry))
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn iter(&self) -> DatasetIterator<'_, Loaded<ImaGenomeInstance>> {
        DatasetIterator::new(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImaGenomeOptions {
    pub batch_size: usize,
    pub num_workers: usize,
    pub get_images: bool,
    pub get_reports: bool,
    /// Rebuild the split indexes even when a cache exists.
    pub force: bool,
    pub parallel: bool,
    pub num_preprocessing_workers: usize,
    pub chunksize: usize,
    pub split_slices: String,
    /// Serve the gold slice from the test loader.
    pub gold_test: bool,
    pub imsize: u32,
    pub seed: u64,
}

impl Default for ImaGenomeOptions {
    fn default() -> Self {
        ImaGenomeOptions {
            batch_size: 64,
            num_workers: 4,
            get_images: true,
            get_reports: true,
            force: false,
            parallel: false,
            num_preprocessing_workers: 1,
            chunksize: 1,
            split_slices: String::from(DEFAULT_SPLIT_SLICES),
            gold_test: false,
            imsize: 256,
            seed: 42,
        }
    }
}

fn resolve_row(mimic: &MimicCxrFiler, options: &ImaGenomeOptions, row: ImaGenomeRow) -> ImaGenomeEntry {
    let image_path = Some(mimic.image_path(&row.subject_id, &row.study_id, &row.dicom_id))
        .filter(|path| options.get_images && path.is_file());
    let report_path = Some(mimic.report_path(&row.subject_id, &row.study_id))
        .filter(|path| options.get_reports && path.is_file());
    ImaGenomeEntry {
        dicom_id: row.dicom_id,
        subject_id: row.subject_id,
        study_id: row.study_id,
        image_path,
        report_path,
    }
}

/// Resolves rows on `num_preprocessing_workers` scoped threads. Chunk `i`
/// goes to worker `i % n`; the result keeps manifest order. A worker that
/// panics fails the whole index rather than leaving holes in it.
fn resolve_parallel<F>(
    options: &ImaGenomeOptions,
    rows: Vec<ImaGenomeRow>,
    resolve: F,
) -> Result<Vec<ImaGenomeEntry>, ImaGenomeError>
where
    F: Fn(ImaGenomeRow) -> ImaGenomeEntry + Sync,
{
    let workers = options.num_preprocessing_workers.max(1);
    let chunks: Vec<Vec<ImaGenomeRow>> = rows.chunks(options.chunksize.max(1)).map(<[ImaGenomeRow]>::to_vec).collect();
    let mut assigned: Vec<Vec<(usize, Vec<ImaGenomeRow>)>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, chunk) in chunks.into_iter().enumerate() {
        assigned[i % workers].push((i, chunk));
    }

    let resolve = &resolve;
    let (mut resolved, failed) = thread::scope(|scope| {
        let handles: Vec<_> = assigned
            .into_iter()
            .map(|work| {
                scope.spawn(move || {
                    work.into_iter()
                        .map(|(i, chunk)| (i, chunk.into_iter().map(resolve).collect::<Vec<_>>()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        // every handle is joined so the scope never re-raises the panic
        let mut resolved = Vec::new();
        let mut failed = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(chunks) => resolved.extend(chunks),
                Err(_) => {
                    failed.get_or_insert(worker);
                }
            }
        }
        (resolved, failed)
    });
    if let Some(worker) = failed {
        return Err(ImaGenomeError::WorkerPanicked { worker });
    }
    resolved.sort_by_key(|(i, _)| *i);
    Ok(resolved.into_iter().flat_map(|(_, entries)| entries).collect())
}

type SharedCollate<O> = Arc<dyn Batcher<ImaGenomeInstance, O>>;

/// Generic ImaGenome lifecycle over a `(train, valid, test)` collate triple.
pub struct ImaGenomeDataModule<O> {
    mimic: MimicCxrFiler,
    imagenome: ImaGenomeFiler,
    collate_fn: (SharedCollate<O>, SharedCollate<O>, SharedCollate<O>),
    options: ImaGenomeOptions,
    slices: Vec<Slice>,
    indexes: HashMap<Slice, Arc<Vec<ImaGenomeEntry>>>,
    prepared: bool,
}

impl<O> ImaGenomeDataModule<O> {
    pub fn new(
        mimic: MimicCxrFiler,
        imagenome: ImaGenomeFiler,
        collate_fn: (SharedCollate<O>, SharedCollate<O>, SharedCollate<O>),
        options: ImaGenomeOptions,
    ) -> Result<Self, ImaGenomeError> {
        let slices = Slice::parse_list(&options.split_slices)?;
        Ok(ImaGenomeDataModule {
            mimic,
            imagenome,
            collate_fn,
            options,
            slices,
            indexes: HashMap::new(),
            prepared: false,
        })
    }

    pub fn options(&self) -> &ImaGenomeOptions {
        &self.options
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn mimic_filer(&self) -> &MimicCxrFiler {
        &self.mimic
    }

    pub fn imagenome_filer(&self) -> &ImaGenomeFiler {
        &self.imagenome
    }

    /// Index of `slice`, available once `prepare_data` has run.
    pub fn entries(&self, slice: Slice) -> Option<&[ImaGenomeEntry]> {
        self.indexes.get(&slice).map(|entries| entries.as_slice())
    }

    #[time("info")]
    pub fn prepare(&mut self) -> Result<(), ImaGenomeError> {
        self.mimic.check()?;
        let names: Vec<&str> = self.slices.iter().map(Slice::as_str).collect();
        self.imagenome.check(&names)?;

        for slice in self.slices.clone() {
            let entries = self.load_or_build_index(slice)?;
            info!("ImaGenome {}: {} images indexed", slice, entries.len());
            self.indexes.insert(slice, Arc::new(entries));
        }

        self.imagenome.mark_prepared(&names)?;
        self.prepared = true;
        Ok(())
    }

    fn load_or_build_index(&self, slice: Slice) -> Result<Vec<ImaGenomeEntry>, ImaGenomeError> {
        let path = self.imagenome.index_path(slice.as_str());
        if !self.options.force && path.is_file() {
            let cache: IndexCache =
                serde_json::from_slice(&fs::read(&path)?).map_err(|source| ImaGenomeError::Cache {
                    path: path.clone(),
                    source,
                })?;
            if cache.get_images == self.options.get_images && cache.get_reports == self.options.get_reports {
                debug!("Using cached {} index {}", slice, path.display());
                return Ok(cache.entries);
            }
            debug!("Cached {} index was built with other options, rebuilding", slice);
        }

        let rows = read_imagenome_split(&self.imagenome.split_path(slice.as_str())?)?;
        let entries = self.build_index(rows)?;
        let missing_images = entries.iter().filter(|e| e.image_path.is_none()).count();
        let missing_reports = entries.iter().filter(|e| e.report_path.is_none()).count();
        if self.options.get_images && missing_images > 0 {
            warn!("ImaGenome {}: {} images not found", slice, missing_images);
        }
        if self.options.get_reports && missing_reports > 0 {
            warn!("ImaGenome {}: {} reports not found", slice, missing_reports);
        }

        let cache = IndexCache {
            get_images: self.options.get_images,
            get_reports: self.options.get_reports,
            entries,
        };
        fs::create_dir_all(self.imagenome.index_dir())?;
        let json = serde_json::to_vec(&cache).map_err(|source| ImaGenomeError::Cache {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json)?;
        Ok(cache.entries)
    }

    fn build_index(&self, rows: Vec<ImaGenomeRow>) -> Result<Vec<ImaGenomeEntry>, ImaGenomeError> {
        let resolve = |row| resolve_row(&self.mimic, &self.options, row);
        if self.options.parallel && self.options.num_preprocessing_workers > 1 {
            debug!(
                "Resolving {} rows on {} workers, chunksize {}",
                rows.len(),
                self.options.num_preprocessing_workers,
                self.options.chunksize
            );
            resolve_parallel(&self.options, rows, resolve)
        } else {
            Ok(rows.into_iter().map(resolve).collect())
        }
    }

    fn loader(
        &self,
        split: Split,
        slice: Slice,
        collate: &SharedCollate<O>,
    ) -> Result<DataLoader<ImaGenomeInstance, O>, DataModuleError> {
        if !self.prepared {
            return Err(ImaGenomeError::NotPrepared(split.as_str()).into());
        }
        let entries = self
            .indexes
            .get(&slice)
            .ok_or(ImaGenomeError::SliceNotLoaded(slice.as_str()))?;
        let options = LoaderOptions::for_split(split, self.options.batch_size, self.options.num_workers, self.options.seed);
        let dataset = ImaGenomeDataset::new(Arc::clone(entries), self.options.imsize);
        Ok(DataLoaderBuilder::from_shared(Arc::clone(collate))
            .with_options(options)
            .build(dataset)?)
    }
}

impl<O> DataModule for ImaGenomeDataModule<O> {
    type Item = ImaGenomeInstance;
    type Batch = O;

    fn prepare_data(&mut self) -> Result<(), DataModuleError> {
        Ok(self.prepare()?)
    }

    fn train_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, O>, DataModuleError> {
        self.loader(Split::Train, Slice::Train, &self.collate_fn.0)
    }

    fn val_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, O>, DataModuleError> {
        self.loader(Split::Valid, Slice::Valid, &self.collate_fn.1)
    }

    fn test_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, O>, DataModuleError> {
        let slice = if self.options.gold_test { Slice::Gold } else { Slice::Test };
        self.loader(Split::Test, slice, &self.collate_fn.2)
    }
}

/// ImaGenome pretraining with GLoRIA-style collation, configured from an
/// experiment config.
pub struct ImaGenomePretrainingDataModule<B: Backend> {
    cfg: Arc<ExperimentConfig>,
    inner: ImaGenomeDataModule<MultimodalBatch<B>>,
}

impl<B: Backend> ImaGenomePretrainingDataModule<B> {
    pub fn new(cfg: Arc<ExperimentConfig>, device: B::Device) -> Result<Self, DataModuleError> {
        let credentials = PhysioNetCredentials::load(&cfg.data.physionet_config)?;
        Self::with_credentials(cfg, credentials, device)
    }

    pub fn with_credentials(
        cfg: Arc<ExperimentConfig>,
        credentials: PhysioNetCredentials,
        device: B::Device,
    ) -> Result<Self, DataModuleError> {
        let mimic = MimicCxrFiler::new(&cfg.data.mimic_cxr_dir, credentials);
        let imagenome = ImaGenomeFiler::new(&cfg.data.imagenome_dir, mimic.credentials().clone());

        let tokenizer = Arc::new(
            Tokenizer::from_vocab_file(&cfg.data.text.vocab_path, cfg.data.text.word_num).map_err(DatasetError::from)?,
        );
        let collate = |split: Split| -> Result<SharedCollate<MultimodalBatch<B>>, DataModuleError> {
            Ok(Arc::new(GloriaCollateFn::<B>::with_tokenizer(
                &cfg,
                split,
                Arc::clone(&tokenizer),
                device.clone(),
            )?))
        };
        let collate_fn = (collate(Split::Train)?, collate(Split::Test)?, collate(Split::Test)?);

        let options = ImaGenomeOptions {
            batch_size: cfg.train.batch_size,
            num_workers: cfg.train.num_workers,
            num_preprocessing_workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            imsize: cfg.data.image.imsize,
            seed: cfg.train.seed,
            ..ImaGenomeOptions::default()
        };
        let inner = ImaGenomeDataModule::new(mimic, imagenome, collate_fn, options)?;
        Ok(Self { cfg, inner })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.cfg
    }

    pub fn inner(&self) -> &ImaGenomeDataModule<MultimodalBatch<B>> {
        &self.inner
    }
}

impl<B: Backend> DataModule for ImaGenomePretrainingDataModule<B> {
    type Item = ImaGenomeInstance;
    type Batch = MultimodalBatch<B>;

    fn prepare_data(&mut self) -> Result<(), DataModuleError> {
        self.inner.prepare_data()
    }

    fn train_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, MultimodalBatch<B>>, DataModuleError> {
        self.inner.train_dataloader()
    }

    fn val_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, MultimodalBatch<B>>, DataModuleError> {
        self.inner.val_dataloader()
    }

    fn test_dataloader(&self) -> Result<DataLoader<ImaGenomeInstance, MultimodalBatch<B>>, DataModuleError> {
        self.inner.test_dataloader()
    }
}
