//! Batched loading over a burn `Dataset` with a burn `Batcher` as collate
//! function.
//!
//! Built through [`DataLoaderBuilder`], mirroring burn's own builder, with
//! the extra `drop_last` and `pin_memory` flags. Each epoch draws a fresh
//! seeded permutation when shuffling is enabled. With `num_workers > 0`,
//! batch `i` is assembled by worker `i % num_workers` and batches are still
//! yielded in order.

use std::{
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
};

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use cxr_data::Split;
use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{data::dataset::Loaded, LoaderError, TrainConfig};

/// Batches each worker may have ready ahead of the consumer.
const PREFETCH_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub num_workers: usize,
    /// Seed of the per-epoch permutation; `None` keeps dataset order.
    pub shuffle: Option<u64>,
    pub drop_last: bool,
    pub pin_memory: bool,
}

impl LoaderOptions {
    /// Fixed per-split policy shared by every data module.
    pub fn for_split(split: Split, batch_size: usize, num_workers: usize, seed: u64) -> Self {
        let (drop_last, shuffle) = match split {
            Split::Train => (true, Some(seed)),
            Split::Valid => (true, None),
            Split::Test => (false, None),
        };
        LoaderOptions {
            batch_size,
            num_workers,
            shuffle,
            drop_last,
            pin_memory: true,
        }
    }

    pub fn from_config(train: &TrainConfig, split: Split) -> Self {
        Self::for_split(split, train.batch_size, train.num_workers, train.seed)
    }
}

pub struct DataLoaderBuilder<I, O> {
    batcher: Arc<dyn Batcher<I, O>>,
    options: LoaderOptions,
}

impl<I, O> DataLoaderBuilder<I, O> {
    pub fn new<C: Batcher<I, O> + 'static>(batcher: C) -> Self {
        Self::from_shared(Arc::new(batcher))
    }

    pub fn from_shared(batcher: Arc<dyn Batcher<I, O>>) -> Self {
        Self {
            batcher,
            options: LoaderOptions {
                batch_size: 1,
                num_workers: 0,
                shuffle: None,
                drop_last: false,
                pin_memory: false,
            },
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.options.batch_size = batch_size;
        self
    }

    pub fn shuffle(mut self, seed: u64) -> Self {
        self.options.shuffle = Some(seed);
        self
    }

    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.options.num_workers = num_workers;
        self
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.options.drop_last = drop_last;
        self
    }

    pub fn pin_memory(mut self, pin_memory: bool) -> Self {
        self.options.pin_memory = pin_memory;
        self
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build<D>(self, dataset: D) -> Result<DataLoader<I, O>, LoaderError>
    where
        D: Dataset<Loaded<I>> + 'static,
    {
        if self.options.batch_size == 0 {
            return Err(LoaderError::ZeroBatchSize);
        }
        let loader = DataLoader {
            dataset: Arc::new(dataset),
            batcher: self.batcher,
            options: self.options,
        };
        info!(
            "Loader over {} items: batch size {}, {} workers, shuffle {}, drop_last {}, pin_memory {}",
            loader.num_items(),
            loader.batch_size(),
            loader.num_workers(),
            loader.is_shuffled(),
            loader.drop_last(),
            loader.pin_memory()
        );
        Ok(loader)
    }
}

pub struct DataLoader<I, O> {
    dataset: Arc<dyn Dataset<Loaded<I>>>,
    batcher: Arc<dyn Batcher<I, O>>,
    options: LoaderOptions,
}

impl<I, O> DataLoader<I, O> {
    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.options.num_workers
    }

    pub fn is_shuffled(&self) -> bool {
        self.options.shuffle.is_some()
    }

    pub fn drop_last(&self) -> bool {
        self.options.drop_last
    }

    pub fn pin_memory(&self) -> bool {
        self.options.pin_memory
    }

    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    pub fn num_batches(&self) -> usize {
        let (items, size) = (self.num_items(), self.options.batch_size);
        if self.options.drop_last {
            items / size
        } else {
            (items + size - 1) / size
        }
    }

    /// Dataset indices of every batch of `epoch`, in delivery order.
    pub fn batch_indices(&self, epoch: u64) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.num_items()).collect();
        if let Some(seed) = self.options.shuffle {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch));
            indices.shuffle(&mut rng);
        }
        let mut batches: Vec<Vec<usize>> = indices.chunks(self.options.batch_size).map(<[usize]>::to_vec).collect();
        if self.options.drop_last && batches.last().map_or(false, |b| b.len() < self.options.batch_size) {
            batches.pop();
        }
        batches
    }
}

impl<I: Send + 'static, O: Send + 'static> DataLoader<I, O> {
    pub fn iter(&self, epoch: u64) -> DataLoaderIter<I, O> {
        let batches = self.batch_indices(epoch);
        let total = batches.len();
        let workers = self.options.num_workers.min(total);
        debug!("Epoch {}: {} batches on {} workers", epoch, total, workers);

        let mut receivers = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let assigned: Vec<Vec<usize>> = batches.iter().skip(worker).step_by(workers).cloned().collect();
            let (sender, receiver) = mpsc::sync_channel(PREFETCH_FACTOR);
            let dataset = Arc::clone(&self.dataset);
            let batcher = Arc::clone(&self.batcher);
            handles.push(thread::spawn(move || {
                for indices in assigned {
                    let batch = load_batch(dataset.as_ref(), batcher.as_ref(), &indices);
                    if sender.send(batch).is_err() {
                        // iterator dropped
                        break;
                    }
                }
            }));
            receivers.push(receiver);
        }

        DataLoaderIter {
            dataset: Arc::clone(&self.dataset),
            batcher: Arc::clone(&self.batcher),
            batches: if workers == 0 { batches } else { Vec::new() },
            position: 0,
            total,
            receivers,
            handles,
        }
    }
}

fn load_batch<I, O>(
    dataset: &dyn Dataset<Loaded<I>>,
    batcher: &dyn Batcher<I, O>,
    indices: &[usize],
) -> Result<O, LoaderError> {
    let mut items = Vec::with_capacity(indices.len());
    for &index in indices {
        let item = dataset.get(index).ok_or(LoaderError::MissingItem { index })??;
        items.push(item);
    }
    Ok(batcher.batch(items))
}

/// One epoch of batches. Dropping it stops and joins the workers.
pub struct DataLoaderIter<I, O> {
    dataset: Arc<dyn Dataset<Loaded<I>>>,
    batcher: Arc<dyn Batcher<I, O>>,
    batches: Vec<Vec<usize>>,
    position: usize,
    total: usize,
    receivers: Vec<Receiver<Result<O, LoaderError>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<I, O> DataLoaderIter<I, O> {
    pub fn remaining(&self) -> usize {
        self.total - self.position
    }
}

impl<I, O> Iterator for DataLoaderIter<I, O> {
    type Item = Result<O, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let position = self.position;
        self.position += 1;

        if self.receivers.is_empty() {
            let indices = &self.batches[position];
            return Some(load_batch(self.dataset.as_ref(), self.batcher.as_ref(), indices));
        }
        let worker = position % self.receivers.len();
        Some(
            self.receivers[worker]
                .recv()
                .unwrap_or(Err(LoaderError::WorkerDisconnected { worker })),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<I, O> ExactSizeIterator for DataLoaderIter<I, O> {}

impl<I, O> Drop for DataLoaderIter<I, O> {
    fn drop(&mut self) {
        // closing the channels unblocks workers waiting on a full buffer
        self.receivers.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatasetError;
    use burn::data::dataset::DatasetIterator;
    use cxr_transforms::TransformError;

    struct Numbers {
        len: usize,
        broken: Option<usize>,
    }

    impl Dataset<Loaded<usize>> for Numbers {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: usize) -> Option<Loaded<usize>> {
            if index >= self.len {
                return None;
            }
            if Some(index) == self.broken {
                return Some(Err(DatasetError::Transform(TransformError::UnknownNorm("broken".to_string()))));
            }
            Some(Ok(index))
        }

        fn is_empty(&self) -> bool {
            self.len == 0
        }

        fn iter(&self) -> DatasetIterator<'_, Loaded<usize>> {
            DatasetIterator::new(self)
        }
    }

    struct Collect;

    impl Batcher<usize, Vec<usize>> for Collect {
        fn batch(&self, items: Vec<usize>) -> Vec<usize> {
            items
        }
    }

    fn numbers(len: usize) -> Numbers {
        Numbers { len, broken: None }
    }

    fn collect(loader: &DataLoader<usize, Vec<usize>>, epoch: u64) -> Vec<Vec<usize>> {
        loader.iter(epoch).map(|batch| batch.unwrap()).collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = DataLoaderBuilder::new(Collect).batch_size(0).build(numbers(4));
        assert!(matches!(result, Err(LoaderError::ZeroBatchSize)));
    }

    #[test]
    fn keeps_partial_batch_unless_drop_last() {
        let loader = DataLoaderBuilder::new(Collect).batch_size(4).build(numbers(10)).unwrap();
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(collect(&loader, 0), vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);

        let loader = DataLoaderBuilder::new(Collect)
            .batch_size(4)
            .drop_last(true)
            .build(numbers(10))
            .unwrap();
        assert_eq!(loader.num_batches(), 2);
        assert_eq!(collect(&loader, 0).len(), 2);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation_per_epoch() {
        let loader = DataLoaderBuilder::new(Collect)
            .batch_size(5)
            .shuffle(3)
            .build(numbers(50))
            .unwrap();
        let epoch0: Vec<usize> = collect(&loader, 0).concat();
        let again: Vec<usize> = collect(&loader, 0).concat();
        let epoch1: Vec<usize> = collect(&loader, 1).concat();

        assert_eq!(epoch0, again);
        assert_ne!(epoch0, epoch1);
        assert_ne!(epoch0, (0..50).collect::<Vec<_>>());
        let mut sorted = epoch0.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn workers_deliver_batches_in_order() {
        let inline = DataLoaderBuilder::new(Collect)
            .batch_size(3)
            .shuffle(9)
            .build(numbers(40))
            .unwrap();
        let threaded = DataLoaderBuilder::new(Collect)
            .batch_size(3)
            .shuffle(9)
            .num_workers(3)
            .build(numbers(40))
            .unwrap();
        assert_eq!(collect(&inline, 2), collect(&threaded, 2));
    }

    #[test]
    fn dropping_the_iterator_early_stops_workers() {
        let loader = DataLoaderBuilder::new(Collect)
            .batch_size(1)
            .num_workers(2)
            .build(numbers(100))
            .unwrap();
        let mut iter = loader.iter(0);
        assert_eq!(iter.next().unwrap().unwrap(), vec![0]);
        assert_eq!(iter.remaining(), 99);
        drop(iter);
    }

    #[test]
    fn dataset_errors_reach_the_caller() {
        for workers in [0, 2] {
            let loader = DataLoaderBuilder::new(Collect)
                .batch_size(2)
                .num_workers(workers)
                .build(Numbers {
                    len: 6,
                    broken: Some(3),
                })
                .unwrap();
            let results: Vec<_> = loader.iter(0).collect();
            assert_eq!(results.len(), 3);
            assert!(results[0].is_ok());
            assert!(matches!(
                results[1],
                Err(LoaderError::Dataset(DatasetError::Transform(TransformError::UnknownNorm(_))))
            ));
            assert!(results[2].is_ok());
        }
    }

    #[test]
    fn split_policy_table() {
        let train = TrainConfig::new().with_batch_size(8).with_num_workers(2);

        let options = LoaderOptions::from_config(&train, Split::Train);
        assert_eq!((options.drop_last, options.shuffle), (true, Some(42)));

        let options = LoaderOptions::from_config(&train, Split::Valid);
        assert_eq!((options.drop_last, options.shuffle), (true, None));

        let options = LoaderOptions::from_config(&train, Split::Test);
        assert_eq!((options.drop_last, options.shuffle), (false, None));

        for split in Split::ALL {
            let options = LoaderOptions::from_config(&train, split);
            assert_eq!(options.batch_size, 8);
            assert_eq!(options.num_workers, 2);
            assert!(options.pin_memory);
        }
    }
}
