//! Batch iteration over a [`MixtureDataset`].
//!
//! With `num_workers == 0` items are read on the calling thread. Otherwise
//! the consumer keeps up to `prefetch` `(order_idx, sample_idx)` reads queued
//! on a rayon pool of `num_workers` threads. Results come back on a channel
//! and out-of-order ones are buffered so batches always follow the epoch
//! order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use ndarray::{ArrayD, Axis, IxDyn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::MixtureDataset;
use crate::{
    error::{DatasetError, Result},
    types::{Batch, MixtureItem},
};

const EPOCH_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub drop_last: bool,
    pub num_workers: usize,
    /// Results buffered ahead of the consumer. Defaults to `batch_size * num_workers`.
    pub prefetch: Option<usize>,
    /// Keep one worker pool for the lifetime of the loader instead of one per epoch.
    pub persistent_workers: bool,
    /// Accepted for parity with GPU loaders; arrays here always live in host memory.
    pub pin_memory: bool,
    pub seed: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 8,
            shuffle: false,
            drop_last: false,
            num_workers: 0,
            prefetch: None,
            persistent_workers: false,
            pin_memory: false,
            seed: 0,
        }
    }
}

pub fn worker_pool(num_workers: usize) -> Result<Arc<ThreadPool>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|idx| format!("DataLoader Worker {idx}"))
        .build()?;
    Ok(Arc::new(pool))
}

pub struct DataLoader {
    ds: Arc<dyn MixtureDataset>,
    opts: LoaderOptions,
    pool: Option<Arc<ThreadPool>>,
}

impl DataLoader {
    pub fn new(ds: Arc<dyn MixtureDataset>, opts: LoaderOptions) -> Result<Self> {
        let pool = if opts.num_workers > 0 && opts.persistent_workers {
            Some(worker_pool(opts.num_workers)?)
        } else {
            None
        };
        Self::build(ds, opts, pool)
    }

    /// Use an existing pool, e.g. one shared by all splits of a data module.
    pub fn with_pool(
        ds: Arc<dyn MixtureDataset>,
        opts: LoaderOptions,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        Self::build(ds, opts, Some(pool))
    }

    fn build(
        ds: Arc<dyn MixtureDataset>,
        opts: LoaderOptions,
        pool: Option<Arc<ThreadPool>>,
    ) -> Result<Self> {
        if opts.batch_size == 0 {
            return Err(DatasetError::config("batch_size must be at least 1"));
        }
        if opts.pin_memory {
            log::debug!("pin_memory has no effect on host arrays");
        }
        Ok(Self { ds, opts, pool })
    }

    pub fn dataset(&self) -> &Arc<dyn MixtureDataset> {
        &self.ds
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.opts
    }

    pub fn batch_size(&self) -> usize {
        self.opts.batch_size
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        let n = self.ds.len();
        if self.opts.drop_last {
            n / self.opts.batch_size
        } else {
            n.div_ceil(self.opts.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Result<BatchIter> {
        self.epoch(0)
    }

    /// Start an epoch. Shuffled loaders draw a new order and new crop seeds per epoch.
    pub fn epoch(&self, epoch: u64) -> Result<BatchIter> {
        let epoch_seed = self
            .opts
            .seed
            .wrapping_add(epoch.wrapping_mul(EPOCH_SEED_STRIDE));

        let mut order: Vec<usize> = (0..self.ds.len()).collect();
        if self.opts.shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(epoch_seed));
        }
        order.truncate(self.len() * self.opts.batch_size);

        let seeds = ItemSeeds {
            epoch_seed,
            per_epoch: self.opts.shuffle,
        };
        log::trace!(
            "Start epoch {epoch} with {} items in {} batches",
            order.len(),
            self.len()
        );

        let feed = if self.opts.num_workers > 0 && !order.is_empty() {
            let pool = match &self.pool {
                Some(pool) => pool.clone(),
                None => worker_pool(self.opts.num_workers)?,
            };
            let prefetch = self
                .opts
                .prefetch
                .unwrap_or(self.opts.batch_size * self.opts.num_workers)
                .max(1);
            Some(WorkerFeed::spawn(
                self.ds.clone(),
                pool,
                &order,
                seeds,
                prefetch,
            ))
        } else {
            None
        };

        Ok(BatchIter {
            ds: self.ds.clone(),
            order,
            batch_size: self.opts.batch_size,
            cursor: 0,
            seeds,
            feed,
            finished: false,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ItemSeeds {
    epoch_seed: u64,
    per_epoch: bool,
}

impl ItemSeeds {
    fn seed(&self, sample_idx: usize) -> u64 {
        if self.per_epoch {
            self.epoch_seed.wrapping_add(sample_idx as u64)
        } else {
            sample_idx as u64
        }
    }
}

type ItemResult = (usize, Result<MixtureItem>);

/// Reads ahead on a worker pool. Every item is its own pool task that never
/// blocks, so several feeds can share one pool. At most `prefetch` items are
/// in flight or buffered at any time.
struct WorkerFeed {
    ds: Arc<dyn MixtureDataset>,
    pool: Arc<ThreadPool>,
    order: Arc<[usize]>,
    seeds: ItemSeeds,
    prefetch: usize,
    sender: Sender<ItemResult>,
    receiver: Receiver<ItemResult>,
    out_buf: BTreeMap<usize, Result<MixtureItem>>,
    submitted: usize,
    consumed: usize,
}

impl WorkerFeed {
    fn spawn(
        ds: Arc<dyn MixtureDataset>,
        pool: Arc<ThreadPool>,
        order: &[usize],
        seeds: ItemSeeds,
        prefetch: usize,
    ) -> Self {
        let (sender, receiver) = unbounded::<ItemResult>();
        let mut feed = Self {
            ds,
            pool,
            order: order.into(),
            seeds,
            prefetch: prefetch.max(1),
            sender,
            receiver,
            out_buf: BTreeMap::new(),
            submitted: 0,
            consumed: 0,
        };
        feed.fill();
        feed
    }

    fn fill(&mut self) {
        let limit = (self.consumed + self.prefetch).min(self.order.len());
        while self.submitted < limit {
            let order_idx = self.submitted;
            let sample_idx = self.order[order_idx];
            let seed = self.seeds.seed(sample_idx);
            let ds = self.ds.clone();
            let sender = self.sender.clone();
            self.pool.spawn(move || {
                log::trace!("Worker: Getting sample {sample_idx} with seed {seed}");
                let item = ds.read_item(sample_idx, Some(seed));
                // receiver is gone once the epoch is dropped
                let _ = sender.send((order_idx, item));
            });
            self.submitted += 1;
        }
    }

    fn recv(&mut self, order_idx: usize) -> Result<MixtureItem> {
        if order_idx >= self.submitted {
            return Err(DatasetError::Worker(format!(
                "item {order_idx} was never scheduled"
            )));
        }
        let item = match self.out_buf.remove(&order_idx) {
            Some(item) => item,
            None => loop {
                match self.receiver.recv() {
                    Ok((o_idx, item)) if o_idx == order_idx => break item,
                    Ok((o_idx, item)) => {
                        self.out_buf.insert(o_idx, item);
                    }
                    Err(e) => return Err(DatasetError::Worker(e.to_string())),
                }
            },
        };
        self.consumed += 1;
        self.fill();
        item
    }
}

/// One epoch of batches. Yields `Err` at most once, then stops.
pub struct BatchIter {
    ds: Arc<dyn MixtureDataset>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    seeds: ItemSeeds,
    feed: Option<WorkerFeed>,
    finished: bool,
}

impl BatchIter {
    fn read(&mut self, order_idx: usize) -> Result<MixtureItem> {
        let sample_idx = self.order[order_idx];
        match self.feed.as_mut() {
            Some(feed) => feed.recv(order_idx),
            None => self.ds.read_item(sample_idx, Some(self.seeds.seed(sample_idx))),
        }
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let mut items = Vec::with_capacity(end - self.cursor);
        for order_idx in self.cursor..end {
            items.push(self.read(order_idx)?);
        }
        let ids = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        collate(items, ids)
    }
}

impl Iterator for BatchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.cursor >= self.order.len() {
            return None;
        }
        let batch = self.next_batch();
        if batch.is_err() {
            self.finished = true;
            self.feed = None;
        }
        Some(batch)
    }
}

/// Zero-pad items to the longest one and stack them on a new batch axis.
pub fn collate(items: Vec<MixtureItem>, ids: Vec<usize>) -> Result<Batch> {
    let lengths: Vec<usize> = items.iter().map(|i| i.len()).collect();
    let max_len = lengths.iter().copied().max().unwrap_or(0);

    let mixtures = stack_padded(items.iter().map(|i| &i.mixture), Axis(0), max_len)?;
    let sources = stack_padded(items.iter().map(|i| &i.sources), Axis(1), max_len)?;
    let names = items.into_iter().map(|i| i.name).collect();

    Ok(Batch {
        mixtures,
        sources,
        names,
        lengths,
        ids,
    })
}

fn stack_padded<'a, I>(xs: I, time_axis: Axis, len: usize) -> Result<ArrayD<f32>>
where
    I: Iterator<Item = &'a ArrayD<f32>>,
{
    let padded = xs
        .map(|x| pad_to(x, time_axis, len))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = padded.iter().map(|x| x.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

fn pad_to(x: &ArrayD<f32>, axis: Axis, len: usize) -> Result<ArrayD<f32>> {
    let missing = len.saturating_sub(x.len_of(axis));
    if missing == 0 {
        return Ok(x.clone());
    }
    let mut shape = x.shape().to_vec();
    shape[axis.index()] = missing;
    let zeros = ArrayD::<f32>::zeros(IxDyn(&shape));
    Ok(ndarray::concatenate(axis, &[x.view(), zeros.view()])?)
}
