//! Manifest-driven segment datasets.
//!
//! A split directory holds `mix_clean.json` plus one manifest per source
//! type. Each manifest is a list of `[path, sample_count]` rows, index-aligned
//! across all files. Datasets built with a segment length crop a random
//! fixed-length window per access; without one they read whole files.

pub mod loader;
pub mod manifest;
mod multi;
mod single;

use std::path::PathBuf;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    error::{DatasetError, Result},
    types::MixtureItem,
};

pub use self::{
    manifest::{load_manifest, DropStats, Manifest, SplitManifests},
    multi::MultiSourceDataset,
    single::SingleSourceDataset,
};

/// Supported source fan-outs.
pub const SUPPORTED_N_SRC: [usize; 3] = [1, 2, 4];

/// Read access to mixture/source segments.
pub trait MixtureDataset: Send + Sync {
    /// Read item `idx`. `seed` makes the random window reproducible.
    fn read_item(&self, idx: usize, seed: Option<u64>) -> Result<MixtureItem>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn sample_rate(&self) -> u32;
    /// Segment length in samples, `None` in evaluation mode.
    fn seg_len(&self) -> Option<usize>;
    fn is_eval(&self) -> bool {
        self.seg_len().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub json_dir: Option<PathBuf>,
    pub n_src: usize,
    pub sample_rate: u32,
    /// Segment length in seconds. `None` reads whole files and skips filtering.
    pub segment: Option<f32>,
    pub normalize_audio: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            json_dir: None,
            n_src: 4,
            sample_rate: 8000,
            segment: Some(4.0),
            normalize_audio: false,
        }
    }
}

impl DatasetConfig {
    pub fn new(json_dir: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: Some(json_dir.into()),
            ..Default::default()
        }
    }

    pub fn seg_len(&self) -> Option<usize> {
        self.segment
            .map(|s| (s as f64 * self.sample_rate as f64) as usize)
    }
}

pub fn validate_n_src(n_src: usize) -> Result<()> {
    if SUPPORTED_N_SRC.contains(&n_src) {
        Ok(())
    } else {
        Err(DatasetError::config(format!(
            "{n_src} is not in {SUPPORTED_N_SRC:?}"
        )))
    }
}

/// Validate `cfg`, load its manifests and pick the variant for its fan-out.
pub fn build_dataset(cfg: &DatasetConfig) -> Result<Box<dyn MixtureDataset>> {
    let json_dir = cfg
        .json_dir
        .as_ref()
        .ok_or_else(|| DatasetError::config("JSON DIR is None!"))?;
    validate_n_src(cfg.n_src)?;

    let manifests = SplitManifests::open(json_dir)?;
    log::debug!(
        "Loaded {} manifest rows from {}",
        manifests.len(),
        json_dir.display()
    );

    let ds: Box<dyn MixtureDataset> = match cfg.n_src {
        1 => Box::new(SingleSourceDataset::from_manifests(manifests, cfg)?),
        _ => Box::new(MultiSourceDataset::from_manifests(manifests, cfg)?),
    };
    Ok(ds)
}

/// Sample window `[start, stop)`; `stop = None` reads to the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWindow {
    pub start: usize,
    pub stop: Option<usize>,
}

impl SegmentWindow {
    pub fn whole() -> Self {
        Self {
            start: 0,
            stop: None,
        }
    }

    /// Uniform start in `[0, sample_count - seg_len)`. Items exactly one
    /// segment long always start at 0.
    pub fn sample<R: Rng + ?Sized>(sample_count: usize, seg_len: Option<usize>, rng: &mut R) -> Self {
        match seg_len {
            None => Self::whole(),
            Some(seg_len) => {
                let start = if sample_count <= seg_len {
                    0
                } else {
                    rng.gen_range(0..sample_count - seg_len)
                };
                Self {
                    start,
                    stop: Some(start + seg_len),
                }
            }
        }
    }
}

pub(crate) fn item_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
