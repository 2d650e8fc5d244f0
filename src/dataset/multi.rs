use ndarray::{Array1, ArrayView1, Axis};

use super::{item_rng, DatasetConfig, MixtureDataset, SegmentWindow, SplitManifests};
use crate::{
    core::{
        audio::read_wav_window,
        dsp::{average_channels, normalize_with_std, std_last_axis, EPS},
    },
    error::{DatasetError, Result},
    types::{ManifestEntry, MixtureItem},
};

/// Multi-source fan-out (2 or 4). Item `i` is mixture `i` with every
/// source type stacked as `(sources, frames)`, all downmixed to mono.
pub struct MultiSourceDataset {
    manifests: SplitManifests,
    n_src: usize,
    sample_rate: u32,
    seg_len: Option<usize>,
    normalize_audio: bool,
}

impl MultiSourceDataset {
    pub fn from_manifests(mut manifests: SplitManifests, cfg: &DatasetConfig) -> Result<Self> {
        if !matches!(cfg.n_src, 2 | 4) {
            return Err(DatasetError::config(format!(
                "multi-source dataset needs n_src 2 or 4, got {}",
                cfg.n_src
            )));
        }
        let seg_len = cfg.seg_len();
        let orig_len = manifests.len();
        let stats = match seg_len {
            Some(seg_len) => manifests.drop_shorter_than(seg_len),
            None => Default::default(),
        };
        stats.log(orig_len, seg_len, cfg.sample_rate);

        Ok(Self {
            manifests,
            n_src: cfg.n_src,
            sample_rate: cfg.sample_rate,
            seg_len,
            normalize_audio: cfg.normalize_audio,
        })
    }

    pub fn n_src(&self) -> usize {
        self.n_src
    }

    pub fn mixtures(&self) -> &[ManifestEntry] {
        &self.manifests.mix
    }
}

impl MixtureDataset for MultiSourceDataset {
    fn read_item(&self, idx: usize, seed: Option<u64>) -> Result<MixtureItem> {
        let mix = self
            .manifests
            .mix
            .get(idx)
            .ok_or(DatasetError::IndexOutOfRange {
                idx,
                len: self.manifests.len(),
            })?;

        let window = SegmentWindow::sample(mix.sample_count, self.seg_len, &mut item_rng(seed));
        let mixture = average_channels(&read_wav_window(&mix.path, window.start, window.stop)?);

        let mut sources: Vec<Array1<f32>> = Vec::with_capacity(self.manifests.sources.len());
        for src in &self.manifests.sources {
            let entry = src.get(idx).ok_or(DatasetError::IndexOutOfRange {
                idx,
                len: src.len(),
            })?;
            sources.push(average_channels(&read_wav_window(
                &entry.path,
                window.start,
                window.stop,
            )?));
        }
        let views: Vec<ArrayView1<f32>> = sources.iter().map(|s| s.view()).collect();
        let sources = ndarray::stack(Axis(0), &views)?.into_dyn();
        let mixture = mixture.into_dyn();

        let (mixture, sources) = if self.normalize_audio {
            let m_std = std_last_axis(&mixture);
            (
                normalize_with_std(&mixture, &m_std, EPS)?,
                normalize_with_std(&sources, &m_std, EPS)?,
            )
        } else {
            (mixture, sources)
        };

        Ok(MixtureItem {
            mixture,
            sources,
            name: mix.file_name().to_string(),
        })
    }

    fn len(&self) -> usize {
        self.manifests.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn seg_len(&self) -> Option<usize> {
        self.seg_len
    }
}
