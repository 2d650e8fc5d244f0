use ndarray::Axis;

use super::{item_rng, DatasetConfig, MixtureDataset, SegmentWindow, SplitManifests};
use crate::{
    core::{
        audio::read_wav_window,
        dsp::{normalize_with_std, squeeze_mono, std_last_axis, EPS},
    },
    error::{DatasetError, Result},
    types::{ManifestEntry, MixtureItem},
};

/// One-source fan-out.
///
/// Every retained mixture is paired with each source type in turn, so the
/// dataset is `mixtures x source types` long and each item carries a single
/// target. Training splits list mixtures back to front, evaluation splits
/// front to back. Channel layout is kept as stored.
pub struct SingleSourceDataset {
    pairs: Vec<(ManifestEntry, ManifestEntry)>,
    sample_rate: u32,
    seg_len: Option<usize>,
    normalize_audio: bool,
}

impl SingleSourceDataset {
    pub fn from_manifests(mut manifests: SplitManifests, cfg: &DatasetConfig) -> Result<Self> {
        if cfg.n_src != 1 {
            return Err(DatasetError::config(format!(
                "single-source dataset needs n_src 1, got {}",
                cfg.n_src
            )));
        }
        let seg_len = cfg.seg_len();
        let orig_len = manifests.len() * 2;

        let (stats, order): (_, Vec<usize>) = match seg_len {
            Some(seg_len) => {
                let stats = manifests.drop_shorter_than(seg_len);
                (stats, (0..manifests.len()).rev().collect())
            }
            None => (Default::default(), (0..manifests.len()).collect()),
        };

        let mut pairs = Vec::with_capacity(order.len() * manifests.sources.len());
        for i in order {
            for src in &manifests.sources {
                let entry = src.get(i).ok_or(DatasetError::IndexOutOfRange {
                    idx: i,
                    len: src.len(),
                })?;
                pairs.push((manifests.mix[i].clone(), entry.clone()));
            }
        }

        stats.log(orig_len, seg_len, cfg.sample_rate);

        Ok(Self {
            pairs,
            sample_rate: cfg.sample_rate,
            seg_len,
            normalize_audio: cfg.normalize_audio,
        })
    }

    pub fn pairs(&self) -> &[(ManifestEntry, ManifestEntry)] {
        &self.pairs
    }
}

impl MixtureDataset for SingleSourceDataset {
    fn read_item(&self, idx: usize, seed: Option<u64>) -> Result<MixtureItem> {
        let (mix, src) = self.pairs.get(idx).ok_or(DatasetError::IndexOutOfRange {
            idx,
            len: self.pairs.len(),
        })?;

        let window = SegmentWindow::sample(mix.sample_count, self.seg_len, &mut item_rng(seed));
        let mixture = squeeze_mono(read_wav_window(&mix.path, window.start, window.stop)?);
        let target = squeeze_mono(read_wav_window(&src.path, window.start, window.stop)?);

        let (mixture, target) = if self.normalize_audio {
            let m_std = std_last_axis(&mixture);
            (
                normalize_with_std(&mixture, &m_std, EPS)?,
                normalize_with_std(&target, &m_std, EPS)?,
            )
        } else {
            (mixture, target)
        };

        Ok(MixtureItem {
            mixture,
            sources: target.insert_axis(Axis(0)),
            name: mix.file_name().to_string(),
        })
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn seg_len(&self) -> Option<usize> {
        self.seg_len
    }
}
