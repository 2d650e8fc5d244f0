use std::{fs, io::BufReader, path::Path};

use crate::{
    error::{DatasetError, Result},
    io::paths::manifest_path,
    types::{ManifestEntry, StemKind},
};

pub type Manifest = Vec<ManifestEntry>;

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DatasetError::ManifestNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// The mixture manifest and one manifest per source type of a split directory.
#[derive(Debug, Clone)]
pub struct SplitManifests {
    pub mix: Manifest,
    /// In [`StemKind::SOURCES`] order.
    pub sources: Vec<Manifest>,
}

impl SplitManifests {
    pub fn open(json_dir: &Path) -> Result<Self> {
        let mix = load_manifest(&manifest_path(json_dir, StemKind::Mix))?;
        let sources = StemKind::SOURCES
            .iter()
            .map(|&stem| load_manifest(&manifest_path(json_dir, stem)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { mix, sources })
    }

    pub fn len(&self) -> usize {
        self.mix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mix.is_empty()
    }

    /// Source manifests whose length differs from the mixture manifest.
    pub fn misaligned(&self) -> Vec<StemKind> {
        StemKind::SOURCES
            .iter()
            .zip(&self.sources)
            .filter(|(_, src)| src.len() != self.mix.len())
            .map(|(&stem, _)| stem)
            .collect()
    }

    /// Drop every item whose mixture is shorter than `seg_len`, in lock-step
    /// across all lists. Walks the lists back to front so removals keep the
    /// remaining indices aligned.
    pub fn drop_shorter_than(&mut self, seg_len: usize) -> DropStats {
        for stem in self.misaligned() {
            log::warn!(
                "{stem} manifest is not aligned with the mixture manifest, short items are only dropped where both have an entry"
            );
        }
        let mut stats = DropStats::default();
        for i in (0..self.mix.len()).rev() {
            if self.mix[i].sample_count < seg_len {
                stats.items += 1;
                stats.samples += self.mix[i].sample_count;
                self.mix.remove(i);
                for src in self.sources.iter_mut() {
                    if i < src.len() {
                        src.remove(i);
                    }
                }
            }
        }
        stats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropStats {
    pub items: usize,
    pub samples: usize,
}

impl DropStats {
    pub fn hours(&self, sample_rate: u32) -> f64 {
        self.samples as f64 / sample_rate as f64 / 3600.0
    }

    pub fn log(&self, orig_len: usize, seg_len: Option<usize>, sample_rate: u32) {
        let seg = seg_len.map_or_else(|| "None".to_string(), |s| s.to_string());
        log::info!(
            "Drop {} utts({:.2} h) from {} (shorter than {} samples)",
            self.items,
            self.hours(sample_rate),
            orig_len,
            seg
        );
    }
}
