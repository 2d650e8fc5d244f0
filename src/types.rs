use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Interleaved PCM buffer.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// The five audio roles of a stem container.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StemKind {
    Mix,
    Drums,
    Bass,
    Other,
    Vocals,
}

impl StemKind {
    /// Track order inside a stem container.
    pub const CONTAINER_ORDER: [StemKind; 5] = [
        StemKind::Mix,
        StemKind::Drums,
        StemKind::Bass,
        StemKind::Other,
        StemKind::Vocals,
    ];

    /// Order in which source manifests are loaded and stacked.
    pub const SOURCES: [StemKind; 4] = [
        StemKind::Bass,
        StemKind::Drums,
        StemKind::Vocals,
        StemKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mix => "mix",
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Other => "other",
            Self::Vocals => "vocals",
        }
    }

    pub fn manifest_file_name(&self) -> &'static str {
        match self {
            Self::Mix => "mix_clean.json",
            Self::Drums => "drums.json",
            Self::Bass => "bass.json",
            Self::Other => "other.json",
            Self::Vocals => "vocals.json",
        }
    }
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn iter() -> impl Iterator<Item = Split> {
        [Split::Train, Split::Valid, Split::Test].iter().cloned()
    }

    /// Directory name used in the reorganized tree.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Train => "tr",
            Self::Valid => "cv",
            Self::Test => "tt",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Valid => write!(f, "valid"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// One manifest row, stored on disk as `[file_path, sample_count]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, usize)", into = "(String, usize)")]
pub struct ManifestEntry {
    pub path: String,
    pub sample_count: usize,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, sample_count: usize) -> Self {
        Self {
            path: path.into(),
            sample_count,
        }
    }

    /// Final `/`-separated component of the path.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl From<(String, usize)> for ManifestEntry {
    fn from((path, sample_count): (String, usize)) -> Self {
        Self { path, sample_count }
    }
}

impl From<ManifestEntry> for (String, usize) {
    fn from(e: ManifestEntry) -> Self {
        (e.path, e.sample_count)
    }
}

/// A single dataset access: mixture, stacked sources and the mixture file name.
///
/// Time is axis 0 of `mixture` and axis 1 of `sources`.
#[derive(Clone, Debug)]
pub struct MixtureItem {
    pub mixture: ArrayD<f32>,
    pub sources: ArrayD<f32>,
    pub name: String,
}

impl MixtureItem {
    pub fn len(&self) -> usize {
        self.mixture.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collated items, batch axis first.
pub struct Batch {
    pub mixtures: ArrayD<f32>,
    pub sources: ArrayD<f32>,
    pub names: Vec<String>,
    pub lengths: Vec<usize>,
    pub ids: Vec<usize>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.names.len()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Batch with batch_size: '{}', mixtures: {:?}, sources: {:?}",
            self.batch_size(),
            self.mixtures.shape(),
            self.sources.shape()
        ))
    }
}
