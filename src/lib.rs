//! # stem-dataset-core
//!
//! Dataset preparation for music source separation: reorganize stem
//! containers into per-stem wav trees, then serve fixed-length,
//! manifest-driven training segments in batches.

pub mod core;
pub mod datamodule;
pub mod dataset;
pub mod error;
pub mod io;
pub mod types;

pub use crate::{
    core::audio::{read_stems, read_wav_window, write_audio},
    core::reorganizer::{
        reorganize, reorganize_musdb, ContainerStemReader, ReorganizeSummary, StemReader,
    },
    datamodule::{DataModuleConfig, StemDataModule},
    dataset::{
        build_dataset,
        loader::{BatchIter, DataLoader, LoaderOptions},
        DatasetConfig, MixtureDataset,
    },
    error::{DatasetError, Result},
    io::progress::set_reorganize_progress_callback,
    types::{AudioData, Batch, ManifestEntry, MixtureItem, Split, StemKind},
};
