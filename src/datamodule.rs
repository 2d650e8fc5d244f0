use std::{
    fs,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{
        build_dataset,
        loader::{worker_pool, DataLoader, LoaderOptions},
        validate_n_src, DatasetConfig, MixtureDataset,
    },
    error::{DatasetError, Result},
    types::Split,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataModuleConfig {
    pub train_dir: Option<PathBuf>,
    pub valid_dir: Option<PathBuf>,
    pub test_dir: Option<PathBuf>,
    pub n_src: usize,
    pub sample_rate: u32,
    /// Training segment length in seconds.
    pub segment: Option<f32>,
    /// Segment for validation and test. `None` evaluates whole files.
    pub eval_segment: Option<f32>,
    pub normalize_audio: bool,
    pub batch_size: usize,
    pub num_workers: usize,
    pub pin_memory: bool,
    pub persistent_workers: bool,
    /// Drop the trailing incomplete batch of validation and test loaders.
    pub eval_drop_last: bool,
    pub seed: u64,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            train_dir: None,
            valid_dir: None,
            test_dir: None,
            n_src: 4,
            sample_rate: 8000,
            segment: Some(4.0),
            eval_segment: None,
            normalize_audio: false,
            batch_size: 8,
            num_workers: 0,
            pin_memory: false,
            persistent_workers: false,
            eval_drop_last: false,
            seed: 0,
        }
    }
}

impl DataModuleConfig {
    pub fn new(
        train_dir: impl Into<PathBuf>,
        valid_dir: impl Into<PathBuf>,
        test_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            train_dir: Some(train_dir.into()),
            valid_dir: Some(valid_dir.into()),
            test_dir: Some(test_dir.into()),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn dir(&self, split: Split) -> Option<&PathBuf> {
        match split {
            Split::Train => self.train_dir.as_ref(),
            Split::Valid => self.valid_dir.as_ref(),
            Split::Test => self.test_dir.as_ref(),
        }
    }

    pub fn dataset_config(&self, split: Split) -> DatasetConfig {
        DatasetConfig {
            json_dir: self.dir(split).cloned(),
            n_src: self.n_src,
            sample_rate: self.sample_rate,
            segment: match split {
                Split::Train => self.segment,
                Split::Valid | Split::Test => self.eval_segment,
            },
            normalize_audio: self.normalize_audio,
        }
    }

    pub fn loader_options(&self, split: Split) -> LoaderOptions {
        let train = split == Split::Train;
        LoaderOptions {
            batch_size: self.batch_size,
            shuffle: train,
            drop_last: train || self.eval_drop_last,
            num_workers: self.num_workers,
            prefetch: None,
            persistent_workers: self.persistent_workers,
            pin_memory: self.pin_memory,
            seed: self.seed,
        }
    }
}

struct SplitDatasets {
    train: Arc<dyn MixtureDataset>,
    valid: Arc<dyn MixtureDataset>,
    test: Arc<dyn MixtureDataset>,
}

/// Owns the train/valid/test datasets and hands out one loader per split.
///
/// Construction only validates and stores the configuration; datasets are
/// built by [`StemDataModule::setup`].
pub struct StemDataModule {
    cfg: DataModuleConfig,
    datasets: Option<SplitDatasets>,
    pool: Option<Arc<ThreadPool>>,
}

impl StemDataModule {
    pub fn new(cfg: DataModuleConfig) -> Result<Self> {
        if Split::iter().any(|s| cfg.dir(s).is_none()) {
            return Err(DatasetError::config("JSON DIR is None!"));
        }
        validate_n_src(cfg.n_src)?;
        if cfg.batch_size == 0 {
            return Err(DatasetError::config("batch_size must be at least 1"));
        }
        Ok(Self {
            cfg,
            datasets: None,
            pool: None,
        })
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.cfg
    }

    pub fn is_set_up(&self) -> bool {
        self.datasets.is_some()
    }

    pub fn setup(&mut self) -> Result<()> {
        let build = |split: Split| -> Result<Arc<dyn MixtureDataset>> {
            let ds = build_dataset(&self.cfg.dataset_config(split))?;
            log::info!("{split} dataset: {} items", ds.len());
            Ok(Arc::from(ds))
        };
        let datasets = SplitDatasets {
            train: build(Split::Train)?,
            valid: build(Split::Valid)?,
            test: build(Split::Test)?,
        };
        self.datasets = Some(datasets);

        if self.cfg.persistent_workers && self.cfg.num_workers > 0 && self.pool.is_none() {
            self.pool = Some(worker_pool(self.cfg.num_workers)?);
        }
        Ok(())
    }

    pub fn dataset(&self, split: Split) -> Result<Arc<dyn MixtureDataset>> {
        let ds = self.datasets.as_ref().ok_or(DatasetError::NotSetUp)?;
        Ok(match split {
            Split::Train => ds.train.clone(),
            Split::Valid => ds.valid.clone(),
            Split::Test => ds.test.clone(),
        })
    }

    pub fn loader(&self, split: Split) -> Result<DataLoader> {
        let ds = self.dataset(split)?;
        let opts = self.cfg.loader_options(split);
        match &self.pool {
            Some(pool) => DataLoader::with_pool(ds, opts, pool.clone()),
            None => DataLoader::new(ds, opts),
        }
    }

    /// Shuffled, drops the trailing incomplete batch.
    pub fn train_loader(&self) -> Result<DataLoader> {
        self.loader(Split::Train)
    }

    pub fn val_loader(&self) -> Result<DataLoader> {
        self.loader(Split::Valid)
    }

    pub fn test_loader(&self) -> Result<DataLoader> {
        self.loader(Split::Test)
    }

    pub fn make_loaders(&self) -> Result<(DataLoader, DataLoader, DataLoader)> {
        Ok((self.train_loader()?, self.val_loader()?, self.test_loader()?))
    }

    #[allow(clippy::type_complexity)]
    pub fn datasets(
        &self,
    ) -> Result<(
        Arc<dyn MixtureDataset>,
        Arc<dyn MixtureDataset>,
        Arc<dyn MixtureDataset>,
    )> {
        Ok((
            self.dataset(Split::Train)?,
            self.dataset(Split::Valid)?,
            self.dataset(Split::Test)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_rejected() {
        let cfg = DataModuleConfig {
            train_dir: Some("tr".into()),
            ..Default::default()
        };
        assert!(matches!(
            StemDataModule::new(cfg),
            Err(DatasetError::Config(_))
        ));
    }

    #[test]
    fn loaders_need_setup() {
        let dm = StemDataModule::new(DataModuleConfig::new("tr", "cv", "tt")).unwrap();
        assert!(matches!(dm.train_loader(), Err(DatasetError::NotSetUp)));
    }

    #[test]
    fn split_policies() {
        let cfg = DataModuleConfig::new("tr", "cv", "tt");
        let train = cfg.loader_options(Split::Train);
        assert!(train.shuffle && train.drop_last);
        let valid = cfg.loader_options(Split::Valid);
        assert!(!valid.shuffle && !valid.drop_last);
        assert_eq!(cfg.dataset_config(Split::Test).segment, None);
        assert_eq!(cfg.dataset_config(Split::Train).segment, Some(4.0));
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let cfg: DataModuleConfig =
            serde_json::from_str(r#"{"train_dir": "a", "valid_dir": "b", "test_dir": "c", "n_src": 2}"#)
                .unwrap();
        assert_eq!(cfg.n_src, 2);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.sample_rate, 8000);
    }
}
