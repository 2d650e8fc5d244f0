use std::{
    fs,
    path::{Path, PathBuf},
};

use approx::assert_abs_diff_eq;
use stem_dataset_core::core::dsp::{std_last_axis, EPS};
use stem_dataset_core::dataset::{MultiSourceDataset, SingleSourceDataset, SplitManifests};
use stem_dataset_core::{build_dataset, DatasetConfig, DatasetError, ManifestEntry, StemKind};
use tempfile::tempdir;

fn write_wav(path: &Path, channels: u16, frames: usize, f: impl Fn(usize, u16) -> f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for t in 0..frames {
        for ch in 0..channels {
            writer.write_sample((f(t, ch) * 32768.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Writes one wav per stem per item plus the five manifests. Returns the json dir.
fn build_split(root: &Path, lens: &[usize], channels: u16) -> PathBuf {
    let json_dir = root.join("json");
    fs::create_dir_all(&json_dir).unwrap();

    for (k, stem) in StemKind::CONTAINER_ORDER.iter().enumerate() {
        let mut manifest = Vec::new();
        for (i, &len) in lens.iter().enumerate() {
            let path = root.join(format!("{i}_{stem}.wav"));
            write_wav(&path, channels, len, |t, ch| {
                ((t % 50) as f32 / 50.0 - 0.5) * 0.2 * (k + 1) as f32 + ch as f32 * 0.05
            });
            manifest.push(ManifestEntry::new(path.to_string_lossy(), len));
        }
        fs::write(
            json_dir.join(stem.manifest_file_name()),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
    }
    json_dir
}

fn cfg(json_dir: &Path, n_src: usize, segment: Option<f32>) -> DatasetConfig {
    DatasetConfig {
        json_dir: Some(json_dir.to_path_buf()),
        n_src,
        sample_rate: 8000,
        segment,
        normalize_audio: false,
    }
}

#[test]
fn exact_length_item_is_kept_and_read_whole() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[32000], 1);

    let ds = build_dataset(&cfg(&json_dir, 4, Some(4.0))).unwrap();
    assert_eq!(ds.len(), 1);
    assert_eq!(ds.seg_len(), Some(32000));

    let item = ds.read_item(0, None).unwrap();
    assert_eq!(item.mixture.shape(), &[32000]);
    assert_eq!(item.sources.shape(), &[4, 32000]);
    assert_eq!(item.name, "0_mix.wav");
}

#[test]
fn train_mode_drops_short_items() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[800, 300, 1200, 799, 801], 1);

    let ds = build_dataset(&cfg(&json_dir, 4, Some(0.1))).unwrap();
    assert_eq!(ds.len(), 3);
    for i in 0..ds.len() {
        let item = ds.read_item(i, Some(i as u64)).unwrap();
        assert_eq!(item.mixture.len(), 800);
        assert_eq!(item.sources.shape(), &[4, 800]);
    }
    assert_eq!(ds.read_item(1, None).unwrap().name, "2_mix.wav");
}

#[test]
fn eval_mode_keeps_everything_and_reads_full_files() {
    let tmp = tempdir().unwrap();
    let lens = [800, 300, 1200];
    let json_dir = build_split(tmp.path(), &lens, 1);

    let ds = build_dataset(&cfg(&json_dir, 2, None)).unwrap();
    assert!(ds.is_eval());
    assert_eq!(ds.len(), 3);
    for (i, &len) in lens.iter().enumerate() {
        let item = ds.read_item(i, None).unwrap();
        assert_eq!(item.mixture.len(), len);
        assert_eq!(item.sources.shape(), &[4, len]);
    }
}

#[test]
fn multi_source_averages_stereo() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[400], 2);

    let ds = build_dataset(&cfg(&json_dir, 4, None)).unwrap();
    let item = ds.read_item(0, None).unwrap();
    assert_eq!(item.mixture.shape(), &[400]);

    let raw = stem_dataset_core::read_wav_window(tmp.path().join("0_mix.wav"), 0, None).unwrap();
    for t in [0usize, 17, 399] {
        let expected = (raw[[t, 0]] + raw[[t, 1]]) / 2.0;
        assert_abs_diff_eq!(item.mixture[[t]], expected, epsilon = 1e-6);
    }
}

#[test]
fn same_seed_same_window() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[4000], 1);

    let ds = build_dataset(&cfg(&json_dir, 4, Some(0.05))).unwrap();
    let a = ds.read_item(0, Some(11)).unwrap();
    let b = ds.read_item(0, Some(11)).unwrap();
    assert_eq!(a.mixture, b.mixture);
    assert_eq!(a.sources, b.sources);
    assert_eq!(a.mixture.len(), 400);
}

#[test]
fn normalization_uses_mixture_std_for_everything() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[2000], 1);

    let raw_cfg = cfg(&json_dir, 4, Some(0.1));
    let norm_cfg = DatasetConfig {
        normalize_audio: true,
        ..raw_cfg.clone()
    };
    let raw = build_dataset(&raw_cfg).unwrap().read_item(0, Some(3)).unwrap();
    let norm = build_dataset(&norm_cfg).unwrap().read_item(0, Some(3)).unwrap();

    let n = norm.mixture.len() as f32;
    let mean = norm.mixture.iter().sum::<f32>() / n;
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(std_last_axis(&norm.mixture)[[0]], 1.0, epsilon = 1e-3);

    let scale = std_last_axis(&raw.mixture)[[0]] + EPS;
    for s in 0..4 {
        let src = raw.sources.index_axis(ndarray::Axis(0), s);
        let src_mean = src.iter().sum::<f32>() / src.len() as f32;
        for t in [0usize, 99, 799] {
            assert_abs_diff_eq!(
                norm.sources[[s, t]],
                (src[[t]] - src_mean) / scale,
                epsilon = 1e-3
            );
        }
    }
}

#[test]
fn single_source_expands_per_source_type() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[800, 300, 1200], 2);

    let ds = build_dataset(&cfg(&json_dir, 1, Some(0.1))).unwrap();
    // two retained mixtures, one entry per source type each
    assert_eq!(ds.len(), 8);

    // training order walks mixtures back to front
    let first = ds.read_item(0, Some(0)).unwrap();
    assert_eq!(first.name, "2_mix.wav");
    assert_eq!(first.mixture.shape(), &[800, 2]);
    assert_eq!(first.sources.shape(), &[1, 800, 2]);
    assert_eq!(ds.read_item(4, Some(0)).unwrap().name, "0_mix.wav");

    for i in 0..ds.len() {
        let item = ds.read_item(i, Some(i as u64)).unwrap();
        assert_eq!(item.mixture.shape(), &[800, 2]);
        assert_eq!(item.sources.shape(), &[1, 800, 2]);
    }
}

#[test]
fn single_source_normalization_scales_target_by_mixture_std() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[1600], 2);

    let raw_cfg = cfg(&json_dir, 1, Some(0.1));
    let norm_cfg = DatasetConfig {
        normalize_audio: true,
        ..raw_cfg.clone()
    };
    let raw_ds = build_dataset(&raw_cfg).unwrap();
    let norm_ds = build_dataset(&norm_cfg).unwrap();

    for idx in [0usize, 3] {
        let raw = raw_ds.read_item(idx, Some(9)).unwrap();
        let norm = norm_ds.read_item(idx, Some(9)).unwrap();
        assert_eq!(norm.mixture.shape(), &[800, 2]);
        assert_eq!(norm.sources.shape(), &[1, 800, 2]);

        // stereo statistics run over the channel axis: one value per frame
        let m_std = std_last_axis(&raw.mixture);
        assert_eq!(m_std.shape(), &[800, 1]);

        let target = raw.sources.index_axis(ndarray::Axis(0), 0);
        for t in [0usize, 123, 799] {
            let scale = m_std[[t, 0]] + EPS;
            let m_mean = (raw.mixture[[t, 0]] + raw.mixture[[t, 1]]) / 2.0;
            let s_mean = (target[[t, 0]] + target[[t, 1]]) / 2.0;
            for c in 0..2 {
                assert_abs_diff_eq!(
                    norm.mixture[[t, c]],
                    (raw.mixture[[t, c]] - m_mean) / scale,
                    epsilon = 1e-3
                );
                assert_abs_diff_eq!(
                    norm.sources[[0, t, c]],
                    (target[[t, c]] - s_mean) / scale,
                    epsilon = 1e-3
                );
            }
        }
    }
}

#[test]
fn variants_reject_foreign_fan_out() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[500], 1);

    let multi = MultiSourceDataset::from_manifests(
        SplitManifests::open(&json_dir).unwrap(),
        &cfg(&json_dir, 1, None),
    );
    assert!(matches!(multi, Err(DatasetError::Config(_))));

    let single = SingleSourceDataset::from_manifests(
        SplitManifests::open(&json_dir).unwrap(),
        &cfg(&json_dir, 4, None),
    );
    assert!(matches!(single, Err(DatasetError::Config(_))));

    assert!(MultiSourceDataset::from_manifests(
        SplitManifests::open(&json_dir).unwrap(),
        &cfg(&json_dir, 2, None),
    )
    .is_ok());
}

#[test]
fn single_source_eval_is_forward_and_mono_stays_flat() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[500, 300], 1);

    let ds = build_dataset(&cfg(&json_dir, 1, None)).unwrap();
    assert_eq!(ds.len(), 8);
    let item = ds.read_item(0, None).unwrap();
    assert_eq!(item.name, "0_mix.wav");
    assert_eq!(item.mixture.shape(), &[500]);
    assert_eq!(item.sources.shape(), &[1, 500]);
    assert_eq!(ds.read_item(7, None).unwrap().mixture.shape(), &[300]);
}

#[test]
fn out_of_range_index_is_reported() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[500], 1);

    let ds = build_dataset(&cfg(&json_dir, 4, None)).unwrap();
    assert!(matches!(
        ds.read_item(1, None),
        Err(DatasetError::IndexOutOfRange { idx: 1, len: 1 })
    ));
}

#[test]
fn missing_manifest_fails_at_construction() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[500], 1);
    fs::remove_file(json_dir.join("vocals.json")).unwrap();

    match build_dataset(&cfg(&json_dir, 4, None)) {
        Err(DatasetError::ManifestNotFound { path }) => {
            assert!(path.ends_with("vocals.json"))
        }
        Err(e) => panic!("expected missing manifest, got: {e}"),
        Ok(_) => panic!("expected missing manifest, got Ok"),
    }
}

#[test]
fn unsupported_fan_out_fails_at_construction() {
    let tmp = tempdir().unwrap();
    let json_dir = build_split(tmp.path(), &[500], 1);

    assert!(matches!(
        build_dataset(&cfg(&json_dir, 3, None)),
        Err(DatasetError::Config(_))
    ));
}
