use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    core::audio::{read_stems, resample, write_audio},
    error::{DatasetError, Result},
    io::{
        paths::{stem_dir, stem_output_path},
        progress::emit_reorganize_progress,
    },
    types::{AudioData, Split, StemKind},
};

/// Sample rate of the written stem files.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Splits produced by the reorganizer.
pub const OUTPUT_SPLITS: [Split; 2] = [Split::Train, Split::Test];

/// Source of per-track stems. One `AudioData` per container track, in container order.
pub trait StemReader {
    fn read_stems(&self, path: &Path) -> Result<Vec<AudioData>>;
}

/// Decodes stem containers (`.stem.mp4`) with symphonia.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerStemReader;

impl StemReader for ContainerStemReader {
    fn read_stems(&self, path: &Path) -> Result<Vec<AudioData>> {
        read_stems(path)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReorganizeSummary {
    pub train_tracks: usize,
    pub test_tracks: usize,
    pub files_written: usize,
}

pub fn create_directory_structure(out_dir: &Path) -> Result<()> {
    for split in OUTPUT_SPLITS {
        for stem in StemKind::CONTAINER_ORDER {
            fs::create_dir_all(stem_dir(out_dir, split, stem))?;
        }
    }
    Ok(())
}

/// Write stems 0..5 as mix, drums, bass, other, vocals. Returns the written paths.
pub fn save_stems(
    stems: &[AudioData],
    song_name: &str,
    out_dir: &Path,
    split: Split,
    sample_rate: u32,
) -> Result<Vec<PathBuf>> {
    if stems.len() < StemKind::CONTAINER_ORDER.len() {
        return Err(anyhow::anyhow!(
            "Expected {} stems for `{song_name}`, got {}",
            StemKind::CONTAINER_ORDER.len(),
            stems.len()
        )
        .into());
    }

    let mut written = Vec::with_capacity(StemKind::CONTAINER_ORDER.len());
    for (stem, audio) in StemKind::CONTAINER_ORDER.iter().zip(stems) {
        let out_path = stem_output_path(out_dir, split, *stem, song_name);
        if audio.sample_rate == sample_rate {
            write_audio(&out_path, audio)?;
        } else {
            log::debug!(
                "Resampling {stem} of `{song_name}` from {} Hz to {sample_rate} Hz",
                audio.sample_rate
            );
            write_audio(&out_path, &resample(audio, sample_rate)?)?;
        }
        written.push(out_path);
    }
    Ok(written)
}

/// Stem containers in `in_dir`, sorted by file name.
pub fn list_containers(in_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(in_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("mp4"))
        .collect();
    files.sort();
    Ok(files)
}

/// Reorganize every container of `in_dir` into `{out_dir}/{split}`. Returns
/// the number of tracks handled. The first failing track aborts the split.
pub fn process_split<R: StemReader + ?Sized>(
    reader: &R,
    in_dir: &Path,
    out_dir: &Path,
    split: Split,
) -> Result<usize> {
    let songs = list_containers(in_dir)?;
    let total = songs.len();
    log::info!(
        "Reorganizing {total} tracks from {} into {}",
        in_dir.display(),
        split.dir_name()
    );

    for (done, song_path) in songs.iter().enumerate() {
        let song_name = song_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DatasetError::decode(song_path, "file name is not valid UTF-8"))?;

        let stems = reader.read_stems(song_path)?;
        let written = save_stems(&stems, song_name, out_dir, split, TARGET_SAMPLE_RATE)?;
        log::debug!("{song_name}: wrote {} stems", written.len());

        emit_reorganize_progress(split, done + 1, total);
    }
    Ok(total)
}

pub fn reorganize<R: StemReader + ?Sized>(
    reader: &R,
    train_dir: &Path,
    test_dir: &Path,
    out_dir: &Path,
) -> Result<ReorganizeSummary> {
    create_directory_structure(out_dir)?;

    let train_tracks = process_split(reader, train_dir, out_dir, Split::Train)?;
    let test_tracks = process_split(reader, test_dir, out_dir, Split::Test)?;

    Ok(ReorganizeSummary {
        train_tracks,
        test_tracks,
        files_written: (train_tracks + test_tracks) * StemKind::CONTAINER_ORDER.len(),
    })
}

/// Reorganize a MUSDB18-style corpus using the container decoder.
pub fn reorganize_musdb(train_dir: &Path, test_dir: &Path, out_dir: &Path) -> Result<ReorganizeSummary> {
    reorganize(&ContainerStemReader, train_dir, test_dir, out_dir)
}
