use std::path::{Path, PathBuf};

use crate::types::{Split, StemKind};

/// `{out}/{split}/{stem}`
pub fn stem_dir(out_dir: &Path, split: Split, stem: StemKind) -> PathBuf {
    let mut p = PathBuf::from(out_dir);
    p.push(split.dir_name());
    p.push(stem.as_str());
    p
}

/// `{out}/{split}/{stem}/{song}_{stem}.wav`
pub fn stem_output_path(out_dir: &Path, split: Split, stem: StemKind, song_name: &str) -> PathBuf {
    stem_dir(out_dir, split, stem).join(format!("{song_name}_{stem}.wav"))
}

pub fn manifest_path(json_dir: &Path, stem: StemKind) -> PathBuf {
    json_dir.join(stem.manifest_file_name())
}
