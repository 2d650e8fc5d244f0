use std::sync::{Mutex, OnceLock};

use crate::types::Split;

type ProgressCallback = Box<dyn Fn(Split, usize, usize) + Send + 'static>;

static REORGANIZE_PROGRESS_CB: OnceLock<Mutex<Option<ProgressCallback>>> = OnceLock::new();

/// Install a callback receiving `(split, tracks_done, tracks_total)`. Replaces any previous one.
pub fn set_reorganize_progress_callback(cb: impl Fn(Split, usize, usize) + Send + 'static) {
    let slot = REORGANIZE_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn emit_reorganize_progress(split: Split, done: usize, total: usize) {
    if let Some(m) = REORGANIZE_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(split, done, total);
            }
        }
    }
}
