use crate::error::{LockContentionError, RefactorFailure, Result};
use context_code_scanner::content_hash;
use context_vector_store::locks_dir_for_project_root;
use fs2::FileExt;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Files with a split in progress in this process
static ACTIVE_SPLITS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive right to split one file, held from ANALYZE until the attempt
/// resolves. Contention fails immediately; there is no waiting.
#[derive(Debug)]
pub struct SplitLock {
    key: PathBuf,
    file: File,
}

impl Drop for SplitLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        ACTIVE_SPLITS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Project-relative path with `.` and empty components dropped and `..`
/// folded: `./pkg/../pkg/big.py` → `pkg/big.py`
pub fn normalize_relative(file: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in file.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." if parts.last().is_some_and(|last| *last != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

fn lock_path(root: &Path, file: &str) -> PathBuf {
    let digest = content_hash(file.as_bytes());
    locks_dir_for_project_root(root).join(format!("split-{}.lock", &digest[..16]))
}

/// Take the in-process slot, then the advisory lock file under
/// `.context/locks/` so other processes are excluded too.
pub fn try_acquire(root: &Path, file: &str) -> Result<SplitLock> {
    let normalized = normalize_relative(file);
    let file = normalized.as_str();
    let key = root.join(file);
    {
        let mut active = ACTIVE_SPLITS.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(LockContentionError { file: file.to_string() }.into());
        }
    }
    let release = |err: RefactorFailure| {
        ACTIVE_SPLITS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        err
    };

    let path = lock_path(root, file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| release(err.into()))?;
    }
    let handle = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|err| release(RefactorFailure::Other(format!("open split lock {}: {err}", path.display()))))?;
    if handle.try_lock_exclusive().is_err() {
        return Err(release(LockContentionError { file: file.to_string() }.into()));
    }
    log::debug!("Locked {file} for splitting ({})", path.display());
    Ok(SplitLock { key, file: handle })
}
