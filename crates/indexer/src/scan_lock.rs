use crate::{IndexerError, Result};
use context_vector_store::context_dir_for_project_root;
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Serializes graph writers (scan, save) for one project across processes
pub(crate) struct ScanLock {
    file: std::fs::File,
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for_root(root: &Path) -> PathBuf {
    context_dir_for_project_root(root).join("scan.lock")
}

pub(crate) async fn acquire_scan_lock(root: &Path) -> Result<ScanLock> {
    let path = lock_path_for_root(root);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::task::spawn_blocking(move || -> Result<ScanLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| IndexerError::Other(format!("open scan lock {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|err| IndexerError::Other(format!("acquire scan lock {}: {err}", path.display())))?;
        let waited = start.elapsed().as_millis();
        if waited > 1000 {
            log::info!("Waited {waited}ms for scan lock {}", path.display());
        }
        Ok(ScanLock { file })
    })
    .await
    .map_err(|err| IndexerError::Other(format!("join scan lock task: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_reacquirable_after_drop() {
        let temp = tempfile::tempdir().unwrap();
        let lock = acquire_scan_lock(temp.path()).await.unwrap();
        assert!(lock_path_for_root(temp.path()).exists());
        drop(lock);
        let again = lock_path_for_root(temp.path());
        let file = std::fs::OpenOptions::new().read(true).write(true).open(again).unwrap();
        file.try_lock_exclusive().unwrap();
    }
}
