use crate::error::Result;
use context_code_scanner::content_hash;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    /// Original bytes, `None` when the path did not exist
    pub original: Option<Vec<u8>>,
    pub hash: Option<String>,
}

/// Snapshot of every path a split may touch, taken before any final write
#[derive(Debug, Clone, Default)]
pub struct BackupRecord {
    entries: Vec<BackupEntry>,
}

impl BackupRecord {
    pub async fn capture(paths: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let mut entries = Vec::new();
        for path in paths {
            let original = match tokio::fs::read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            };
            let hash = original.as_deref().map(content_hash);
            entries.push(BackupEntry { path, original, hash });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    pub fn entry(&self, path: &Path) -> Option<&BackupEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Put every path back byte for byte; paths that did not exist are removed.
    /// Keeps going past individual failures and reports the first one.
    pub async fn restore(&self) -> Result<()> {
        let mut first_error = None;
        for entry in &self.entries {
            let outcome = match &entry.original {
                Some(bytes) => tokio::fs::write(&entry.path, bytes).await,
                None => match tokio::fs::remove_file(&entry.path).await {
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(err) = outcome {
                log::warn!("Failed to restore {}: {err}", entry.path.display());
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Paths whose current content differs from the snapshot
    pub async fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        let mut changed = Vec::new();
        for entry in &self.entries {
            let current = match tokio::fs::read(&entry.path).await {
                Ok(bytes) => Some(content_hash(&bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            };
            if current != entry.hash {
                changed.push(entry.path.clone());
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn restore_is_byte_identical_and_removes_new_files() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("big.py");
        let created = temp.path().join("big_part.py");
        tokio::fs::write(&existing, b"x = 1\r\n\n# trailing").await.unwrap();

        let backup = BackupRecord::capture([existing.clone(), created.clone()]).await.unwrap();
        assert!(backup.entry(&created).unwrap().original.is_none());

        tokio::fs::write(&existing, b"from big_part import x\n").await.unwrap();
        tokio::fs::write(&created, b"x = 1\n").await.unwrap();
        assert_eq!(backup.changed_paths().await.unwrap().len(), 2);

        backup.restore().await.unwrap();
        assert_eq!(tokio::fs::read(&existing).await.unwrap(), b"x = 1\r\n\n# trailing");
        assert!(!created.exists());
        assert!(backup.changed_paths().await.unwrap().is_empty());
    }
}
