use crate::error::{RefactorFailure, Result};
use context_analyzer::RenderedSplit;
use context_vector_store::{is_context_dir_name, staging_dir_for_project_root};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMP_SUFFIX: &str = ".split.tmp";

/// Copy of the project with a split's files in place. Behavior checks run
/// here, so the real tree is not written before validation passes. Removed
/// on drop.
#[derive(Debug)]
pub struct StagedTree {
    dir: TempDir,
    touched: Vec<PathBuf>,
}

impl StagedTree {
    /// Copy the project (gitignore aware, without `.context/` and `.git/`)
    /// under `.context/staging/`, then write the rendered files over it.
    pub async fn materialize(root: &Path, rendered: &RenderedSplit) -> Result<Self> {
        let root = root.to_path_buf();
        let files: Vec<(String, String)> = rendered
            .files()
            .map(|file| (file.path.clone(), file.content.clone()))
            .collect();
        tokio::task::spawn_blocking(move || Self::materialize_blocking(&root, &files))
            .await
            .map_err(|err| RefactorFailure::Other(format!("staging task failed: {err}")))?
    }

    fn materialize_blocking(root: &Path, files: &[(String, String)]) -> Result<Self> {
        let parent = staging_dir_for_project_root(root);
        std::fs::create_dir_all(&parent)?;
        let dir = tempfile::Builder::new().prefix("split-").tempdir_in(&parent)?;

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(is_context_dir_name(&name) || name == ".git" || name.ends_with(TEMP_SUFFIX))
            })
            .build();
        let mut copied = 0usize;
        for entry in walker {
            let entry = entry.map_err(|err| RefactorFailure::Other(format!("staging walk: {err}")))?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let target = dir.path().join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }

        let mut touched = Vec::with_capacity(files.len());
        for (path, content) in files {
            let target = dir.path().join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, content)?;
            touched.push(target);
        }
        log::debug!(
            "Staged {copied} files and {} split outputs in {}",
            touched.len(),
            dir.path().display()
        );
        Ok(Self { dir, touched })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Split outputs inside the staged copy
    pub fn touched(&self) -> &[PathBuf] {
        &self.touched
    }
}
