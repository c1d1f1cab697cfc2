use crate::error::{IndexerError, Result};
use crate::config::DEFAULT_MAX_FILE_SIZE_BYTES;
use context_code_scanner::Language;
use context_vector_store::is_context_dir_name;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Caller-supplied filters for a scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// A file must match one of these (relative path globs); empty = every file
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

/// Finds source files under a project root (.gitignore aware)
pub struct FileScanner {
    root: PathBuf,
    max_file_size_bytes: u64,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>, options: &ScanOptions) -> Result<Self> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            max_file_size_bytes: options.max_file_size_bytes,
            include: build_globset(&options.include)?,
            exclude: build_globset(&options.exclude)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source files under `target` (a directory or a single file inside the
    /// root), sorted by path
    pub fn scan(&self, target: &Path) -> Result<Vec<PathBuf>> {
        if !target.starts_with(&self.root) {
            return Err(IndexerError::InvalidPath(format!(
                "{} is outside the project root {}",
                target.display(),
                self.root.display()
            )));
        }
        if target.is_file() {
            let size = std::fs::metadata(target)?.len();
            return Ok(if self.accepts(target, size) {
                vec![target.to_path_buf()]
            } else {
                Vec::new()
            });
        }
        if !target.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "Path does not exist: {}",
                target.display()
            )));
        }

        let mut files = Vec::new();
        let root = self.root.clone();
        let mut builder = WalkBuilder::new(target);
        builder
            .hidden(true) // do not scan hidden files by default
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }
                    let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                    if self.accepts(entry.path(), size) {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} source files under {}", files.len(), target.display());
        Ok(files)
    }

    /// Project-relative path with `/` separators
    pub fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut normalized = relative.to_string_lossy().to_string();
        if normalized.contains('\\') {
            normalized = normalized.replace('\\', "/");
        }
        normalized
    }

    fn accepts(&self, path: &Path, size: u64) -> bool {
        if size > self.max_file_size_bytes {
            log::debug!(
                "Skipping large file {} ({} bytes > {})",
                path.display(),
                size,
                self.max_file_size_bytes
            );
            return false;
        }
        if !Self::is_source_file(path) {
            return false;
        }
        let relative = self.relative_path(path);
        if let Some(include) = &self.include {
            if !include.is_match(&relative) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&relative) {
                log::debug!("Skipping excluded file {relative}");
                return false;
            }
        }
        true
    }

    fn is_source_file(path: &Path) -> bool {
        Language::from_path(path).is_supported()
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if is_context_dir_name(&lowered)
                        || IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered)
                    {
                        return true;
                    }
                }
            }
        }
        false
    }
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    ".cache",
    "node_modules",
    "build",
    "dist",
    "target",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "__pycache__",
    // vendored code
    "vendor",
    "third_party",
    "third-party",
    "site-packages",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn names(scanner: &FileScanner, files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|path| scanner.relative_path(path)).collect()
    }

    #[test]
    fn skips_ignored_directories_and_other_files() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join("pkg").join("__pycache__");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("mod.py"), b"x = 1\n").unwrap();
        fs::write(temp.path().join("pkg").join("mod.py"), b"x = 1\n").unwrap();
        fs::write(temp.path().join("README.md"), b"# readme\n").unwrap();
        fs::create_dir_all(temp.path().join(".context")).unwrap();
        fs::write(temp.path().join(".context").join("stray.py"), b"x = 1\n").unwrap();
        fs::write(temp.path().join("main.rs"), b"fn main() {}").unwrap();

        let scanner = FileScanner::new(temp.path(), &ScanOptions::default()).unwrap();
        let files = scanner.scan(temp.path()).unwrap();
        assert_eq!(names(&scanner, &files), vec!["main.rs".to_string(), "pkg/mod.py".to_string()]);
    }

    #[test]
    fn honors_gitignore_without_a_repository() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("generated")).unwrap();
        fs::write(temp.path().join("generated").join("out.py"), b"x = 1\n").unwrap();
        fs::write(temp.path().join("app.py"), b"x = 1\n").unwrap();
        fs::write(temp.path().join(".gitignore"), b"/generated\n").unwrap();

        let scanner = FileScanner::new(temp.path(), &ScanOptions::default()).unwrap();
        let files = scanner.scan(temp.path()).unwrap();
        assert_eq!(names(&scanner, &files), vec!["app.py".to_string()]);
    }

    #[test]
    fn include_and_exclude_globs_filter_relative_paths() {
        let temp = tempdir().unwrap();
        for path in ["src/a.py", "src/b.py", "tests/test_a.py", "tools/gen.js"] {
            let absolute = temp.path().join(path);
            fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            fs::write(absolute, b"x = 1\n").unwrap();
        }
        let options = ScanOptions {
            include: vec!["**/*.py".to_string()],
            exclude: vec!["tests/**".to_string()],
            ..Default::default()
        };
        let scanner = FileScanner::new(temp.path(), &options).unwrap();
        let files = scanner.scan(temp.path()).unwrap();
        assert_eq!(names(&scanner, &files), vec!["src/a.py".to_string(), "src/b.py".to_string()]);
    }

    #[test]
    fn single_files_and_outside_paths() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("app.py"), b"x = 1\n").unwrap();
        let scanner = FileScanner::new(temp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(scanner.scan(&temp.path().join("app.py")).unwrap().len(), 1);

        let other = tempdir().unwrap();
        assert!(matches!(
            scanner.scan(other.path()),
            Err(IndexerError::InvalidPath(_))
        ));
    }

    #[test]
    fn bad_globs_are_errors() {
        let options = ScanOptions {
            include: vec!["src/[".to_string()],
            ..Default::default()
        };
        assert!(matches!(FileScanner::new("/tmp", &options), Err(IndexerError::Glob(_))));
    }
}
