use crate::limits::{default_scan_concurrency, parse_count, MAX_SCAN_CONCURRENCY};
use anyhow::Context;
use context_code_scanner::ScannerConfig;
use context_vector_store::{
    config_path_for_project_root, DEFAULT_EMBEDDING_BATCH, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_QUERY_CACHE_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_LINES: usize = 500;
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

const MAX_EMBEDDING_DIMENSION: usize = 4096;
const MAX_EMBEDDING_BATCH: usize = 1024;

/// Engine-wide settings, read from `.context/config.toml` and `CONTEXT_*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Split threshold used when the caller does not pass one
    pub max_lines: usize,

    /// Files read and parsed concurrently during a scan
    pub scan_concurrency: usize,

    /// Larger files are skipped by the scan
    pub max_file_size_bytes: u64,

    /// Glob patterns (relative to the root) a file must match to be scanned; empty = all
    pub include: Vec<String>,

    /// Glob patterns excluded from scanning
    pub exclude: Vec<String>,

    pub embedding_dimension: usize,
    pub embedding_batch: usize,
    pub query_cache_capacity: usize,

    /// Deadline for the split test hook
    pub test_timeout_ms: u64,

    pub scanner: ScannerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            scan_concurrency: default_scan_concurrency(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            include: Vec::new(),
            exclude: Vec::new(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedding_batch: DEFAULT_EMBEDDING_BATCH,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            test_timeout_ms: DEFAULT_TEST_TIMEOUT_MS,
            scanner: ScannerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load `.context/config.toml` under `root` (defaults when absent), then
    /// apply environment overrides and validate.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = config_path_for_project_root(root);
        let config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Self::from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("validating config for {}", root.display()))?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CONTEXT_*` overrides; unparsable values keep the current setting
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("CONTEXT_MAX_LINES") {
            self.max_lines = parse_count(Some(&raw), self.max_lines, usize::MAX);
        }
        if let Some(raw) = lookup("CONTEXT_SCAN_CONCURRENCY") {
            self.scan_concurrency = parse_count(Some(&raw), self.scan_concurrency, MAX_SCAN_CONCURRENCY);
        }
        if let Some(raw) = lookup("CONTEXT_EMBEDDING_DIM") {
            self.embedding_dimension = parse_count(Some(&raw), self.embedding_dimension, MAX_EMBEDDING_DIMENSION);
        }
        if let Some(raw) = lookup("CONTEXT_EMBEDDING_BATCH") {
            self.embedding_batch = parse_count(Some(&raw), self.embedding_batch, MAX_EMBEDDING_BATCH);
        }
        if let Some(raw) = lookup("CONTEXT_TEST_TIMEOUT_MS") {
            if let Ok(ms) = raw.trim().parse::<u64>() {
                self.test_timeout_ms = ms;
            }
        }
        self
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_lines == 0 {
            return Err("max_lines must be greater than 0".to_string());
        }
        if self.scan_concurrency == 0 || self.scan_concurrency > MAX_SCAN_CONCURRENCY {
            return Err(format!("scan_concurrency must be between 1 and {MAX_SCAN_CONCURRENCY}"));
        }
        if self.embedding_dimension == 0 || self.embedding_dimension > MAX_EMBEDDING_DIMENSION {
            return Err(format!("embedding_dimension must be between 1 and {MAX_EMBEDDING_DIMENSION}"));
        }
        if self.embedding_batch == 0 {
            return Err("embedding_batch must be greater than 0".to_string());
        }
        if self.query_cache_capacity == 0 {
            return Err("query_cache_capacity must be greater than 0".to_string());
        }
        if self.test_timeout_ms == 0 {
            return Err("test_timeout_ms must be greater than 0".to_string());
        }
        if self.max_file_size_bytes == 0 {
            return Err("max_file_size_bytes must be greater than 0".to_string());
        }
        self.scanner.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = EngineConfig::from_toml(
            "max_lines = 300\nexclude = [\"tests/**\"]\n\n[scanner]\nsupported_languages = [\"python\"]\n",
        )
        .unwrap();
        assert_eq!(config.max_lines, 300);
        assert_eq!(config.exclude, vec!["tests/**".to_string()]);
        assert_eq!(config.scanner.supported_languages, vec!["python".to_string()]);
        assert_eq!(config.embedding_batch, DEFAULT_EMBEDDING_BATCH);
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONTEXT_MAX_LINES", "300"),
            ("CONTEXT_SCAN_CONCURRENCY", "999"),
            ("CONTEXT_EMBEDDING_DIM", "abc"),
            ("CONTEXT_TEST_TIMEOUT_MS", " 1500 "),
        ]);
        let config = EngineConfig::default().with_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_lines, 300);
        assert_eq!(config.scan_concurrency, MAX_SCAN_CONCURRENCY);
        assert_eq!(config.embedding_dimension, DEFAULT_EMBEDDING_DIMENSION);
        assert_eq!(config.test_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = EngineConfig {
            max_lines: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = EngineConfig {
            scanner: ScannerConfig {
                supported_languages: vec!["cobol".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_the_config_path_on_parse_errors() {
        let temp = tempfile::tempdir().unwrap();
        let path = config_path_for_project_root(temp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "max_lines = \"many\"\n").unwrap();
        let err = EngineConfig::load(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
