use std::path::PathBuf;
use thiserror::Error;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScannerError>;

/// Errors that can occur while scanning a source file
#[derive(Error, Debug)]
pub enum ScannerError {
    /// Source could not be parsed into a clean syntax tree
    #[error("Parse error in {path} at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Unsupported language
    #[error("Unsupported language for {path}: {language}")]
    UnsupportedLanguage { path: PathBuf, language: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl ScannerError {
    /// Create a parse error
    pub fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Create an unsupported language error
    pub fn unsupported_language(path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            path: path.into(),
            language: language.into(),
        }
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }

    /// True when the failure is a recoverable per-file parse problem
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
