use crate::error::{Result, ScannerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the structural extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" => Language::Python,
            "rs" => Language::Rust,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Unknown => "unknown",
        }
    }

    /// Parse a language name (as written in configuration files)
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "python" | "py" => Language::Python,
            "rust" | "rs" => Language::Rust,
            "javascript" | "js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            _ => Language::Unknown,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Language::Unknown)
    }

    /// Only Python sources can currently be rewritten by the splitter
    pub fn supports_split(self) -> bool {
        matches!(self, Language::Python)
    }

    /// File extensions probed when resolving extension-less module specifiers
    pub fn module_extensions(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Rust => &["rs"],
            Language::JavaScript | Language::TypeScript => {
                &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
            }
            Language::Unknown => &[],
        }
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self, path: &Path) -> Result<tree_sitter::Language> {
        match self {
            Language::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Language::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => {
                let is_tsx = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tsx"));
                if is_tsx {
                    Ok(tree_sitter_typescript::LANGUAGE_TSX.into())
                } else {
                    Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
                }
            }
            Language::Unknown => Err(ScannerError::unsupported_language(path, self.as_str())),
        }
    }

    /// Line comment prefixes used when collecting leading comments
    pub fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["///", "//!", "//", "/*", "*"],
            Language::JavaScript | Language::TypeScript => &["//", "/**", "/*", "*"],
            Language::Python => &["#"],
            Language::Unknown => &[],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::from_extension("mjs"), Language::JavaScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("go"), Language::Unknown);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("pkg/geometry.py"), Language::Python);
        assert_eq!(Language::from_path("src/lib.rs"), Language::Rust);
        assert_eq!(Language::from_path("Makefile"), Language::Unknown);
    }

    #[test]
    fn test_tree_sitter_language_rejects_unknown() {
        assert!(Language::Python
            .tree_sitter_language(Path::new("a.py"))
            .is_ok());
        assert!(Language::Unknown
            .tree_sitter_language(Path::new("a.go"))
            .is_err());
    }

    #[test]
    fn test_only_python_splits() {
        assert!(Language::Python.supports_split());
        assert!(!Language::Rust.supports_split());
        assert_eq!(Language::from_name("TypeScript"), Language::TypeScript);
    }
}
