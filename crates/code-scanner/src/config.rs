use crate::language::Language;
use serde::{Deserialize, Serialize};

/// Configuration for structural extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Docstrings longer than this are truncated (characters)
    pub max_docstring_chars: usize,

    /// Maximum length of a recorded signature (characters)
    pub max_signature_chars: usize,

    /// Languages to scan (empty = all supported languages)
    pub supported_languages: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_docstring_chars: 2000,
            max_signature_chars: 400,
            supported_languages: vec![],
        }
    }
}

impl ScannerConfig {
    /// Restrict scanning to Python sources
    pub fn python_only() -> Self {
        Self {
            supported_languages: vec!["python".to_string()],
            ..Default::default()
        }
    }

    /// Check whether a language is enabled by this config
    pub fn is_language_enabled(&self, language: Language) -> bool {
        if !language.is_supported() {
            return false;
        }
        self.supported_languages.is_empty()
            || self
                .supported_languages
                .iter()
                .any(|name| Language::from_name(name) == language)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_docstring_chars == 0 {
            return Err("max_docstring_chars must be greater than 0".to_string());
        }
        if self.max_signature_chars < 16 {
            return Err("max_signature_chars must be at least 16".to_string());
        }
        for name in &self.supported_languages {
            if !Language::from_name(name).is_supported() {
                return Err(format!("unknown language in supported_languages: {name}"));
            }
        }
        Ok(())
    }
}
