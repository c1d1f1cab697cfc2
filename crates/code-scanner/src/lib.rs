//! # Context Code Scanner
//!
//! Structural extraction of classes, functions, methods and module-level
//! state from source files, plus the import records and unresolved
//! reference candidates the graph linker needs.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language Detection (from extension)
//!     │
//!     ├──> Tree-sitter Parsing → AST
//!     │    └─> any ERROR / MISSING node → ScannerError::Parse
//!     │
//!     └──> Extraction (per language)
//!          ├─> Entities (span, docstring, signature, complexity, hash)
//!          ├─> Imports (static, relative, dynamic)
//!          ├─> Reference candidates (bare, self, attribute)
//!          └─> Module items (top-level statements with uses/binds)
//! ```
//!
//! Scanning is deterministic: the same path and content always produce an
//! identical [`FileScan`], and entity ids only depend on the path and the
//! qualified name.
//!
//! ## Example
//!
//! ```rust
//! use context_code_scanner::{Scanner, ScannerConfig};
//!
//! let scanner = Scanner::new(ScannerConfig::default());
//! let scan = scanner
//!     .scan_source("pkg/util.py", "def clamp(x):\n    return max(0, x)\n")
//!     .unwrap();
//! assert_eq!(scan.entities[0].name, "clamp");
//! ```

mod complexity;
mod config;
mod error;
mod extract;
mod language;
mod scanner;
mod types;

pub use config::ScannerConfig;
pub use error::{Result, ScannerError};
pub use extract::python_header_lines;
pub use language::Language;
pub use scanner::{line_count, Scanner};
pub use types::{
    content_hash, Entity, EntityId, EntityKind, FileScan, ImportRecord, LineSpan, ModuleItem,
    ModuleItemKind, Receiver, ReferenceCandidate, ReferenceKind, StateMutability, Visibility,
};
