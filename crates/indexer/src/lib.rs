//! # Context Indexer
//!
//! Project scanning and the consumer API over the code graph.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> File Scanner (.gitignore aware, include/exclude globs)
//!     │      └─> Source files
//!     │
//!     ├──> Read + parse (bounded tokio tasks, spawn_blocking)
//!     │      └─> FileScans (unchanged content hashes are skipped)
//!     │
//!     ├──> Graph: ingest per file, tombstone vanished files, link
//!     │
//!     └──> Embedding worker (background pass)
//!            └─> Searchable index
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_indexer::CodeIntelligence;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CodeIntelligence::open("/path/to/project", None).await?;
//!     let report = engine.scan(".").await?;
//!     println!("Scanned {} files, {} entities", report.files_scanned, report.entities);
//!
//!     if let Some(plan) = engine.plan_split("pkg/big.py", 300).await?.plan() {
//!         let result = engine.apply_split(plan).await;
//!         println!("split {}: {:?}", if result.success { "committed" } else { "rolled back" }, result.reason);
//!     }
//!     engine.save().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod intelligence;
mod limits;
mod pipeline;
mod scan_lock;
mod scanner;
mod stats;

pub use config::{EngineConfig, DEFAULT_MAX_FILE_SIZE_BYTES, DEFAULT_MAX_LINES, DEFAULT_TEST_TIMEOUT_MS};
pub use error::{IndexerError, Result};
pub use intelligence::CodeIntelligence;
pub use limits::{default_scan_concurrency, ScanConcurrencySnapshot, MAX_SCAN_CONCURRENCY};
pub use scanner::{FileScanner, ScanOptions};
pub use stats::{FileFailure, ScanReport};
