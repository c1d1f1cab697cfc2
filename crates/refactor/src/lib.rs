//! # Context Refactor
//!
//! Splits oversized source files into cohesive modules behind a thin
//! re-exporting aggregator, with validation and byte-identical rollback.
//!
//! ## Architecture
//!
//! ```text
//! SplitEngine::split_file / apply
//!     │
//!     ├──> ANALYZE   per-file lock (process registry + .context/locks), fresh scan
//!     ├──> PLAN      Analyzer::plan_split (re-planned when the content hash moved)
//!     ├──> EXTRACT   render modules → hidden temp files
//!     ├──> REWRITE   render aggregator, size check, BackupRecord
//!     ├──> VALIDATE  syntax → import resolution overlay → TestHook on a staged copy (timeout)
//!     │
//!     ├──> COMMIT    rename over final paths, re-ingest, HistoryMapping
//!     └──> ROLLBACK  restore BackupRecord, drop temp files
//! ```

mod backup;
mod engine;
mod error;
mod lock;
mod staging;
mod types;
mod validate;

pub use backup::{BackupEntry, BackupRecord};
pub use engine::SplitEngine;
pub use error::{
    LockContentionError, RefactorFailure, Result, SplitValidationError, ValidationStage,
};
pub use lock::{normalize_relative, try_acquire as acquire_split_lock, SplitLock};
pub use staging::StagedTree;
pub use types::{
    Assurance, CancelFlag, ExtractedFile, HistoryEntry, HistoryMapping, RefactorResult, SplitStage,
};
pub use validate::{public_interface, CommandTestHook, TestHook, Validator, DEFAULT_TEST_TIMEOUT};
