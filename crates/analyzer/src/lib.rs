//! # Context Analyzer
//!
//! Cohesion/coupling metrics, impact analysis and split planning over the
//! code graph.
//!
//! ## Split planning
//!
//! ```text
//! FileScan + GraphArena
//!     │
//!     ├──> Units: top-level entities (methods roll up to their class)
//!     │      └─ pinning: re-bound state, module metadata, referrers of pinned units
//!     │
//!     ├──> SCCs over unit dependencies (+ mutable state bundles)
//!     │
//!     ├──> Agglomeration by edge weight, then first-fit packing
//!     │      └─ every group ≤ max_lines, acyclic group imports
//!     │
//!     └──> SplitPlan (groups, cut sets, aggregator, metrics)
//! ```
//!
//! Line estimates are computed with the same layout functions that render
//! the final files, so a plan that fits also renders within the limit.

mod error;
mod impact;
mod layout;
mod metrics;
mod partition;
mod planner;
mod types;
mod units;

pub use error::{AnalyzerError, PlanInfeasibleError, Result};
pub use impact::{impact_of, ImpactedEntity};
pub use layout::{is_package_member, join_path, sibling_import, split_path};
pub use metrics::{file_metrics, local_subgraph};
pub use planner::{Analyzer, RenderedFile, RenderedSplit};
pub use types::{
    AggregatorPlan, CutEdge, EntityGroup, FileMetrics, PinnedEntity, Reexport, SplitDecision,
    SplitPlan,
};
