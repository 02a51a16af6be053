//! Incremental monitor for the Câmara dos Deputados open data API.
//!
//! Collectors pull bills, votes, provisional decrees and legislator expenses,
//! a keyword classifier ranks them, the reconciler diffs them against the
//! tracked state file and picks at most one item per run, and the formatter
//! renders it as a thread of 280-character segments for a publisher. A
//! separate backfill path loads long-horizon history into SQLite.

pub mod backfill;
pub mod classifier;
pub mod collectors;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod processor;
pub mod publish;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod types;

pub use backfill::{Backfill, BackfillLimits, BackfillReport, BackfillTarget};
pub use classifier::{Classification, KeywordClassifier};
pub use config::{Config, ConfigBuilder, TrackerSettings};
pub use error::{Error, Result};
pub use http::ApiClient;
pub use processor::{RunOutcome, RunSummary, TrackerProcessor};
pub use publish::{OutboxPublisher, PublishOutcome, Publisher, StdoutPublisher};
pub use reconcile::{reconcile, ChangeKind, Reconciliation, ReconcilePolicy};
pub use state::RunState;
pub use store::Store;
pub use types::{CollectedRecord, EntityKind, ItemId, TrackedItem};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::processor::TrackerProcessor;
    pub use crate::publish::{OutboxPublisher, Publisher, StdoutPublisher};
    pub use crate::types::{CollectedRecord, EntityKind, TrackedItem};
    pub use futures::StreamExt;
}
