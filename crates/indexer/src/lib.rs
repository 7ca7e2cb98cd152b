//! # Scour Indexer
//!
//! Per-workspace index lifecycle on top of the external engine.
//!
//! ## Pipeline
//!
//! ```text
//! Host events (roots, fs changes, ignore config)
//!     │
//!     ├──> Workspace state store (one entry per root)
//!     │      └─> derived paths, progress, pending-operation counters
//!     │
//!     ├──> Debounced auto-update (per-root timers)
//!     │
//!     └──> Operation queue (one worker per root)
//!            ├─> init / update / rebuild / clear via the engine CLI
//!            ├─> managed config regions in the descriptor file
//!            └─> watch subprocess supervision
//! ```
//!
//! At most one mutating operation runs per root at a time; a clear
//! arriving mid-operation kills the in-flight engine process and the
//! victim reports cancelled, not failed.

mod config_sync;
mod debounce;
mod error;
mod events;
mod ops;
mod service;
mod state;
mod status;
mod watch;

pub use config_sync::{
    apply_regions, sync_config_file, ManagedRegions, REGION_EXCLUDE, REGION_SCRIPT, REGION_SHADER,
};
pub use error::{IndexerError, Result};
pub use events::HostEvent;
pub use ops::{IndexOperation, OpOutcome};
pub use service::{IndexService, RootInfo, ServiceConfig};
pub use state::{ProgressTracker, RootPaths, CONFIG_FILE_NAME, INDEX_DIR_NAME};
pub use status::aggregate_progress;
