//! # Scour Engine
//!
//! Driver for the external indexing engine subprocess.
//!
//! The engine is an opaque binary with a fixed line-oriented CLI:
//!
//! ```text
//! init   <cfg> <root>       create an empty index for a root
//! update <cfg>              incremental index update
//! build  <cfg>              full index rebuild
//! watch  <cfg>              long-lived filesystem watch + live updates
//! search <cfg> [flags] <q>  regex text search, `path:line:preview` lines
//! files  <cfg> [flags] <mode> <q>   file search, one path per line
//! ```
//!
//! This crate locates the binary, builds argument vectors for those verbs,
//! and runs commands while streaming stdout so index progress frames
//! (`[ NNN%] NNN files`) reach the caller before the process exits.

mod args;
mod error;
mod locate;
mod runner;

pub use args::{
    build_args, files_args, init_args, search_args, update_args, watch_args, CaseFlag, QueryFlags,
};
pub use error::{EngineError, Result};
pub use locate::{resolve_engine_binary, ENGINE_BINARY_NAME, ENGINE_PATH_ENV};
pub use runner::{
    classify_failure, CommandHandle, CommandOutput, CommandRequest, CommandRunner, ProgressFrame,
    ProgressHook, ProgressScanner, RunningCommand,
};
