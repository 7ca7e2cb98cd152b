//! # Scour Protocol
//!
//! Serde types shared by the query surface, the admin surface, and the
//! status reporter. Pure data, no behavior beyond a few derived accessors,
//! so every other crate can depend on it without dragging in the runtime.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hard ceiling on results returned from a single query call. Caller
/// ceilings above this are clamped, and the response echoes both values.
pub const MAX_RESULTS_CEILING: usize = 1000;

/// Default result ceiling when the caller does not supply one.
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Case handling for text search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    Sensitive,
    Insensitive,
}

/// File search flavor. `Plain` matches whitespace-delimited literal path
/// components; `Fuzzy` is the engine's scored subsequence mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileSearchMode {
    PathRegex,
    NameRegex,
    Plain,
    Fuzzy,
}

impl Default for FileSearchMode {
    fn default() -> Self {
        Self::Fuzzy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextSearchRequest {
    pub query: String,
    /// Optional scope: absolute path, `WorkspaceName/relative`, bare
    /// relative path (must be unique across roots), or a glob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Forces case sensitivity; omitted means smart-case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchMatch {
    /// Absolute path of the matching file.
    pub path: String,
    /// 1-based line number.
    pub line: u32,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextSearchResponse {
    pub matches: Vec<SearchMatch>,
    pub count: usize,
    /// Matches that existed before the caller ceiling was applied,
    /// accumulated across every targeted root.
    pub total_available: usize,
    /// True whenever fewer results were returned than were available,
    /// including truncation done by the engine itself.
    pub capped: bool,
    pub case_mode_applied: CaseMode,
    pub max_results_applied: usize,
    /// Present only when the caller's ceiling was clamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results_requested: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileSearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: FileSearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileMatch {
    /// Absolute path, deduplicated per query.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileSearchResponse {
    pub files: Vec<FileMatch>,
    pub count: usize,
    pub total_available: usize,
    pub capped: bool,
    pub max_results_applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results_requested: Option<usize>,
}

/// Point-in-time index progress for one root.
///
/// `known` is true only once a 100% frame has been observed since the
/// index was last reset; until then counts may be partial or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    pub known: bool,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RootStatus {
    pub root: String,
    /// Last path component, used for `Name/relative` scoping.
    pub name: String,
    pub initialized: bool,
    pub watch_alive: bool,
    pub progress: ProgressSnapshot,
}

/// Workspace-wide progress derived from per-root snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateProgress {
    /// Every initialized root reported a known total.
    Counted {
        indexed: u64,
        total: u64,
        remaining: u64,
        percent: u8,
    },
    /// Only some roots had percentages; this is their average.
    Averaged { percent: u8 },
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceStatus {
    pub roots: Vec<RootStatus>,
    pub aggregate: AggregateProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BulkFailure {
    pub root: String,
    pub message: String,
}

/// Outcome of init-all / rebuild-all / clear-all. Cancelled operations are
/// not failures and appear in neither count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BulkSummary {
    pub total_workspaces: usize,
    pub processed: usize,
    pub failed: usize,
    #[serde(default)]
    pub failures: Vec<BulkFailure>,
}

impl BulkSummary {
    #[must_use]
    pub fn new(total_workspaces: usize) -> Self {
        Self {
            total_workspaces,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_failure(&mut self, root: impl Into<String>, message: impl Into<String>) {
        self.failed += 1;
        self.failures.push(BulkFailure {
            root: root.into(),
            message: message.into(),
        });
    }
}
