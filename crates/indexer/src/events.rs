use std::path::PathBuf;

/// Inbound events from the host. The host's callback surfaces (workspace
/// enumeration, filesystem watch, configuration store) are flattened into
/// this channel so the orchestrator's transitions stay explicit and
/// testable without a host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Files were created or deleted somewhere under a root. Pure content
    /// edits are the watch subprocess's business and never arrive here.
    FilesChanged {
        root: PathBuf,
        created_or_deleted: usize,
    },
    /// The editor's ignore-pattern table changed.
    IgnorePatternsChanged { patterns: Vec<(String, bool)> },
    RootAdded { root: PathBuf },
    RootRemoved { root: PathBuf },
}
