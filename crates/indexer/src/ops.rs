//! Per-root index operations. Every operation for a root flows through
//! that root's queue, so at most one of these executes at a time and at
//! most one mutating engine process is alive per root at any instant.

use crate::config_sync::{sync_config_file, ManagedRegions};
use crate::service::{RootEntry, ServiceInner};
use scour_engine::{
    build_args, classify_failure, init_args, update_args, CommandRequest, ProgressHook,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperation {
    Init,
    Update { resync_config: bool },
    Rebuild,
    Clear,
}

impl IndexOperation {
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Update { .. } => "update",
            Self::Rebuild => "rebuild",
            Self::Clear => "clear",
        }
    }
}

/// Terminal state of one queued operation. `Cancelled` is distinct from
/// failure so a clear that killed an in-flight update is not reported as
/// a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl OpOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

pub(crate) struct QueuedOp {
    pub op: IndexOperation,
    pub reply: oneshot::Sender<OpOutcome>,
}

pub(crate) async fn execute_op(
    inner: &Arc<ServiceInner>,
    entry: &Arc<RootEntry>,
    op: IndexOperation,
) -> OpOutcome {
    let name = entry.paths.name();
    log::info!("{} for {name} starting", op.describe());
    let outcome = match op {
        IndexOperation::Init => execute_init(inner, entry).await,
        IndexOperation::Update { resync_config } => {
            execute_update(inner, entry, resync_config).await
        }
        IndexOperation::Rebuild => execute_rebuild(inner, entry).await,
        IndexOperation::Clear => execute_clear(entry).await,
    };
    match &outcome {
        OpOutcome::Completed => log::info!("{} for {name} completed", op.describe()),
        OpOutcome::Cancelled => log::info!("{} for {name} cancelled", op.describe()),
        OpOutcome::Failed(message) => log::error!("{} for {name} failed: {message}", op.describe()),
    }
    outcome
}

async fn execute_init(inner: &Arc<ServiceInner>, entry: &Arc<RootEntry>) -> OpOutcome {
    if entry.paths.initialized() {
        // Already on disk: refresh the managed regions and make sure the
        // watch process is running.
        if let Err(message) = sync_managed(inner, entry).await {
            return OpOutcome::Failed(message);
        }
        inner.start_watch(entry);
        return OpOutcome::Completed;
    }

    entry.watch.stop();

    let args = init_args(entry.paths.config_path(), entry.paths.root());
    match run_mutating(inner, entry, "index init failed", &args).await {
        OpOutcome::Completed => {}
        other => return other,
    }

    let args = update_args(entry.paths.config_path());
    match run_mutating(inner, entry, "index update failed", &args).await {
        OpOutcome::Completed => {}
        other => return other,
    }

    if let Err(message) = sync_managed(inner, entry).await {
        return OpOutcome::Failed(message);
    }
    inner.start_watch(entry);
    OpOutcome::Completed
}

async fn execute_update(
    inner: &Arc<ServiceInner>,
    entry: &Arc<RootEntry>,
    resync_config: bool,
) -> OpOutcome {
    if !entry.paths.initialized() {
        return OpOutcome::Failed("index is not initialized (run init first)".to_string());
    }

    // The watch process and the update must not race on the same index.
    entry.watch.stop();

    if resync_config {
        if let Err(message) = sync_managed(inner, entry).await {
            return OpOutcome::Failed(message);
        }
    }

    let args = update_args(entry.paths.config_path());
    let outcome = run_mutating(inner, entry, "index update failed", &args).await;

    // A cancelled update means a clear is queued right behind us; leave
    // the watch down for it.
    if outcome != OpOutcome::Cancelled {
        inner.start_watch(entry);
    }
    outcome
}

async fn execute_rebuild(inner: &Arc<ServiceInner>, entry: &Arc<RootEntry>) -> OpOutcome {
    entry.watch.stop();

    if !entry.paths.initialized() {
        let args = init_args(entry.paths.config_path(), entry.paths.root());
        match run_mutating(inner, entry, "index init failed", &args).await {
            OpOutcome::Completed => {}
            other => return other,
        }
    }

    let args = build_args(entry.paths.config_path());
    match run_mutating(inner, entry, "index rebuild failed", &args).await {
        OpOutcome::Completed => {}
        other => return other,
    }

    if let Err(message) = sync_managed(inner, entry).await {
        return OpOutcome::Failed(message);
    }
    inner.start_watch(entry);
    OpOutcome::Completed
}

async fn execute_clear(entry: &Arc<RootEntry>) -> OpOutcome {
    entry.cancel_requested.store(false, Ordering::SeqCst);
    entry.watch.stop();
    entry.cancel_active();

    match tokio::fs::remove_dir_all(entry.paths.index_dir()).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return OpOutcome::Failed(format!("failed to remove index directory: {err}"));
        }
    }

    entry.progress.reset();
    OpOutcome::Completed
}

/// Runs one mutating engine command for a root: progress streamed into the
/// root's tracker, the handle parked where a concurrent clear can kill it,
/// cancellation reported as such.
async fn run_mutating(
    inner: &Arc<ServiceInner>,
    entry: &Arc<RootEntry>,
    purpose: &str,
    args: &[String],
) -> OpOutcome {
    let progress = Arc::clone(&entry.progress);
    let hook: ProgressHook = Arc::new(move |frame| progress.on_frame(frame));
    let group = entry.paths.root().display().to_string();

    entry.progress.set_indexing(true);
    let spawned = inner.runner.spawn(CommandRequest {
        binary: &inner.binary,
        args,
        cwd: entry.paths.root(),
        group: Some(&group),
        progress: Some(hook),
    });

    let running = match spawned {
        Ok(running) => running,
        Err(err) => {
            entry.progress.set_indexing(false);
            return OpOutcome::Failed(format!("{purpose}: {err}"));
        }
    };

    let handle = running.handle();
    entry.set_active(handle.clone());
    // A clear that raced the spawn latched its request before this handle
    // was parked; honor it now.
    if entry.cancel_requested.load(Ordering::SeqCst) {
        handle.cancel();
    }
    let result = running.wait().await;
    entry.clear_active();
    entry.progress.set_indexing(false);

    match result {
        Err(err) => OpOutcome::Failed(format!("{purpose}: {err}")),
        Ok(output) => {
            if handle.cancelled() {
                OpOutcome::Cancelled
            } else if output.exit_code != 0 {
                OpOutcome::Failed(classify_failure(purpose, &output))
            } else {
                OpOutcome::Completed
            }
        }
    }
}

async fn sync_managed(
    inner: &Arc<ServiceInner>,
    entry: &Arc<RootEntry>,
) -> std::result::Result<bool, String> {
    let ignore = inner.ignore_patterns();
    let regions = ManagedRegions::derive(
        &inner.config.shader_extensions,
        &inner.config.script_extensions,
        &ignore,
    );
    sync_config_file(entry.paths.config_path(), &regions)
        .await
        .map_err(|err| format!("config sync failed: {err}"))
}

pub(crate) async fn root_worker(
    inner: Arc<ServiceInner>,
    entry: Arc<RootEntry>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<QueuedOp>,
) {
    while let Some(queued) = rx.recv().await {
        let outcome = if inner.is_shutting_down() {
            OpOutcome::Cancelled
        } else {
            execute_op(&inner, &entry, queued.op).await
        };
        entry.pending_ops.fetch_sub(1, Ordering::SeqCst);
        let _ = queued.reply.send(outcome);
    }
}
