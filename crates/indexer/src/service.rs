use crate::debounce::{AutoUpdateState, DebounceSignal};
use crate::error::{IndexerError, Result};
use crate::events::HostEvent;
use crate::ops::{root_worker, IndexOperation, OpOutcome, QueuedOp};
use crate::state::{ProgressTracker, RootPaths};
use crate::status::aggregate_progress;
use crate::watch::{WatchContext, WatchSupervisor};
use scour_engine::{resolve_engine_binary, CommandHandle, CommandRunner};
use scour_protocol::{BulkSummary, ProgressSnapshot, RootStatus, WorkspaceStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Tuning and environment for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Explicit engine binary; `None` falls back to `SCOUR_ENGINE` and
    /// then `qgrep` on `PATH`.
    pub engine_path: Option<PathBuf>,
    /// Extensions covered by the managed shader include rules.
    pub shader_extensions: Vec<String>,
    /// Extensions covered by the managed script include rules.
    pub script_extensions: Vec<String>,
    /// Editor ignore table: pattern and enabled flag.
    pub ignore_patterns: Vec<(String, bool)>,
    /// Debounce window for filesystem create/delete events.
    pub fs_debounce: Duration,
    /// Debounce window for ignore-pattern changes.
    pub config_debounce: Duration,
    /// Retry interval when a debounce fires while an operation runs.
    pub defer_retry: Duration,
    /// Delay before restarting an unexpectedly dead watch process.
    pub watch_restart_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            shader_extensions: ["hlsl", "hlsli", "glsl", "fx", "shader", "cginc"]
                .map(str::to_string)
                .to_vec(),
            script_extensions: ["lua", "py", "js", "cs", "gd"].map(str::to_string).to_vec(),
            ignore_patterns: Vec::new(),
            fs_debounce: Duration::from_millis(2000),
            config_debounce: Duration::from_millis(500),
            defer_retry: Duration::from_millis(500),
            watch_restart_delay: Duration::from_secs(5),
        }
    }
}

/// Read-only view of one root for query planning and status rendering.
#[derive(Debug, Clone)]
pub struct RootInfo {
    pub root: PathBuf,
    pub name: String,
    pub config_path: PathBuf,
    pub initialized: bool,
    pub watch_alive: bool,
    pub progress: ProgressSnapshot,
    pub pending_ops: usize,
}

pub(crate) struct RootEntry {
    pub(crate) paths: RootPaths,
    pub(crate) progress: Arc<ProgressTracker>,
    pub(crate) pending_ops: AtomicUsize,
    pub(crate) watch: WatchSupervisor,
    /// Latched by a queued clear so a mutating command that is mid-spawn
    /// still sees the cancellation. Reset when the clear executes.
    pub(crate) cancel_requested: AtomicBool,
    ops_tx: mpsc::UnboundedSender<QueuedOp>,
    debounce_tx: mpsc::UnboundedSender<DebounceSignal>,
    active_cmd: StdMutex<Option<CommandHandle>>,
}

impl RootEntry {
    pub(crate) fn set_active(&self, handle: CommandHandle) {
        *self.lock_active() = Some(handle);
    }

    pub(crate) fn clear_active(&self) {
        *self.lock_active() = None;
    }

    /// Best-effort kill of the in-flight mutating command, if any.
    pub(crate) fn cancel_active(&self) {
        if let Some(handle) = self.lock_active().take() {
            handle.cancel();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CommandHandle>> {
        match self.active_cmd.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub(crate) struct ServiceInner {
    pub(crate) config: ServiceConfig,
    pub(crate) binary: PathBuf,
    pub(crate) runner: CommandRunner,
    roots: StdMutex<HashMap<PathBuf, Arc<RootEntry>>>,
    ignore: StdMutex<Vec<(String, bool)>>,
    shutdown: Arc<AtomicBool>,
}

impl ServiceInner {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn ignore_patterns(&self) -> Vec<(String, bool)> {
        match self.ignore.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Starts the watch supervisor for an initialized root unless the
    /// service is going down.
    pub(crate) fn start_watch(&self, entry: &Arc<RootEntry>) {
        if self.is_shutting_down() || !entry.paths.initialized() {
            return;
        }
        entry.watch.start(WatchContext {
            runner: self.runner.clone(),
            binary: self.binary.clone(),
            paths: entry.paths.clone(),
            progress: Arc::clone(&entry.progress),
            restart_delay: self.config.watch_restart_delay,
            shutdown: Arc::clone(&self.shutdown),
        });
    }

    fn lock_roots(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<RootEntry>>> {
        match self.roots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The per-workspace indexing service: one entry per root, one serialized
/// operation queue per root, watch supervision, and debounced auto
/// updates. Owned by whoever wires the system together; there is no
/// global instance.
#[derive(Clone)]
pub struct IndexService {
    inner: Arc<ServiceInner>,
}

impl IndexService {
    /// Resolves the engine binary and creates an empty service. Roots are
    /// registered separately via [`IndexService::add_root`] or
    /// [`HostEvent::RootAdded`].
    pub fn start(config: ServiceConfig) -> Result<Self> {
        let binary = resolve_engine_binary(config.engine_path.as_deref())?;
        log::info!("index service using engine at {}", binary.display());
        let ignore = config.ignore_patterns.clone();
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                binary,
                runner: CommandRunner::new(),
                roots: StdMutex::new(HashMap::new()),
                ignore: StdMutex::new(ignore),
                shutdown: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    #[must_use]
    pub fn engine_binary(&self) -> &Path {
        &self.inner.binary
    }

    #[must_use]
    pub fn runner(&self) -> &CommandRunner {
        &self.inner.runner
    }

    /// Registers a root and spawns its worker and auto-update loops. A
    /// root that is already initialized on disk gets its watch process
    /// immediately.
    pub fn add_root(&self, root: impl Into<PathBuf>) -> Result<()> {
        if self.inner.is_shutting_down() {
            return Err(IndexerError::ShutDown);
        }
        let paths = RootPaths::new(root);
        let key = paths.root().to_path_buf();

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (debounce_tx, debounce_rx) = mpsc::unbounded_channel();
        let entry = Arc::new(RootEntry {
            paths,
            progress: Arc::new(ProgressTracker::new()),
            pending_ops: AtomicUsize::new(0),
            watch: WatchSupervisor::new(),
            cancel_requested: AtomicBool::new(false),
            ops_tx,
            debounce_tx,
            active_cmd: StdMutex::new(None),
        });

        {
            let mut roots = self.inner.lock_roots();
            if roots.contains_key(&key) {
                log::debug!("root {} already registered", key.display());
                return Ok(());
            }
            roots.insert(key.clone(), Arc::clone(&entry));
        }

        tokio::spawn(root_worker(
            Arc::clone(&self.inner),
            Arc::clone(&entry),
            ops_rx,
        ));
        tokio::spawn(auto_update_loop(
            Arc::clone(&self.inner),
            Arc::clone(&entry),
            debounce_rx,
        ));

        if entry.paths.initialized() {
            self.inner.start_watch(&entry);
        }
        log::info!("root added: {}", key.display());
        Ok(())
    }

    /// Drops a root: watch and timers stopped, queued operations
    /// abandoned. On-disk index artifacts are left alone.
    pub fn remove_root(&self, root: &Path) {
        let entry = self.inner.lock_roots().remove(root);
        if let Some(entry) = entry {
            entry.watch.stop();
            entry.cancel_active();
            let _ = entry.debounce_tx.send(DebounceSignal::Shutdown);
            log::info!("root removed: {}", root.display());
        }
    }

    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::FilesChanged {
                root,
                created_or_deleted,
            } => {
                if let Some(entry) = self.entry(&root) {
                    let _ = entry
                        .debounce_tx
                        .send(DebounceSignal::Files { created_or_deleted });
                }
            }
            HostEvent::IgnorePatternsChanged { patterns } => {
                {
                    let mut guard = match self.inner.ignore.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *guard = patterns;
                }
                for entry in self.entries() {
                    let _ = entry.debounce_tx.send(DebounceSignal::IgnoreConfig);
                }
            }
            HostEvent::RootAdded { root } => {
                if let Err(err) = self.add_root(root) {
                    log::error!("failed to add root: {err}");
                }
            }
            HostEvent::RootRemoved { root } => self.remove_root(&root),
        }
    }

    pub async fn init_root(&self, root: &Path) -> Result<OpOutcome> {
        self.run_op(root, IndexOperation::Init).await
    }

    pub async fn update_root(&self, root: &Path) -> Result<OpOutcome> {
        self.run_op(
            root,
            IndexOperation::Update {
                resync_config: false,
            },
        )
        .await
    }

    pub async fn rebuild_root(&self, root: &Path) -> Result<OpOutcome> {
        self.run_op(root, IndexOperation::Rebuild).await
    }

    /// Clears a root. Stops the watch process and kills any in-flight
    /// mutating command *before* queueing, so the running operation is
    /// cancelled rather than awaited.
    pub async fn clear_root(&self, root: &Path) -> Result<OpOutcome> {
        let entry = self
            .entry(root)
            .ok_or_else(|| IndexerError::UnknownRoot(root.display().to_string()))?;
        entry.watch.stop();
        entry.cancel_requested.store(true, Ordering::SeqCst);
        entry.cancel_active();
        let rx = self.enqueue(&entry, IndexOperation::Clear)?;
        rx.await.map_err(|_| IndexerError::ShutDown)
    }

    /// Fire-and-forget init used by queries that found their target
    /// uninitialized. The per-root queue serializes this with any
    /// concurrent admin-triggered operation.
    pub fn request_init(&self, root: &Path) -> Result<()> {
        let entry = self
            .entry(root)
            .ok_or_else(|| IndexerError::UnknownRoot(root.display().to_string()))?;
        let rx = self.enqueue(&entry, IndexOperation::Init)?;
        tokio::spawn(async move {
            let _ = rx.await;
        });
        Ok(())
    }

    pub async fn init_all(&self) -> Result<BulkSummary> {
        self.run_bulk(IndexOperation::Init).await
    }

    pub async fn rebuild_all(&self) -> Result<BulkSummary> {
        self.run_bulk(IndexOperation::Rebuild).await
    }

    pub async fn clear_all(&self) -> Result<BulkSummary> {
        let roots: Vec<PathBuf> = self
            .entries()
            .iter()
            .map(|entry| entry.paths.root().to_path_buf())
            .collect();
        if roots.is_empty() {
            return Err(IndexerError::NoRoots);
        }

        let mut summary = BulkSummary::new(roots.len());
        for root in roots {
            match self.clear_root(&root).await {
                Ok(OpOutcome::Completed) | Ok(OpOutcome::Cancelled) => summary.record_success(),
                Ok(OpOutcome::Failed(message)) => {
                    summary.record_failure(root.display().to_string(), message);
                }
                Err(err) => summary.record_failure(root.display().to_string(), err.to_string()),
            }
        }
        Ok(summary)
    }

    #[must_use]
    pub fn is_initialized(&self, root: &Path) -> bool {
        self.entry(root)
            .map(|entry| entry.paths.initialized())
            .unwrap_or(false)
    }

    /// Queued-or-running operation count for a root; 0 when idle.
    #[must_use]
    pub fn pending_operations(&self, root: &Path) -> usize {
        self.entry(root)
            .map(|entry| entry.pending_ops.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn root_infos(&self) -> Vec<RootInfo> {
        let mut infos: Vec<RootInfo> = self
            .entries()
            .iter()
            .map(|entry| RootInfo {
                root: entry.paths.root().to_path_buf(),
                name: entry.paths.name(),
                config_path: entry.paths.config_path().to_path_buf(),
                initialized: entry.paths.initialized(),
                watch_alive: entry.watch.alive(),
                progress: entry.progress.snapshot(),
                pending_ops: entry.pending_ops.load(Ordering::SeqCst),
            })
            .collect();
        infos.sort_by(|a, b| a.root.cmp(&b.root));
        infos
    }

    #[must_use]
    pub fn status(&self) -> WorkspaceStatus {
        let roots: Vec<RootStatus> = self
            .root_infos()
            .into_iter()
            .map(|info| RootStatus {
                root: info.root.display().to_string(),
                name: info.name,
                initialized: info.initialized,
                watch_alive: info.watch_alive,
                progress: if info.initialized {
                    info.progress
                } else {
                    ProgressSnapshot::default()
                },
            })
            .collect();
        let aggregate = aggregate_progress(&roots);
        WorkspaceStatus { roots, aggregate }
    }

    /// Stops every watch process and timer and abandons queued work.
    /// Idempotent; a second call is a no-op.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("index service shutting down");
        let entries: Vec<Arc<RootEntry>> = {
            let mut roots = self.inner.lock_roots();
            roots.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.watch.stop();
            entry.cancel_active();
            let _ = entry.debounce_tx.send(DebounceSignal::Shutdown);
        }
    }

    async fn run_op(&self, root: &Path, op: IndexOperation) -> Result<OpOutcome> {
        let entry = self
            .entry(root)
            .ok_or_else(|| IndexerError::UnknownRoot(root.display().to_string()))?;
        let rx = self.enqueue(&entry, op)?;
        rx.await.map_err(|_| IndexerError::ShutDown)
    }

    async fn run_bulk(&self, op: IndexOperation) -> Result<BulkSummary> {
        let entries = self.entries();
        if entries.is_empty() {
            return Err(IndexerError::NoRoots);
        }

        let mut summary = BulkSummary::new(entries.len());
        let mut waits = Vec::with_capacity(entries.len());
        for entry in &entries {
            let display = entry.paths.root().display().to_string();
            match self.enqueue(entry, op) {
                Ok(rx) => waits.push((display, rx)),
                Err(err) => summary.record_failure(display, err.to_string()),
            }
        }

        for (root, rx) in waits {
            match rx.await {
                Ok(OpOutcome::Completed) => summary.record_success(),
                Ok(OpOutcome::Cancelled) => {
                    log::info!("{} for {root} cancelled", op.describe());
                }
                Ok(OpOutcome::Failed(message)) => summary.record_failure(root, message),
                Err(_) => summary.record_failure(root, IndexerError::ShutDown.to_string()),
            }
        }
        Ok(summary)
    }

    fn enqueue(
        &self,
        entry: &Arc<RootEntry>,
        op: IndexOperation,
    ) -> Result<oneshot::Receiver<OpOutcome>> {
        if self.inner.is_shutting_down() {
            return Err(IndexerError::ShutDown);
        }
        let (reply, rx) = oneshot::channel();
        entry.pending_ops.fetch_add(1, Ordering::SeqCst);
        entry
            .ops_tx
            .send(QueuedOp { op, reply })
            .map_err(|_| {
                entry.pending_ops.fetch_sub(1, Ordering::SeqCst);
                IndexerError::ShutDown
            })?;
        Ok(rx)
    }

    fn entry(&self, root: &Path) -> Option<Arc<RootEntry>> {
        self.inner.lock_roots().get(root).cloned()
    }

    fn entries(&self) -> Vec<Arc<RootEntry>> {
        let mut entries: Vec<Arc<RootEntry>> = self.inner.lock_roots().values().cloned().collect();
        entries.sort_by(|a, b| a.paths.root().cmp(b.paths.root()));
        entries
    }
}

/// One root's auto-update loop: debounced filesystem and ignore-config
/// triggers coalesce into single queued updates, deferring while another
/// operation runs.
async fn auto_update_loop(
    inner: Arc<ServiceInner>,
    entry: Arc<RootEntry>,
    mut rx: mpsc::UnboundedReceiver<DebounceSignal>,
) {
    let mut state = AutoUpdateState::new(
        inner.config.fs_debounce,
        inner.config.config_debounce,
        inner.config.defer_retry,
    );

    loop {
        let deadline = state.next_deadline();
        tokio::select! {
            signal = rx.recv() => {
                match signal {
                    Some(DebounceSignal::Files { created_or_deleted }) => {
                        state.record_files(created_or_deleted);
                    }
                    Some(DebounceSignal::IgnoreConfig) => state.record_config(),
                    Some(DebounceSignal::Shutdown) | None => break,
                }
            }
            () = async {
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                if inner.is_shutting_down() {
                    break;
                }
                if entry.pending_ops.load(Ordering::SeqCst) > 0 {
                    // An operation is mid-flight; retry once it finishes.
                    state.defer();
                    continue;
                }
                if !entry.paths.initialized() {
                    // Events against a cleared root are stale.
                    state.clear();
                    continue;
                }

                let request = state.fire();
                log::debug!(
                    "auto update for {} (resync_config: {})",
                    entry.paths.name(),
                    request.resync_config
                );
                let service = IndexService { inner: Arc::clone(&inner) };
                match service.enqueue(&entry, IndexOperation::Update {
                    resync_config: request.resync_config,
                }) {
                    Ok(rx) => {
                        tokio::spawn(async move {
                            if let Ok(OpOutcome::Failed(message)) = rx.await {
                                log::error!("auto update failed: {message}");
                            }
                        });
                    }
                    Err(err) => {
                        log::debug!("auto update not queued: {err}");
                        break;
                    }
                }
            }
        }
    }
}
