use crate::state::{ProgressTracker, RootPaths};
use scour_engine::{watch_args, CommandHandle, CommandRequest, CommandRunner, ProgressHook};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Everything a watch loop needs from its owning service.
#[derive(Clone)]
pub(crate) struct WatchContext {
    pub runner: CommandRunner,
    pub binary: PathBuf,
    pub paths: RootPaths,
    pub progress: Arc<ProgressTracker>,
    pub restart_delay: Duration,
    pub shutdown: Arc<AtomicBool>,
}

/// Supervisor for one root's long-lived `watch` subprocess. The child is
/// restarted after a fixed delay on unexpected exit; `stop` kills it and
/// disables restarts until the next `start`. Start/stop pairs bracket
/// every mutating index operation so the watch process and the mutating
/// command never touch the on-disk index at the same time.
#[derive(Clone, Default)]
pub(crate) struct WatchSupervisor {
    inner: Arc<WatchInner>,
}

#[derive(Default)]
struct WatchInner {
    enabled: AtomicBool,
    alive: AtomicBool,
    generation: AtomicU64,
    handle: StdMutex<Option<CommandHandle>>,
    wake: Notify,
}

impl WatchSupervisor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Kills the current child (if any) and disables restarts.
    pub(crate) fn stop(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.take_handle() {
            handle.cancel();
        }
        self.inner.wake.notify_one();
    }

    /// (Re)starts supervision. Any previous loop is invalidated by the
    /// generation bump and will not restart its child.
    pub(crate) fn start(&self, ctx: WatchContext) {
        self.stop();
        self.inner.enabled.store(true, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.run(ctx, generation).await;
        });
    }

    async fn run(self, ctx: WatchContext, generation: u64) {
        let root_key = ctx.paths.root().display().to_string();
        loop {
            if !self.current(generation) || ctx.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let progress = Arc::clone(&ctx.progress);
            let hook: ProgressHook = Arc::new(move |frame| progress.on_frame(frame));
            let args = watch_args(ctx.paths.config_path());
            let watch_group = format!("{root_key}:watch");
            let spawned = ctx.runner.spawn(CommandRequest {
                binary: &ctx.binary,
                args: &args,
                cwd: ctx.paths.root(),
                group: Some(&watch_group),
                progress: Some(hook),
            });

            let running = match spawned {
                Ok(running) => running,
                Err(err) => {
                    log::error!("failed to start watch for {root_key}: {err}");
                    break;
                }
            };

            self.store_handle(running.handle());
            self.inner.alive.store(true, Ordering::SeqCst);
            // A stop() that raced the spawn bumped the generation before
            // this handle was stored; kill the child ourselves.
            if !self.current(generation) || ctx.shutdown.load(Ordering::SeqCst) {
                if let Some(handle) = self.take_handle() {
                    handle.cancel();
                }
            }
            log::info!("watch started for {root_key}");

            let result = running.wait().await;
            self.inner.alive.store(false, Ordering::SeqCst);
            let cancelled = self
                .take_handle()
                .map(|handle| handle.cancelled())
                .unwrap_or(true);

            if cancelled || !self.current(generation) || ctx.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match result {
                Ok(output) => log::warn!(
                    "watch for {root_key} exited with code {}; restarting in {:?}",
                    output.exit_code,
                    ctx.restart_delay
                ),
                Err(err) => log::warn!(
                    "watch for {root_key} failed: {err}; restarting in {:?}",
                    ctx.restart_delay
                ),
            }

            tokio::select! {
                () = tokio::time::sleep(ctx.restart_delay) => {}
                () = self.inner.wake.notified() => break,
            }
        }
        self.inner.alive.store(false, Ordering::SeqCst);
    }

    fn current(&self, generation: u64) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
            && self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn store_handle(&self, handle: CommandHandle) {
        let mut guard = match self.inner.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(handle);
    }

    fn take_handle(&self) -> Option<CommandHandle> {
        let mut guard = match self.inner.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take()
    }
}
