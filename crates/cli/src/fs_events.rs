//! Filesystem event source for `serve`: one recursive watcher per root
//! plus one on the config file, translated into host events for the
//! service. Only create/remove events matter to the index — content edits
//! are the engine watch process's job.

use crate::config::CliConfig;
use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use scour_indexer::{HostEvent, IndexService, INDEX_DIR_NAME};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Holds the native watcher handles alive for the lifetime of `serve`.
pub struct FsEventSource {
    _watchers: Vec<RecommendedWatcher>,
}

impl FsEventSource {
    /// Watches every root (and the config file, when one was loaded) and
    /// forwards classified events to the service until the channel dies.
    pub fn start(
        service: IndexService,
        roots: &[PathBuf],
        config_path: Option<PathBuf>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>(1024);

        let mut watchers = Vec::new();
        for root in roots {
            let sender = tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |event| {
                    let _ = sender.blocking_send(event);
                },
                NotifyConfig::default(),
            )
            .context("failed to create filesystem watcher")?;
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("failed to watch {}", root.display()))?;
            watchers.push(watcher);
        }

        if let Some(config) = &config_path {
            let sender = tx.clone();
            let mut watcher = RecommendedWatcher::new(
                move |event| {
                    let _ = sender.blocking_send(event);
                },
                NotifyConfig::default(),
            )
            .context("failed to create config watcher")?;
            watcher
                .watch(config, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to watch {}", config.display()))?;
            watchers.push(watcher);
        }

        let roots = roots.to_vec();
        tokio::spawn(dispatch_loop(service, roots, config_path, rx));

        Ok(Self {
            _watchers: watchers,
        })
    }
}

async fn dispatch_loop(
    service: IndexService,
    roots: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    mut rx: mpsc::Receiver<notify::Result<Event>>,
) {
    while let Some(event) = rx.recv().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                log::warn!("watcher error: {err}");
                continue;
            }
        };

        if let Some(config) = &config_path {
            if event.paths.iter().any(|p| p == config) {
                reload_ignore_patterns(&service, config);
                continue;
            }
        }

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_)) {
            continue;
        }

        for root in &roots {
            let relevant = event
                .paths
                .iter()
                .filter(|path| is_relevant(root, path))
                .count();
            if relevant > 0 {
                service.handle_event(HostEvent::FilesChanged {
                    root: root.clone(),
                    created_or_deleted: relevant,
                });
            }
        }
    }
}

fn reload_ignore_patterns(service: &IndexService, config: &Path) {
    match CliConfig::load(Some(config)) {
        Ok((config, _)) => {
            log::info!("ignore patterns reloaded");
            service.handle_event(HostEvent::IgnorePatternsChanged {
                patterns: config.ignore_patterns(),
            });
        }
        Err(err) => log::warn!("config reload failed: {err:#}"),
    }
}

/// Events inside the index directory or version control metadata would
/// only feed the index back to itself.
fn is_relevant(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    !relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == INDEX_DIR_NAME || name == ".git" || name == ".hg" || name == ".svn"
    })
}
