use scour_engine::ProgressFrame;
use scour_protocol::ProgressSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

/// Name of the per-root directory holding the engine's index artifacts.
pub const INDEX_DIR_NAME: &str = ".scour";

/// Name of the engine config descriptor inside the index directory. Its
/// existence is what "initialized" means for a root.
pub const CONFIG_FILE_NAME: &str = "scour.cfg";

/// Paths derived once per workspace root, stable for the root's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPaths {
    root: PathBuf,
    index_dir: PathBuf,
    config_path: PathBuf,
}

impl RootPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let index_dir = root.join(INDEX_DIR_NAME);
        let config_path = index_dir.join(CONFIG_FILE_NAME);
        Self {
            root,
            index_dir,
            config_path,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Last path component, used for `Name/relative` search scoping and
    /// log lines.
    #[must_use]
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// The on-disk index artifacts exist iff the descriptor exists.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.config_path.is_file()
    }
}

#[derive(Debug, Default, Clone)]
struct ProgressInner {
    indexed: Option<u64>,
    total: Option<u64>,
    percent: Option<u8>,
    known: bool,
    indexing: bool,
}

/// Mutable progress state for one root, updated from engine progress
/// frames and read as immutable snapshots.
///
/// `known` latches true on the first 100% frame and stays true until
/// [`ProgressTracker::reset`] (a cleared index). Within one operation the
/// indexed count never goes backwards; a new operation may start below the
/// previous one's final count.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: StdMutex<ProgressInner>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(&self, frame: ProgressFrame) {
        let mut inner = self.lock();
        let floor = if inner.indexing {
            inner.indexed.unwrap_or(0)
        } else {
            0
        };
        inner.indexed = Some(frame.files.max(floor));
        inner.percent = Some(frame.percent);
        if frame.percent == 100 {
            inner.total = Some(frame.files.max(floor));
            inner.known = true;
        }
    }

    pub fn set_indexing(&self, indexing: bool) {
        let mut inner = self.lock();
        inner.indexing = indexing;
        if indexing {
            // A fresh operation restarts its own counters.
            inner.indexed = None;
            inner.percent = None;
        }
    }

    /// Back to unknown; used when the index is cleared.
    pub fn reset(&self) {
        *self.lock() = ProgressInner::default();
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.lock().clone();
        let remaining = match (inner.total, inner.indexed) {
            (Some(total), Some(indexed)) => Some(total.saturating_sub(indexed)),
            (Some(total), None) => Some(total),
            _ => None,
        };
        ProgressSnapshot {
            indexed: inner.indexed,
            total: inner.total,
            remaining,
            percent: inner.percent,
            known: inner.known,
            indexing: inner.indexing,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derived_paths() {
        let paths = RootPaths::new("/work/alpha");
        assert_eq!(paths.index_dir(), Path::new("/work/alpha/.scour"));
        assert_eq!(
            paths.config_path(),
            Path::new("/work/alpha/.scour/scour.cfg")
        );
        assert_eq!(paths.name(), "alpha");
    }

    #[test]
    fn progress_unknown_until_completion_frame() {
        let tracker = ProgressTracker::new();
        tracker.set_indexing(true);
        tracker.on_frame(ProgressFrame {
            percent: 40,
            files: 400,
        });

        let snap = tracker.snapshot();
        assert!(!snap.known);
        assert_eq!(snap.indexed, Some(400));
        assert_eq!(snap.total, None);
        assert!(snap.indexing);

        tracker.on_frame(ProgressFrame {
            percent: 100,
            files: 1000,
        });
        tracker.set_indexing(false);

        let snap = tracker.snapshot();
        assert!(snap.known);
        assert_eq!(snap.total, Some(1000));
        assert_eq!(snap.remaining, Some(0));
        assert!(!snap.indexing);
    }

    #[test]
    fn indexed_count_is_monotone_within_an_operation() {
        let tracker = ProgressTracker::new();
        tracker.set_indexing(true);
        tracker.on_frame(ProgressFrame {
            percent: 50,
            files: 500,
        });
        // The engine never goes backwards; if a frame did, keep the floor.
        tracker.on_frame(ProgressFrame {
            percent: 60,
            files: 450,
        });
        assert_eq!(tracker.snapshot().indexed, Some(500));
    }

    #[test]
    fn known_survives_later_operations_until_reset() {
        let tracker = ProgressTracker::new();
        tracker.set_indexing(true);
        tracker.on_frame(ProgressFrame {
            percent: 100,
            files: 10,
        });
        tracker.set_indexing(false);

        tracker.set_indexing(true);
        tracker.on_frame(ProgressFrame {
            percent: 10,
            files: 1,
        });
        assert!(tracker.snapshot().known);

        tracker.reset();
        let snap = tracker.snapshot();
        assert!(!snap.known);
        assert_eq!(snap.indexed, None);
        assert_eq!(snap.total, None);
    }
}
