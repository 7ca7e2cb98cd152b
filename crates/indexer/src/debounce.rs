use std::time::Duration;
use tokio::time::Instant;

/// Signals feeding one root's auto-update loop.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DebounceSignal {
    Files { created_or_deleted: usize },
    IgnoreConfig,
    Shutdown,
}

/// What a fired debounce asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpdateRequest {
    pub resync_config: bool,
}

/// Per-root debounce state. Each triggering event cancels and reschedules
/// its own timer; filesystem events use a longer window than an
/// ignore-config resync. Events never accumulate into multiple queued
/// updates: one fire drains everything seen so far.
#[derive(Debug)]
pub(crate) struct AutoUpdateState {
    fs_delay: Duration,
    config_delay: Duration,
    retry_delay: Duration,
    fs_deadline: Option<Instant>,
    config_deadline: Option<Instant>,
    pending_create_delete: usize,
    config_dirty: bool,
}

impl AutoUpdateState {
    pub(crate) fn new(fs_delay: Duration, config_delay: Duration, retry_delay: Duration) -> Self {
        Self {
            fs_delay,
            config_delay,
            retry_delay,
            fs_deadline: None,
            config_deadline: None,
            pending_create_delete: 0,
            config_dirty: false,
        }
    }

    pub(crate) fn record_files(&mut self, created_or_deleted: usize) {
        self.pending_create_delete += created_or_deleted.max(1);
        self.fs_deadline = Some(Instant::now() + self.fs_delay);
    }

    pub(crate) fn record_config(&mut self) {
        self.config_dirty = true;
        self.config_deadline = Some(Instant::now() + self.config_delay);
    }

    /// An operation is already running; try again shortly instead of
    /// queueing a second concurrent update.
    pub(crate) fn defer(&mut self) {
        let retry = Instant::now() + self.retry_delay;
        if self.fs_deadline.is_some() {
            self.fs_deadline = Some(retry);
        }
        if self.config_deadline.is_some() {
            self.config_deadline = Some(retry);
        }
    }

    pub(crate) fn dirty(&self) -> bool {
        self.fs_deadline.is_some() || self.config_deadline.is_some()
    }

    pub(crate) fn pending_create_delete(&self) -> usize {
        self.pending_create_delete
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match (self.fs_deadline, self.config_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drains the armed state into one update request.
    pub(crate) fn fire(&mut self) -> UpdateRequest {
        let request = UpdateRequest {
            resync_config: self.config_dirty,
        };
        self.clear();
        request
    }

    pub(crate) fn clear(&mut self) {
        self.fs_deadline = None;
        self.config_deadline = None;
        self.pending_create_delete = 0;
        self.config_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state() -> AutoUpdateState {
        AutoUpdateState::new(
            Duration::from_millis(2000),
            Duration::from_millis(500),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn file_events_coalesce_into_one_request() {
        let mut state = state();
        state.record_files(1);
        state.record_files(3);
        assert!(state.dirty());
        assert_eq!(state.pending_create_delete(), 4);

        let request = state.fire();
        assert_eq!(request, UpdateRequest {
            resync_config: false
        });
        assert!(!state.dirty());
        assert_eq!(state.pending_create_delete(), 0);
    }

    #[tokio::test]
    async fn config_window_is_shorter_than_fs_window() {
        let mut state = state();
        state.record_files(1);
        let fs_only = state.next_deadline().unwrap();
        state.record_config();
        let with_config = state.next_deadline().unwrap();
        assert!(with_config < fs_only);
        assert!(state.fire().resync_config);
    }

    #[tokio::test]
    async fn new_events_reschedule_the_timer() {
        let mut state = state();
        state.record_files(1);
        let first = state.next_deadline().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.record_files(1);
        let second = state.next_deadline().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn defer_pushes_armed_deadlines_only() {
        let mut state = state();
        state.record_config();
        state.defer();
        assert!(state.fs_deadline.is_none());
        assert!(state.config_deadline.is_some());
        assert!(state.dirty());
    }
}
