use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{oneshot, Notify};

/// One recognized progress line from the engine's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressFrame {
    pub percent: u8,
    pub files: u64,
}

/// Called for every recognized frame while the process is still running.
pub type ProgressHook = Arc<dyn Fn(ProgressFrame) + Send + Sync>;

/// Structured result of a finished engine command. A non-zero exit code is
/// data here; callers decide whether it is a failure via
/// [`classify_failure`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub struct CommandRequest<'a> {
    pub binary: &'a Path,
    pub args: &'a [String],
    pub cwd: &'a Path,
    /// Active-handle accounting key, usually the owning root path.
    pub group: Option<&'a str>,
    pub progress: Option<ProgressHook>,
}

/// Cancel/inspect handle that stays valid while the command runs.
#[derive(Clone)]
pub struct CommandHandle {
    cancel_flag: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

impl CommandHandle {
    /// Best-effort kill: signal and forget. The owning task keeps draining
    /// output until the process actually exits.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.kill.notify_one();
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }
}

pub struct RunningCommand {
    handle: CommandHandle,
    done: oneshot::Receiver<Result<CommandOutput>>,
}

impl RunningCommand {
    #[must_use]
    pub fn handle(&self) -> CommandHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.handle.cancelled()
    }

    pub async fn wait(self) -> Result<CommandOutput> {
        self.done
            .await
            .map_err(|_| EngineError::Other("command task dropped before completion".to_string()))?
    }
}

/// Spawns engine commands and tracks how many are alive per group so the
/// one-mutating-process-per-root invariant stays observable.
#[derive(Clone, Default)]
pub struct CommandRunner {
    active: Arc<StdMutex<HashMap<String, usize>>>,
}

impl CommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live process count for a group key.
    #[must_use]
    pub fn active_in_group(&self, group: &str) -> usize {
        let map = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(group).copied().unwrap_or(0)
    }

    /// Spawn and wait in one step.
    pub async fn run(&self, request: CommandRequest<'_>) -> Result<CommandOutput> {
        self.spawn(request)?.wait().await
    }

    /// Spawns the command and returns a handle. Spawn failures surface
    /// synchronously; everything after that is reported through `wait`.
    pub fn spawn(&self, request: CommandRequest<'_>) -> Result<RunningCommand> {
        let mut command = Command::new(request.binary);
        command
            .args(request.args)
            .current_dir(request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            binary: request.binary.to_path_buf(),
            source,
        })?;

        log::debug!(
            "spawned engine {} {:?} (cwd {})",
            request.binary.display(),
            request.args,
            request.cwd.display()
        );

        let guard = ActiveGuard::acquire(
            Arc::clone(&self.active),
            request.group.unwrap_or("").to_string(),
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let progress = request.progress;

        let cancel_flag = Arc::new(AtomicBool::new(false));
        let kill = Arc::new(Notify::new());
        let handle = CommandHandle {
            cancel_flag: Arc::clone(&cancel_flag),
            kill: Arc::clone(&kill),
        };

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _guard = guard;

            let stderr_task = tokio::spawn(async move {
                let mut bytes = Vec::new();
                if let Some(mut pipe) = stderr {
                    let _ = pipe.read_to_end(&mut bytes).await;
                }
                bytes
            });

            let mut scanner = ProgressScanner::new();
            let mut stdout_bytes = Vec::new();
            let mut killed = false;

            if let Some(mut pipe) = stdout {
                let mut chunk = [0u8; 8192];
                loop {
                    tokio::select! {
                        read = pipe.read(&mut chunk) => {
                            match read {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    stdout_bytes.extend_from_slice(&chunk[..n]);
                                    scanner.feed(&chunk[..n], progress.as_ref());
                                }
                            }
                        }
                        () = kill.notified(), if !killed => {
                            killed = true;
                            let _ = child.start_kill();
                        }
                    }
                }
            }
            scanner.finish(progress.as_ref());

            // A cancel can race the end of the stdout stream.
            if !killed && cancel_flag.load(Ordering::SeqCst) {
                let _ = child.start_kill();
            }

            let status = child.wait().await;
            let stderr_bytes = stderr_task.await.unwrap_or_default();

            let result = status.map_err(EngineError::Io).map(|status| CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            });
            let _ = done_tx.send(result);
        });

        Ok(RunningCommand {
            handle,
            done: done_rx,
        })
    }
}

/// Incremental recognizer for `[ NNN%] NNN files` progress frames.
/// Buffers partial lines across chunk boundaries; a line is only scanned
/// once its terminating newline arrives or the stream closes.
#[derive(Default)]
pub struct ProgressScanner {
    pending: Vec<u8>,
}

impl ProgressScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8], hook: Option<&ProgressHook>) {
        self.pending.extend_from_slice(chunk);
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            scan_line(&line, hook);
        }
    }

    pub fn finish(&mut self, hook: Option<&ProgressHook>) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            scan_line(&line, hook);
        }
    }
}

fn scan_line(raw: &[u8], hook: Option<&ProgressHook>) {
    let Some(hook) = hook else { return };
    let line = String::from_utf8_lossy(raw);
    if let Some(frame) = parse_progress_frame(line.trim_end()) {
        hook(frame);
    }
}

/// Parses one `[ NNN%] NNN files` line. Anything else returns `None`.
#[must_use]
pub fn parse_progress_frame(line: &str) -> Option<ProgressFrame> {
    let rest = line.strip_prefix('[')?;
    let (percent_raw, rest) = rest.split_once("%]")?;
    let percent: u8 = percent_raw.trim().parse().ok()?;
    if percent > 100 {
        return None;
    }

    let rest = rest.trim_start();
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let files: u64 = rest[..digits_end].parse().ok()?;
    rest[digits_end..]
        .trim_start()
        .starts_with("files")
        .then_some(ProgressFrame { percent, files })
}

/// Derives the user-facing failure message for a finished command: the
/// first `Error`-prefixed stderr line, else raw stderr, else the exit
/// code, prefixed with the command's purpose.
#[must_use]
pub fn classify_failure(purpose: &str, output: &CommandOutput) -> String {
    let detail = output
        .stderr
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Error"))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                format!("engine exited with code {}", output.exit_code)
            } else {
                stderr.to_string()
            }
        });
    format!("{purpose}: {detail}")
}

struct ActiveGuard {
    map: Arc<StdMutex<HashMap<String, usize>>>,
    key: String,
}

impl ActiveGuard {
    fn acquire(map: Arc<StdMutex<HashMap<String, usize>>>, key: String) -> Self {
        {
            let mut guard = match map.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard.entry(key.clone()).or_default() += 1;
        }
        Self { map, key }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut guard = match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(count) = guard.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                guard.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn collect_hook() -> (ProgressHook, Arc<Mutex<Vec<ProgressFrame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let hook: ProgressHook = Arc::new(move |frame| {
            sink.lock().unwrap().push(frame);
        });
        (hook, frames)
    }

    #[test]
    fn parses_progress_frames() {
        assert_eq!(
            parse_progress_frame("[ 47%] 1234 files"),
            Some(ProgressFrame {
                percent: 47,
                files: 1234
            })
        );
        assert_eq!(
            parse_progress_frame("[100%] 9 files"),
            Some(ProgressFrame {
                percent: 100,
                files: 9
            })
        );
        assert_eq!(parse_progress_frame("[101%] 9 files"), None);
        assert_eq!(parse_progress_frame("Search complete"), None);
        assert_eq!(parse_progress_frame("[ 47%] nonsense"), None);
    }

    #[test]
    fn scanner_buffers_partial_lines() {
        let (hook, frames) = collect_hook();
        let mut scanner = ProgressScanner::new();

        scanner.feed(b"[ 10%] 1", Some(&hook));
        assert!(frames.lock().unwrap().is_empty());

        scanner.feed(b"0 files\n[ 20%] 20 files\n", Some(&hook));
        let seen = frames.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ProgressFrame {
                    percent: 10,
                    files: 10
                },
                ProgressFrame {
                    percent: 20,
                    files: 20
                },
            ]
        );
    }

    #[test]
    fn scanner_finalizes_trailing_line_on_close() {
        let (hook, frames) = collect_hook();
        let mut scanner = ProgressScanner::new();
        scanner.feed(b"[100%] 5 files", Some(&hook));
        assert!(frames.lock().unwrap().is_empty());
        scanner.finish(Some(&hook));
        assert_eq!(
            frames.lock().unwrap().clone(),
            vec![ProgressFrame {
                percent: 100,
                files: 5
            }]
        );
    }

    #[test]
    fn failure_prefers_error_line() {
        let output = CommandOutput {
            exit_code: 2,
            stdout: String::new(),
            stderr: "warning: slow disk\nError: config file missing\nmore context".to_string(),
        };
        assert_eq!(
            classify_failure("index update failed", &output),
            "index update failed: Error: config file missing"
        );
    }

    #[test]
    fn failure_falls_back_to_raw_stderr_then_exit_code() {
        let with_stderr = CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "disk full\n".to_string(),
        };
        assert_eq!(
            classify_failure("index build failed", &with_stderr),
            "index build failed: disk full"
        );

        let silent = CommandOutput {
            exit_code: 3,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(
            classify_failure("index init failed", &silent),
            "index init failed: engine exited with code 3"
        );
    }
}
