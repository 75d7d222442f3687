// src/clipboard.rs - Clipboard bridge module
use std::{process::Stdio, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use shell_words::split;
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::{Config, DeskError, DeskState, Result};

/// How long a clipboard command may run before the read is abandoned
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can report the current clipboard text.
#[async_trait]
pub trait ClipboardSource: Send + 'static {
    /// Returns the clipboard text, or `None` when it holds no text.
    ///
    /// The bridge drops this future when it is told to stop, so a read must
    /// be safe to abandon part way.
    async fn read_text(&mut self) -> Result<Option<String>>;
}

/// Reads the clipboard by running an external command such as `pbpaste`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClipboard {
    /// Parses a shell-style command line.
    pub fn new(command: &str) -> Result<Self> {
        let mut args = split(command).map_err(|e| DeskError::ClipboardUnavailable {
            message: format!("Failed to parse clipboard command: {}", e),
        })?;
        if args.is_empty() {
            return Err(DeskError::ClipboardUnavailable {
                message: "Empty clipboard command".to_string(),
            });
        }
        let program = args.remove(0);
        Ok(Self {
            program,
            args,
            timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses the configured command or a platform default.
    pub fn from_config(config: &Config) -> Result<Self> {
        let command = config
            .get_clipboard_command()
            .ok_or_else(|| DeskError::ClipboardUnavailable {
                message: "no clipboard command configured or detected".to_string(),
            })?;
        info!("Using clipboard command: {}", command);
        Self::new(&command)
    }
}

#[async_trait]
impl ClipboardSource for CommandClipboard {
    async fn read_text(&mut self) -> Result<Option<String>> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = time::timeout(self.timeout, child)
            .await
            .map_err(|_| DeskError::ClipboardUnavailable {
                message: format!(
                    "{} did not finish within {} ms",
                    self.program,
                    self.timeout.as_millis()
                ),
            })?
            .map_err(|e| DeskError::ClipboardUnavailable {
                message: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            // Most paste tools exit non-zero when the clipboard holds no text
            trace!("{} exited with {}", self.program, output.status);
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

/// New clipboard text observed by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEvent {
    pub text: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum BridgeCommand {
    /// Stop polling and end the task
    Stop,
}

/// Polls a [`ClipboardSource`] and emits an event whenever its text
/// changes.
pub struct ClipboardBridge {
    /// How often the source is read
    poll_interval: Duration,

    /// Whether the text present at start-up is reported
    capture_initial: bool,

    /// Channel to send commands to the polling task
    command_tx: Option<mpsc::Sender<BridgeCommand>>,

    /// Handle to the polling task
    poll_task: Option<JoinHandle<()>>,
}

impl ClipboardBridge {
    pub fn new(poll_interval: Duration, capture_initial: bool) -> Self {
        Self {
            poll_interval,
            capture_initial,
            command_tx: None,
            poll_task: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.clipboard_poll_ms.max(50)),
            config.capture_initial_clipboard,
        )
    }

    pub fn is_running(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Starts polling `source` in the background.
    ///
    /// # Returns
    ///
    /// The receiving end of the event stream. Dropping it stops the bridge
    /// at its next change.
    pub fn start<S: ClipboardSource>(
        &mut self,
        mut source: S,
    ) -> Result<mpsc::Receiver<ClipboardEvent>> {
        if self.poll_task.is_some() {
            return Err(DeskError::ApplicationError {
                message: "Clipboard bridge is already running".to_string(),
            });
        }
        info!(
            "Starting clipboard bridge (every {} ms)",
            self.poll_interval.as_millis()
        );

        let (command_tx, mut command_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = mpsc::channel(32);
        let poll_interval = self.poll_interval;
        let capture_initial = self.capture_initial;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_seen: Option<String> = None;
            let mut first_read = true;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = command_rx.recv() => break,
                }

                // A hung read must not hold up a stop request
                let read = tokio::select! {
                    read = source.read_text() => read,
                    _ = command_rx.recv() => break,
                };
                let text = match read {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Clipboard read failed: {}", e);
                        continue;
                    }
                };
                let baseline = first_read && !capture_initial;
                first_read = false;

                let Some(text) = text else { continue };
                if last_seen.as_deref() == Some(text.as_str()) {
                    continue;
                }
                last_seen = Some(text.clone());
                if baseline {
                    debug!("Clipboard baseline recorded");
                    continue;
                }

                let event = ClipboardEvent { text, observed_at: Utc::now() };
                if event_tx.send(event).await.is_err() {
                    debug!("Clipboard event receiver dropped");
                    break;
                }
            }
            info!("Clipboard bridge stopping...");
        });

        self.command_tx = Some(command_tx);
        self.poll_task = Some(task);
        Ok(event_rx)
    }

    /// Stops the polling task and waits for it to finish.
    pub async fn dispose(&mut self) -> Result<()> {
        let Some(task) = self.poll_task.take() else {
            debug!("Clipboard bridge is not running");
            return Ok(());
        };

        if let Some(command_tx) = self.command_tx.take() {
            // The task may already have ended on its own
            let _ = command_tx.send(BridgeCommand::Stop).await;
        }

        task.await.map_err(|e| {
            let error_mgs = format!("Failed to stop clipboard bridge: {}", e);
            error!("{}", error_mgs);
            DeskError::ApplicationError { message: error_mgs }
        })?;
        info!("Clipboard bridge stopped");
        Ok(())
    }
}

impl Drop for ClipboardBridge {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

/// Feeds clipboard events into the note store until the stream ends.
///
/// Each event takes the desk lock, so clipboard captures and interactive
/// edits serialize into distinct history steps.
pub fn forward_to_store(
    mut events: mpsc::Receiver<ClipboardEvent>,
    desk: Arc<Mutex<DeskState>>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut captured = 0;
        while let Some(event) = events.recv().await {
            let mut desk = desk.lock().await;
            if desk.notes.ingest_external(&event.text).is_some() {
                captured += 1;
            }
        }
        debug!("Clipboard forwarder finished after {} captures", captured);
        captured
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of reads, then keeps returning the last one.
    struct ScriptedClipboard {
        reads: VecDeque<Option<String>>,
        last: Option<String>,
    }

    impl ScriptedClipboard {
        fn new(reads: &[Option<&str>]) -> Self {
            Self {
                reads: reads.iter().map(|r| r.map(str::to_string)).collect(),
                last: None,
            }
        }
    }

    #[async_trait]
    impl ClipboardSource for ScriptedClipboard {
        async fn read_text(&mut self) -> Result<Option<String>> {
            if let Some(next) = self.reads.pop_front() {
                self.last = next;
            }
            Ok(self.last.clone())
        }
    }

    #[tokio::test]
    async fn emits_only_changes_after_the_baseline() {
        let source = ScriptedClipboard::new(&[
            Some("already there"),
            Some("already there"),
            Some("first"),
            None,
            Some("first"),
            Some("second"),
        ]);
        let mut bridge = ClipboardBridge::new(Duration::from_millis(5), false);
        let mut events = bridge.start(source).unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(second.text, "second");

        bridge.dispose().await.unwrap();
        assert!(!bridge.is_running());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn initial_text_is_reported_when_configured() {
        let source = ScriptedClipboard::new(&[Some("startup")]);
        let mut bridge = ClipboardBridge::new(Duration::from_millis(5), true);
        let mut events = bridge.start(source).unwrap();
        assert_eq!(events.recv().await.unwrap().text, "startup");
        bridge.dispose().await.unwrap();
    }

    /// A clipboard tool that never answers.
    struct StuckClipboard;

    #[async_trait]
    impl ClipboardSource for StuckClipboard {
        async fn read_text(&mut self) -> Result<Option<String>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn dispose_interrupts_a_stuck_read() {
        let mut bridge = ClipboardBridge::new(Duration::from_millis(5), false);
        let _events = bridge.start(StuckClipboard).unwrap();
        time::sleep(Duration::from_millis(30)).await;

        time::timeout(Duration::from_secs(1), bridge.dispose())
            .await
            .expect("dispose hung behind the clipboard read")
            .unwrap();
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn dispose_without_start_is_a_noop() {
        let mut bridge = ClipboardBridge::new(Duration::from_millis(5), false);
        bridge.dispose().await.unwrap();
        bridge.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let mut bridge = ClipboardBridge::new(Duration::from_millis(5), false);
        let _events = bridge.start(ScriptedClipboard::new(&[])).unwrap();
        assert!(bridge.start(ScriptedClipboard::new(&[])).is_err());
        bridge.dispose().await.unwrap();
    }

    #[test]
    fn command_lines_are_split_like_a_shell() {
        let clip = CommandClipboard::new("xclip -selection 'clipboard' -o").unwrap();
        assert_eq!(clip.program, "xclip");
        assert_eq!(clip.args, vec!["-selection", "clipboard", "-o"]);
        assert!(CommandClipboard::new("   ").is_err());
        assert!(CommandClipboard::new("unterminated 'quote").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_becomes_clipboard_text() {
        let mut clip = CommandClipboard::new("echo hello").unwrap();
        assert_eq!(clip.read_text().await.unwrap().as_deref(), Some("hello\n"));

        let mut failing = CommandClipboard::new("false").unwrap();
        assert_eq!(failing.read_text().await.unwrap(), None);

        let mut missing = CommandClipboard::new("definitely-not-a-real-binary-xyz").unwrap();
        assert!(missing.read_text().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let mut clip = CommandClipboard::new("sleep 5")
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        assert!(clip.read_text().await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn a_running_command_does_not_stall_other_tasks() {
        let mut clip = CommandClipboard::new("sleep 1")
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        let read = tokio::spawn(async move { clip.read_text().await });

        let started = std::time::Instant::now();
        time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        read.abort();
    }
}
