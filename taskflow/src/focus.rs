//! Focus mode countdown.
//!
//! [`FocusTimer`] is the pure state machine; [`spawn_focus_timer`] drives it
//! from a background task on a fixed tick and publishes every change
//! through a watch channel.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Length of one focus session.
pub const DEFAULT_FOCUS_DURATION: Duration = Duration::from_secs(25 * 60);

/// Default interval between countdown steps.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// One-second-resolution countdown with start/pause/reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTimer {
    total_secs: u64,
    remaining_secs: u64,
    running: bool,
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_DURATION)
    }
}

impl FocusTimer {
    /// A stopped timer set to `duration`, rounded down to whole seconds
    /// (at least one).
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let total_secs = duration.as_secs().max(1);
        Self {
            total_secs,
            remaining_secs: total_secs,
            running: false,
        }
    }

    /// Starts counting down. Has no effect once finished.
    pub const fn start(&mut self) {
        self.running = self.remaining_secs > 0;
    }

    /// Stops counting down, keeping the remaining time.
    pub const fn pause(&mut self) {
        self.running = false;
    }

    /// Starts if paused, pauses if running.
    pub const fn toggle(&mut self) {
        if self.running {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Stops and restores the full duration.
    pub const fn reset(&mut self) {
        self.remaining_secs = self.total_secs;
        self.running = false;
    }

    /// Advances one second if running. Returns `true` on the tick that
    /// reaches zero.
    pub const fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.running = false;
            return true;
        }
        false
    }

    /// Time left.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        Duration::from_secs(self.remaining_secs)
    }

    /// Full session length.
    #[must_use]
    pub const fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }

    /// Whether the countdown is advancing.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the countdown has reached zero.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.remaining_secs == 0
    }

    /// Fraction of the session still remaining, from 1.0 down to 0.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        self.remaining_secs as f64 / self.total_secs as f64
    }

    /// Remaining time as `MM:SS`. Minutes are not wrapped at 60.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }
}

/// Control messages for a spawned timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCommand {
    /// Begin or resume counting down.
    Start,
    /// Stop counting, keep the remaining time.
    Pause,
    /// Start if paused, pause if running.
    Toggle,
    /// Stop and restore the full duration.
    Reset,
    /// Exit the timer task.
    Shutdown,
}

/// A command plus the channel that receives the state after it is applied.
#[derive(Debug)]
struct FocusRequest {
    command: FocusCommand,
    applied: oneshot::Sender<FocusTimer>,
}

/// Handle to a timer running in the background.
#[derive(Debug)]
pub struct FocusHandle {
    commands: mpsc::Sender<FocusRequest>,
    /// Latest timer state.
    pub state: watch::Receiver<FocusTimer>,
    /// The timer task.
    pub task: JoinHandle<()>,
}

impl FocusHandle {
    /// Sends a control command and waits for the timer task to apply it.
    ///
    /// Returns the state right after the command, or `None` if the timer
    /// task is gone or stopping.
    pub async fn send(&self, command: FocusCommand) -> Option<FocusTimer> {
        let (applied, reply) = oneshot::channel();
        self.commands
            .send(FocusRequest { command, applied })
            .await
            .ok()?;
        reply.await.ok()
    }

    /// Current timer state.
    #[must_use]
    pub fn current(&self) -> FocusTimer {
        *self.state.borrow()
    }

    /// Stops the timer task and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.send(FocusCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "focus timer task failed");
        }
    }
}

/// Spawns a task that drives `timer` every `tick`.
///
/// The task exits on [`FocusCommand::Shutdown`] or when every command
/// sender is dropped.
#[must_use]
pub fn spawn_focus_timer(timer: FocusTimer, tick: Duration) -> FocusHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(timer);
    let task = tokio::spawn(run_timer(timer, tick, cmd_rx, state_tx));
    FocusHandle {
        commands: cmd_tx,
        state: state_rx,
        task,
    }
}

async fn run_timer(
    mut timer: FocusTimer,
    tick: Duration,
    mut commands: mpsc::Receiver<FocusRequest>,
    state: watch::Sender<FocusTimer>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            request = commands.recv() => {
                let Some(FocusRequest { command: cmd, applied }) = request else { break };
                match cmd {
                    FocusCommand::Start | FocusCommand::Toggle if !timer.is_running() => {
                        timer.start();
                        // A full tick must elapse before the first step.
                        interval.reset();
                    }
                    FocusCommand::Start => {}
                    FocusCommand::Pause | FocusCommand::Toggle => timer.pause(),
                    FocusCommand::Reset => timer.reset(),
                    FocusCommand::Shutdown => break,
                }
                tracing::debug!(?cmd, remaining = %timer.display(), "focus command");
                state.send_replace(timer);
                // The caller may have stopped waiting.
                let _ = applied.send(timer);
            }
            _ = interval.tick(), if timer.is_running() => {
                if timer.tick() {
                    tracing::info!("focus session finished");
                }
                state.send_replace(timer);
            }
        }
    }
    tracing::debug!("focus timer stopped");
}
