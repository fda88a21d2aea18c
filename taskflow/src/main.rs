//! `Taskflow` interactive task list shell.
//!
//! Drives a [`SessionController`] over the in-process backend from a
//! line-oriented prompt. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/taskflow/config.toml`).
//!
//! ```bash
//! cargo run --bin taskflow
//!
//! # Ten-minute focus sessions, no alerts, debug logs
//! cargo run --bin taskflow -- --focus-minutes 10 --no-notifications \
//!     --log-level debug
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use taskflow::backend::memory::{MemoryDocumentStore, MemoryIdentity};
use taskflow::config::{AppConfig, CliArgs};
use taskflow::focus::{FocusHandle, FocusTimer, spawn_focus_timer};
use taskflow::notify::{Notifier, PermissionGated};
use taskflow::session::{SessionController, SessionView};
use taskflow::shell::{self, ParseError, ShellCommand};
use taskflow_proto::task::Task;

type Alerts = Arc<PermissionGated<ConsoleNotifier>>;
type Controller = SessionController<MemoryIdentity, MemoryDocumentStore, Alerts>;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            AppConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the prompt.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(collection = %config.collection, "taskflow starting");

    let alerts: Alerts = Arc::new(PermissionGated::new(ConsoleNotifier, config.notifications));
    let controller = SessionController::start(
        Arc::new(MemoryIdentity::new()),
        Arc::new(MemoryDocumentStore::new()),
        Arc::clone(&alerts),
        config.to_session_config(),
    )
    .await;
    let focus = spawn_focus_timer(FocusTimer::new(config.focus_duration), config.focus_tick);

    let view_printer = tokio::spawn(print_view_changes(controller.subscribe()));
    let focus_watcher = tokio::spawn(announce_focus_end(focus.state.clone(), Arc::clone(&alerts)));

    println!("{}", shell::HELP);
    let result = run_shell(&controller, &focus, &alerts).await;

    controller.shutdown();
    view_printer.abort();
    focus_watcher.abort();
    focus.shutdown().await;

    tracing::info!("taskflow exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskflow.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Prints alerts inline with the prompt output.
#[derive(Debug, Clone, Copy)]
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "notification");
        println!("** {title}: {body}");
    }
}

/// Read commands from stdin until `quit` or end of input.
async fn run_shell(controller: &Controller, focus: &FocusHandle, alerts: &Alerts) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match shell::parse_line(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(command) => execute(controller, focus, alerts, command).await,
            Err(ParseError::Empty) => {}
            Err(e) => println!("{e}"),
        }
    }
    Ok(())
}

async fn execute(controller: &Controller, focus: &FocusHandle, alerts: &Alerts, command: ShellCommand) {
    match command {
        ShellCommand::Help => println!("{}", shell::HELP),
        ShellCommand::Register { email, password } => {
            if controller.register(&email, &password).await.is_ok() {
                println!("registered and signed in as {email}");
            }
        }
        ShellCommand::Login { email, password } => {
            if controller.login(&email, &password).await.is_ok() {
                println!("signed in as {email}");
            }
        }
        ShellCommand::Logout => {
            controller.logout().await;
            println!("signed out");
        }
        ShellCommand::Add { priority, title } => {
            if let Err(e) = controller.add(&title, priority).await {
                println!("add failed: {e}");
            }
        }
        ShellCommand::Toggle(n) => {
            let Some(task) = displayed(controller, n) else { return };
            if let Err(e) = controller.toggle(&task).await {
                println!("toggle failed: {e}");
            }
        }
        ShellCommand::Rename { index, title } => {
            let Some(task) = displayed(controller, index) else { return };
            if let Err(e) = controller.rename(&task, &title).await {
                println!("rename failed: {e}");
            }
        }
        ShellCommand::Delete(n) => {
            let Some(task) = displayed(controller, n) else { return };
            if let Err(e) = controller.delete(&task).await {
                println!("delete failed: {e}");
            }
        }
        ShellCommand::List => print_view(&controller.view()),
        ShellCommand::Focus(cmd) => match focus.send(cmd).await {
            Some(timer) => println!("{}", shell::render_focus(&timer)),
            None => println!("focus timer is not running"),
        },
        ShellCommand::FocusStatus => println!("{}", shell::render_focus(&focus.current())),
        ShellCommand::Notifications(on) => {
            alerts.set_granted(on);
            println!("notifications {}", if on { "on" } else { "off" });
        }
        ShellCommand::Quit => {}
    }
}

/// The task at display number `n`, printing a message if there is none.
fn displayed(controller: &Controller, n: usize) -> Option<Task> {
    let snapshot = controller.snapshot();
    let task = shell::task_at(&snapshot, n).cloned();
    if task.is_none() {
        println!("no task {n}");
    }
    task
}

fn print_view(view: &SessionView) {
    match view.login.owner() {
        Some(owner) => println!("signed in ({owner})"),
        None => println!("signed out"),
    }
    if view.sync_lost {
        println!("  (sync lost, list may be stale)");
    }
    println!("{}", shell::render_tasks(&view.tasks));
}

/// Print the task list and auth errors as they change.
async fn print_view_changes(mut rx: watch::Receiver<SessionView>) {
    let mut last = rx.borrow_and_update().clone();
    while rx.changed().await.is_ok() {
        let view = rx.borrow_and_update().clone();
        if !view.login_error.is_empty() && view.login_error != last.login_error {
            println!("{}", view.login_error);
        }
        if view.tasks != last.tasks || view.sync_lost != last.sync_lost {
            if view.sync_lost {
                println!("  (sync lost, list may be stale)");
            }
            println!("{}", shell::render_tasks(&view.tasks));
        }
        last = view;
    }
}

/// Raise an alert each time a focus session runs out.
async fn announce_focus_end(mut rx: watch::Receiver<FocusTimer>, alerts: Alerts) {
    let mut was_finished = rx.borrow_and_update().is_finished();
    while rx.changed().await.is_ok() {
        let finished = rx.borrow_and_update().is_finished();
        if finished && !was_finished {
            alerts.notify("Focus", "Session finished. Take a break.");
        }
        was_finished = finished;
    }
}
