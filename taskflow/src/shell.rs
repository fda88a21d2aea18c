//! Line-oriented command parsing and rendering for the interactive shell.
//!
//! Kept separate from `main.rs` so the grammar can be unit tested without a
//! terminal.

use std::fmt::Write as _;

use taskflow_proto::snapshot::Snapshot;
use taskflow_proto::task::{ParsePriorityError, Priority, Task};

use crate::focus::{FocusCommand, FocusTimer};

/// Help text printed by `help`.
pub const HELP: &str = "\
commands:
  register <email> <password>    create an account and sign in
  login <email> <password>       sign in
  logout                         sign out
  add <priority> <title...>      add a task (priority: low|medium|high or 1-3)
  toggle <n>                     flip completion of task n
  rename <n> <title...>          change the title of task n
  delete <n>                     delete task n
  list                           show tasks
  focus start|pause|toggle|reset|status
  notifications on|off           allow or block new-task alerts
  help                           show this text
  quit                           exit";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Print the command summary.
    Help,
    /// Create an account and sign in.
    Register { email: String, password: String },
    /// Sign in to an existing account.
    Login { email: String, password: String },
    /// Sign out.
    Logout,
    /// Create a task.
    Add { priority: Priority, title: String },
    /// 1-based index into the displayed list.
    Toggle(usize),
    /// Retitle the task at a 1-based index.
    Rename { index: usize, title: String },
    /// Delete the task at a 1-based index.
    Delete(usize),
    /// Print the current view.
    List,
    /// Control the focus timer.
    Focus(FocusCommand),
    /// Print the focus timer without changing it.
    FocusStatus,
    /// Grant or revoke alert permission.
    Notifications(bool),
    /// Leave the shell.
    Quit,
}

/// Errors produced while parsing a shell line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Blank line.
    #[error("empty input")]
    Empty,

    /// First word is not a known command.
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    /// Known command with missing or extra arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Task number is not a positive integer.
    #[error("not a task number: {0}")]
    BadIndex(String),

    /// Priority word could not be parsed.
    #[error(transparent)]
    BadPriority(#[from] ParsePriorityError),
}

/// Parses one line of input.
///
/// # Errors
///
/// Returns a [`ParseError`] describing why the line is not a command.
pub fn parse_line(line: &str) -> Result<ShellCommand, ParseError> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));
    if word.is_empty() {
        return Err(ParseError::Empty);
    }

    match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        "logout" => Ok(ShellCommand::Logout),
        "list" | "ls" => Ok(ShellCommand::List),
        "register" => {
            let (email, password) = credentials(rest, "register <email> <password>")?;
            Ok(ShellCommand::Register { email, password })
        }
        "login" => {
            let (email, password) = credentials(rest, "login <email> <password>")?;
            Ok(ShellCommand::Login { email, password })
        }
        "add" => {
            let (priority, title) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage("add <priority> <title...>"))?;
            Ok(ShellCommand::Add {
                priority: priority.parse()?,
                title: title.trim().to_string(),
            })
        }
        "toggle" | "done" => Ok(ShellCommand::Toggle(index(rest, "toggle <n>")?)),
        "delete" | "rm" => Ok(ShellCommand::Delete(index(rest, "delete <n>")?)),
        "rename" => {
            let (n, title) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage("rename <n> <title...>"))?;
            Ok(ShellCommand::Rename {
                index: index(n, "rename <n> <title...>")?,
                title: title.trim().to_string(),
            })
        }
        "focus" => match rest {
            "start" => Ok(ShellCommand::Focus(FocusCommand::Start)),
            "pause" => Ok(ShellCommand::Focus(FocusCommand::Pause)),
            "toggle" => Ok(ShellCommand::Focus(FocusCommand::Toggle)),
            "reset" => Ok(ShellCommand::Focus(FocusCommand::Reset)),
            "" | "status" => Ok(ShellCommand::FocusStatus),
            _ => Err(ParseError::Usage("focus start|pause|toggle|reset|status")),
        },
        "notifications" => match rest {
            "on" => Ok(ShellCommand::Notifications(true)),
            "off" => Ok(ShellCommand::Notifications(false)),
            _ => Err(ParseError::Usage("notifications on|off")),
        },
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn credentials(rest: &str, usage: &'static str) -> Result<(String, String), ParseError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn index(arg: &str, usage: &'static str) -> Result<usize, ParseError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::BadIndex(arg.to_string())),
    }
}

/// Looks up a task by its 1-based display number.
#[must_use]
pub fn task_at(snapshot: &Snapshot, index: usize) -> Option<&Task> {
    index.checked_sub(1).and_then(|i| snapshot.get(i))
}

/// Renders the task list, one numbered line per task.
#[must_use]
pub fn render_tasks(snapshot: &Snapshot) -> String {
    if snapshot.is_empty() {
        return "  (no tasks)".to_string();
    }
    let mut out = String::new();
    for (i, task) in snapshot.iter().enumerate() {
        let mark = if task.completed { 'x' } else { ' ' };
        let _ = writeln!(
            out,
            "{:>3}. [{mark}] {:<6} {}",
            i + 1,
            task.priority.to_string(),
            task.title
        );
    }
    out.truncate(out.trim_end().len());
    out
}

/// One-line focus timer status.
#[must_use]
pub fn render_focus(timer: &FocusTimer) -> String {
    let state = if timer.is_finished() {
        "finished"
    } else if timer.is_running() {
        "running"
    } else {
        "paused"
    };
    format!(
        "focus {} ({state}, {:.0}% left)",
        timer.display(),
        timer.progress() * 100.0
    )
}
