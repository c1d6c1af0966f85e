use super::status::StatusSnapshot;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Where a stage sits in its pipeline. `total` is unknown for lazy providers
/// until they have produced their list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total: Option<usize>,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "[{}/{}]", self.index, total),
            None => write!(f, "[{}]", self.index),
        }
    }
}

pub trait Renderer: Send + Sync {
    fn pending(&self, position: Position, message: &str);
    fn running(&self, position: Position, message: &str, status: watch::Receiver<StatusSnapshot>);
    fn succeeded(&self, position: Position, message: &str);
    fn failed(&self, position: Position, message: &str, detail: &str, ignored: bool);
}

/// Prints stage transitions to stderr and samples the running stage's status.
#[derive(Debug, Clone)]
pub struct TerminalRenderer {
    sample_interval: Duration,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self {
            sample_interval: SAMPLE_INTERVAL,
        }
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TerminalRenderer {
    fn pending(&self, position: Position, message: &str) {
        eprintln!("{}", pending_line(position, message));
    }

    fn running(
        &self,
        position: Position,
        message: &str,
        mut status: watch::Receiver<StatusSnapshot>,
    ) {
        eprintln!("{}", running_line(position, message));
        let interval = self.sample_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last: Option<StatusSnapshot> = None;
            loop {
                ticker.tick().await;
                // Sender dropped: the stage has returned.
                if status.has_changed().is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if last.as_ref() != Some(&current) {
                    eprintln!("  {} {}", position, format_status(&current));
                    last = Some(current);
                }
            }
        });
    }

    fn succeeded(&self, position: Position, message: &str) {
        eprintln!("{}", succeeded_line(position, message));
    }

    fn failed(&self, position: Position, message: &str, detail: &str, ignored: bool) {
        eprintln!("{}", failed_line(position, message, detail, ignored));
    }
}

pub fn pending_line(position: Position, message: &str) -> String {
    format!("WAIT {} {}", position, message)
}

pub fn running_line(position: Position, message: &str) -> String {
    format!("RUN {} {}", position, message)
}

pub fn succeeded_line(position: Position, message: &str) -> String {
    format!("OK {} {}", position, message)
}

/// Ignored failures are tagged `FAIL`; the one that stops the pipeline is `ERROR`.
pub fn failed_line(position: Position, message: &str, detail: &str, ignored: bool) -> String {
    let tag = if ignored { "FAIL" } else { "ERROR" };
    format!("{} {} {}: {}", tag, position, message, detail)
}

pub fn format_status(status: &StatusSnapshot) -> String {
    let mut line = status.text.clone();
    if let Some(progress) = status.progress {
        line.push_str(&format!(" ({:.0}%)", progress * 100.0));
    }
    if let Some(remaining) = status.remaining {
        line.push_str(&format!(" ~{} left", format_remaining(remaining)));
    }
    line
}

pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Pending(usize, String),
    Running(usize, String),
    Succeeded(usize, String),
    Failed {
        index: usize,
        message: String,
        detail: String,
        ignored: bool,
    },
}

/// Keeps every transition in memory instead of drawing it.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: RenderEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl Renderer for RecordingRenderer {
    fn pending(&self, position: Position, message: &str) {
        self.push(RenderEvent::Pending(position.index, message.to_string()));
    }

    fn running(&self, position: Position, message: &str, _status: watch::Receiver<StatusSnapshot>) {
        self.push(RenderEvent::Running(position.index, message.to_string()));
    }

    fn succeeded(&self, position: Position, message: &str) {
        self.push(RenderEvent::Succeeded(position.index, message.to_string()));
    }

    fn failed(&self, position: Position, message: &str, detail: &str, ignored: bool) {
        self.push(RenderEvent::Failed {
            index: position.index,
            message: message.to_string(),
            detail: detail.to_string(),
            ignored,
        });
    }
}
