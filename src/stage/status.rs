use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Latest status a running stage has published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub text: String,
    pub progress: Option<f32>,
    pub remaining: Option<Duration>,
}

/// Write side of a stage's status cell. Writes overwrite in place and never
/// wait for the reader; the renderer samples whatever is current.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new(text: impl Into<String>) -> (Self, watch::Receiver<StatusSnapshot>) {
        let (tx, rx) = watch::channel(StatusSnapshot {
            text: text.into(),
            ..StatusSnapshot::default()
        });
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.tx.send_modify(|status| status.text = text);
    }

    /// `fraction` is clamped to `[0, 1]`; NaN clears the value.
    pub fn set_progress(&self, fraction: f32) {
        let progress = if fraction.is_nan() {
            None
        } else {
            Some(fraction.clamp(0.0, 1.0))
        };
        self.tx.send_modify(|status| status.progress = progress);
    }

    pub fn set_remaining_duration(&self, remaining: Duration) {
        self.tx.send_modify(|status| status.remaining = Some(remaining));
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }
}
