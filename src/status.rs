//! Transient connectivity status for the header bar.
//!
//! Background Wi-Fi tasks never touch UI state directly. They push
//! [`StatusEvent`]s into a [`StatusSink`]; the production sink is a queue the
//! UI loop drains on its own schedule.

use std::fmt;
use tokio::sync::mpsc;

/// Colour class of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Work in progress (yellow).
    Connecting,
    /// Completed successfully (green).
    Success,
    /// Failed (red).
    Error,
}

/// One status update for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Show `text` with the given level.
    Show { text: String, level: StatusLevel },
    /// Hide the status indicator.
    Clear,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Show { text, level } => write!(f, "{:?}: {}", level, text),
            Self::Clear => write!(f, "cleared"),
        }
    }
}

/// Receiver of transient status pushes.
pub trait StatusSink: Send + Sync {
    /// Show a status message.
    fn show_status(&self, text: &str, level: StatusLevel);

    /// Hide the status message.
    fn clear_status(&self);
}

/// Status sink backed by an unbounded queue.
///
/// The UI loop owns the receiver and applies events between frames.
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelStatusSink {
    /// Create a sink and the receiver the UI loop drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, event: StatusEvent) {
        // Receiver gone means the UI is shutting down.
        let _ = self.tx.send(event);
    }
}

impl StatusSink for ChannelStatusSink {
    fn show_status(&self, text: &str, level: StatusLevel) {
        self.push(StatusEvent::Show {
            text: text.to_string(),
            level,
        });
    }

    fn clear_status(&self) {
        self.push(StatusEvent::Clear);
    }
}

/// Sink that drops everything. For headless use without a header bar.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn show_status(&self, _text: &str, _level: StatusLevel) {}

    fn clear_status(&self) {}
}
