//! Single-slot notification surface for mutation outcomes.
//!
//! The slot holds at most one message. Showing a new one replaces whatever
//! was visible, even if nobody saw it yet.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Error,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// Position in the slot's history; later notifications have larger values.
    pub sequence: u64,
}

impl Notification {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Most-recent-wins notification slot.
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct NotificationSlot {
    current: Arc<watch::Sender<Option<Notification>>>,
    sequence: Arc<AtomicU64>,
}

impl Default for NotificationSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSlot {
    pub fn new() -> Self {
        Self {
            current: Arc::new(watch::Sender::new(None)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the visible notification. Returns its sequence number.
    pub fn show(&self, message: impl Into<String>, severity: Severity) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let notification = Notification {
            message: message.into(),
            severity,
            created_at: Utc::now(),
            sequence,
        };
        tracing::debug!(
            severity = %severity,
            sequence,
            message = %notification.message,
            "Notification shown"
        );
        self.current.send_replace(Some(notification));
        sequence
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.show(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.show(message, Severity::Error)
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.show(message, Severity::Info)
    }

    pub fn hide(&self) {
        self.current.send_if_modified(|slot| slot.take().is_some());
    }

    /// Hide the notification only if it is still the one numbered `sequence`.
    pub fn hide_if_current(&self, sequence: u64) -> bool {
        self.current.send_if_modified(|slot| match slot {
            Some(notification) if notification.sequence == sequence => {
                *slot = None;
                true
            }
            _ => false,
        })
    }

    pub fn current(&self) -> Option<Notification> {
        self.current.borrow().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Number of notifications shown so far.
    pub fn shown_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Notification>> {
        self.current.subscribe()
    }

    /// Hide notification `sequence` after `after`, unless something newer
    /// replaced it in the meantime.
    pub fn auto_dismiss(&self, sequence: u64, after: Duration) -> JoinHandle<()> {
        let slot = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            slot.hide_if_current(sequence);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_wins() {
        let slot = NotificationSlot::new();
        slot.success("Task completed!");
        slot.error("Failed to complete task");

        let current = slot.current().unwrap();
        assert_eq!(current.message, "Failed to complete task");
        assert!(current.is_error());
        assert_eq!(slot.shown_count(), 2);
    }

    #[test]
    fn test_hide_clears_slot() {
        let slot = NotificationSlot::new();
        let mut rx = slot.subscribe();
        slot.info("hello");
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        slot.hide();
        assert!(!slot.is_visible());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        slot.hide();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss_skips_newer_notification() {
        let slot = NotificationSlot::new();
        let first = slot.success("first");
        let dismiss_first = slot.auto_dismiss(first, Duration::from_secs(4));

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = slot.success("second");
        dismiss_first.await.unwrap();
        assert_eq!(slot.current().unwrap().sequence, second);

        slot.auto_dismiss(second, Duration::from_secs(4)).await.unwrap();
        assert!(slot.current().is_none());
    }
}
