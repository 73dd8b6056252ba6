//! Activity log and the state-changed signal the operator surface consumes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use tether_core::model::epoch_secs;

/// Maximum retained activity entries.
const ACTIVITY_CAP: usize = 1000;

/// Change notification for display layers.
///
/// Bumped on every registry mutation and activity entry, except while an
/// interactive command session is active — redraws would interleave with
/// focused UI state.
#[derive(Clone)]
pub struct ChangeSignal {
    tx: watch::Sender<u64>,
    command_session: Arc<AtomicBool>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            tx,
            command_session: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the signal unless a command session is in progress.
    pub fn notify(&self) {
        if !self.command_session.load(Ordering::Relaxed) {
            self.tx.send_modify(|n| *n += 1);
        }
    }

    /// Mark the start/end of an interactive command session.
    pub fn set_command_session(&self, active: bool) {
        self.command_session.store(active, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded in-memory ring of recent events, read by the operator surface.
#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<(u64, String)>>>,
    signal: ChangeSignal,
}

impl ActivityLog {
    pub fn new(signal: ChangeSignal) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            signal,
        }
    }

    /// Record an event and raise the state-changed signal.
    pub fn push(&self, message: impl Into<String>) {
        let mut entries = self.entries.lock().expect("activity log poisoned");
        if entries.len() >= ACTIVITY_CAP {
            entries.pop_front();
        }
        entries.push_back((epoch_secs(), message.into()));
        drop(entries);
        self.signal.notify();
    }

    /// Most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<(u64, String)> {
        let entries = self.entries.lock().expect("activity log poisoned");
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("activity log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_recent_keep_order() {
        let log = ActivityLog::new(ChangeSignal::new());
        log.push("first");
        log.push("second");
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].1, "first");
        assert_eq!(recent[1].1, "second");
    }

    #[test]
    fn ring_is_bounded() {
        let log = ActivityLog::new(ChangeSignal::new());
        for i in 0..1100 {
            log.push(format!("event {i}"));
        }
        assert_eq!(log.len(), 1000);
        assert_eq!(log.recent(1)[0].1, "event 1099");
    }

    #[test]
    fn signal_fires_unless_suppressed() {
        let signal = ChangeSignal::new();
        let mut rx = signal.subscribe();
        signal.notify();
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        signal.set_command_session(true);
        signal.notify();
        assert!(!rx.has_changed().unwrap());

        signal.set_command_session(false);
        signal.notify();
        assert!(rx.has_changed().unwrap());
    }
}
