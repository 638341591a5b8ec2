//! Per-scan progress channel (spec §4.7/§4.8 `subscribe`). A subscriber that
//! (re)connects within the replay window of a scan's terminal event sees the
//! full history; nothing is lost and nothing arrives out of order, since
//! `step` only ever increases.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::model::{ScanId, ScanState};

/// How long a terminal scan's event buffer is kept for late subscribers.
const REPLAY_WINDOW: Duration = Duration::from_secs(30);

/// One step in a scan's lifecycle, as seen by a subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub scan_id: ScanId,
    /// Monotonically increasing within a scan, starting at 1.
    pub step: u64,
    pub state: ScanState,
    pub message: String,
}

struct Inner {
    events: Vec<ProgressEvent>,
    terminal_at: Option<Instant>,
}

/// Buffered event history plus a wakeup for subscribers awaiting new events.
pub struct ScanProgress {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for ScanProgress {
    fn default() -> Self {
        ScanProgress {
            inner: Mutex::new(Inner { events: Vec::new(), terminal_at: None }),
            notify: Notify::new(),
        }
    }
}

impl ScanProgress {
    /// Appends a new event and wakes any subscriber waiting on [`notified`](Self::notified).
    pub fn push(&self, state: ScanState, message: impl Into<String>, scan_id: ScanId) {
        let mut inner = self.inner.lock();
        let step = inner.events.len() as u64 + 1;
        inner.events.push(ProgressEvent { scan_id, step, state, message: message.into() });
        if state.is_terminal() {
            inner.terminal_at = Some(Instant::now());
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Every event with `step > after`, in order.
    pub fn events_since(&self, after: u64) -> Vec<ProgressEvent> {
        self.inner.lock().events.iter().filter(|e| e.step > after).cloned().collect()
    }

    /// Whether the scan has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.inner.lock().terminal_at.is_some()
    }

    /// Whether this channel's replay window has elapsed since its terminal event.
    fn expired(&self) -> bool {
        self.inner.lock().terminal_at.map(|t| t.elapsed() > REPLAY_WINDOW).unwrap_or(false)
    }

    /// Resolves once new events may be available.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Registry of in-flight and recently-finished scan progress channels.
#[derive(Default)]
pub struct ProgressHub {
    scans: Mutex<HashMap<ScanId, Arc<ScanProgress>>>,
}

impl ProgressHub {
    /// Opens a fresh channel for `scan_id`, replacing any prior one.
    pub fn create(&self, scan_id: ScanId) -> Arc<ScanProgress> {
        let progress = Arc::new(ScanProgress::default());
        self.scans.lock().insert(scan_id, progress.clone());
        progress
    }

    /// Looks up a scan's channel, if one exists and hasn't expired.
    pub fn get(&self, scan_id: ScanId) -> Option<Arc<ScanProgress>> {
        self.scans.lock().get(&scan_id).cloned()
    }

    /// Drops channels whose replay window has elapsed. Called opportunistically
    /// from `subscribe` rather than on a timer.
    pub fn sweep_expired(&self) {
        self.scans.lock().retain(|_, p| !p.expired());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_monotonic_and_filterable() {
        let progress = ScanProgress::default();
        progress.push(ScanState::Queued, "queued", 1);
        progress.push(ScanState::Fetching, "fetching", 1);
        progress.push(ScanState::Completed, "done", 1);
        let all = progress.events_since(0);
        assert_eq!(all.iter().map(|e| e.step).collect::<Vec<_>>(), vec![1, 2, 3]);
        let tail = progress.events_since(1);
        assert_eq!(tail.len(), 2);
        assert!(progress.is_terminal());
    }

    #[test]
    fn hub_forgets_unknown_scans() {
        let hub = ProgressHub::default();
        assert!(hub.get(42).is_none());
        hub.create(42);
        assert!(hub.get(42).is_some());
    }
}
