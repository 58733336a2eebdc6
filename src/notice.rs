//! Transient user notices.
//!
//! Every successful mutation surfaces a short, auto-dismissing message
//! ("Task added!", "Route deleted."). Messages stay visible for a fixed
//! three seconds; the queue prunes expired entries whenever it is read.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a notice stays visible.
pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

/// A single transient message.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub posted_at: Instant,
}

impl Notice {
    /// Whether the notice is still within its display window at `now`.
    pub fn visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.posted_at) < NOTICE_DURATION
    }
}

/// Shared queue of transient notices, cloned into every synchronizer.
#[derive(Clone, Default)]
pub struct NoticeQueue {
    inner: Arc<Mutex<VecDeque<Notice>>>,
}

impl NoticeQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message.
    pub fn push(&self, message: impl Into<String>) {
        let mut queue = self.inner.lock().unwrap();
        queue.push_back(Notice {
            message: message.into(),
            posted_at: Instant::now(),
        });
    }

    /// Currently visible notices, oldest first. Expired entries are pruned.
    pub fn active(&self, now: Instant) -> Vec<Notice> {
        let mut queue = self.inner.lock().unwrap();
        while queue.front().map_or(false, |n| !n.visible_at(now)) {
            queue.pop_front();
        }
        queue.iter().filter(|n| n.visible_at(now)).cloned().collect()
    }

    /// Drop everything, visible or not.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    /// Number of queued entries, including not-yet-pruned expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_visible_within_window() {
        let queue = NoticeQueue::new();
        queue.push("Task added!");

        let now = Instant::now();
        let active = queue.active(now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "Task added!");
    }

    #[test]
    fn test_notice_expires_after_three_seconds() {
        let queue = NoticeQueue::new();
        queue.push("Task added!");

        let later = Instant::now() + NOTICE_DURATION + Duration::from_millis(1);
        assert!(queue.active(later).is_empty());
        // Pruned, not just hidden.
        assert!(queue.is_empty());
    }

    #[test]
    fn test_notices_keep_order() {
        let queue = NoticeQueue::new();
        queue.push("first");
        queue.push("second");

        let active = queue.active(Instant::now());
        assert_eq!(active[0].message, "first");
        assert_eq!(active[1].message, "second");
    }

    #[test]
    fn test_clear() {
        let queue = NoticeQueue::new();
        queue.push("first");
        queue.clear();
        assert!(queue.is_empty());
    }
}
