//! Notification stream observer for assertions.

use std::sync::{Arc, Mutex};

use ime_events::{DocNotification, NotificationKind, NotificationSink};

/// Records every notification kind flowing through it before forwarding to
/// the wrapped sink. Shared behind an `Arc` between the actor thread and the
/// asserting test body.
pub struct RecordingSink {
    inner: Arc<dyn NotificationSink>,
    seen: Mutex<Vec<NotificationKind>>,
}

impl RecordingSink {
    pub fn new(inner: Arc<dyn NotificationSink>) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Kinds observed so far, in delivery order.
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain the observed kinds, leaving the log empty.
    pub fn take(&self) -> Vec<NotificationKind> {
        std::mem::take(&mut *self.seen.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|k| **k == kind)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: DocNotification) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.kind);
        self.inner.deliver(notification);
    }
}
