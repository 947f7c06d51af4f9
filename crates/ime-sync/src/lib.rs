//! Event synchronizer: the registry of pending waiters that lets synchronous
//! IME calls block until the asynchronously updated document has caught up.
//!
//! One registry exists per bridge. Waiters are resolved FIFO per notification
//! kind, in notification arrival order; a notification never skips a
//! still-pending earlier waiter of a kind it matches. Every wait is bounded by
//! a deadline, and retiring the epoch (focus loss / reload) force-resolves
//! outstanding waiters instead of leaving them dangling.

mod batch;

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use batch::{BatchState, CloseAction};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use ime_events::{
    BATCH_FLUSHES, BATCH_UNBALANCED_ENDS, DocNotification, NOTIFICATIONS_APPLIED,
    NOTIFICATIONS_STALE_DROPPED, NotifMask, NotificationSink, WAIT_TIMEOUTS, WAITS_CANCELLED,
    WAITS_REGISTERED,
};
use ime_state::StateMirror;
use tracing::{debug, trace, warn};

/// How a bounded wait ended. Timeouts and cancellations are not errors: the
/// adapter answers from best-effort mirror state either way, because the IME
/// contract has no failure channel for a call that must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A matching notification arrived and was applied.
    Resolved,
    /// The deadline elapsed with no matching notification.
    TimedOut,
    /// The target epoch was retired while waiting.
    Cancelled,
}

#[derive(Debug)]
struct PendingWaiter {
    id: u64,
    mask: NotifMask,
    slot: Sender<WaitOutcome>,
}

#[derive(Debug, Default)]
struct SyncInner {
    epoch: u64,
    next_waiter_id: u64,
    waiters: VecDeque<PendingWaiter>,
    batch: BatchState,
}

/// Waiter registry plus batch-edit coordinator, sharing one lock so that
/// notification application is never interleaved with a half-complete batch
/// close.
pub struct EventSynchronizer {
    mirror: StateMirror,
    inner: Mutex<SyncInner>,
    batch_cv: Condvar,
}

impl EventSynchronizer {
    pub fn new(mirror: StateMirror) -> Self {
        Self {
            mirror,
            inner: Mutex::new(SyncInner::default()),
            batch_cv: Condvar::new(),
        }
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    /// Current target-identity token. Commands are stamped with this.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Register a waiter for the first notification matching `mask`. Must be
    /// called before the triggering command is dispatched, otherwise the
    /// notification can race past the registration.
    pub fn expect(&self, mask: NotifMask) -> WaitHandle<'_> {
        let (tx, rx) = bounded(1);
        let mut inner = self.lock();
        let id = inner.next_waiter_id;
        inner.next_waiter_id += 1;
        inner.waiters.push_back(PendingWaiter { id, mask, slot: tx });
        WAITS_REGISTERED.fetch_add(1, Ordering::Relaxed);
        trace!(target: "sync.wait", id, ?mask, "registered");
        WaitHandle { sync: self, id, rx }
    }

    /// Process one notification in arrival order: drop it if stale, queue it
    /// while a batch is open, otherwise refresh the mirror from any carried
    /// snapshot and resolve the first matching waiter.
    pub fn notify(&self, notification: DocNotification) {
        let mut inner = self.lock();
        if notification.epoch != inner.epoch {
            NOTIFICATIONS_STALE_DROPPED.fetch_add(1, Ordering::Relaxed);
            trace!(
                target: "sync.notify",
                kind = ?notification.kind,
                stale = notification.epoch,
                current = inner.epoch,
                "stale_dropped"
            );
            return;
        }
        if inner.batch.is_open() {
            trace!(target: "sync.batch", kind = ?notification.kind, "buffered");
            inner.batch.buffer(notification);
            self.batch_cv.notify_all();
            return;
        }
        self.apply_and_resolve(&mut inner, notification);
    }

    fn apply_and_resolve(&self, inner: &mut SyncInner, notification: DocNotification) {
        if let Some(snapshot) = &notification.snapshot {
            self.mirror.apply(snapshot);
            NOTIFICATIONS_APPLIED.fetch_add(1, Ordering::Relaxed);
        }
        let kind_mask = notification.kind.mask();
        if let Some(pos) = inner.waiters.iter().position(|w| w.mask.intersects(kind_mask))
            && let Some(waiter) = inner.waiters.remove(pos)
        {
            trace!(target: "sync.notify", kind = ?notification.kind, waiter = waiter.id, "resolved");
            let _ = waiter.slot.send(WaitOutcome::Resolved);
        } else {
            trace!(target: "sync.notify", kind = ?notification.kind, "no_waiter");
        }
    }

    /// Open a batch transaction (nestable).
    pub fn begin_batch(&self) {
        let mut inner = self.lock();
        inner.batch.open();
        trace!(target: "sync.batch", "open");
    }

    pub fn in_batch(&self) -> bool {
        self.lock().batch.is_open()
    }

    /// Record that a waitable command was issued inside the open batch; the
    /// closing flush drains one queued notification per recorded command.
    pub fn note_batched_wait(&self) {
        self.lock().batch.note_expected();
    }

    /// Close the batch. The zero-crossing close waits (bounded by `drain`)
    /// for the notifications implied by commands issued inside the bracket,
    /// applies them in arrival order, and resolves blocked waiters against the
    /// single coalesced result. Unbalanced closes are no-ops.
    pub fn end_batch(&self, drain: Duration) {
        let mut inner = self.lock();
        match inner.batch.close() {
            CloseAction::Unbalanced => {
                BATCH_UNBALANCED_ENDS.fetch_add(1, Ordering::Relaxed);
                warn!(target: "sync.batch", "unbalanced_end");
                return;
            }
            CloseAction::StillOpen => {
                trace!(target: "sync.batch", "nested_close");
                return;
            }
            CloseAction::Flush => {}
        }

        let opened_epoch = inner.epoch;
        let deadline = Instant::now() + drain;
        while inner.batch.queued() < inner.batch.expected() {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    target: "sync.batch",
                    queued = inner.batch.queued(),
                    expected = inner.batch.expected(),
                    "drain_timeout"
                );
                break;
            }
            let (guard, _timeout) = self
                .batch_cv
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if inner.epoch != opened_epoch || !inner.batch.is_open() {
                // Retired mid-close; the batch was cancelled under us.
                return;
            }
        }

        let queued = inner.batch.take_flush();
        BATCH_FLUSHES.fetch_add(1, Ordering::Relaxed);
        let mut kinds = NotifMask::empty();
        for notification in &queued {
            if let Some(snapshot) = &notification.snapshot {
                self.mirror.apply(snapshot);
                NOTIFICATIONS_APPLIED.fetch_add(1, Ordering::Relaxed);
            }
            kinds |= notification.kind.mask();
        }
        // One coalesced dispatch: every waiter matching any queued kind
        // resolves against the final net state, FIFO.
        let mut remaining = VecDeque::with_capacity(inner.waiters.len());
        for waiter in inner.waiters.drain(..) {
            if waiter.mask.intersects(kinds) {
                let _ = waiter.slot.send(WaitOutcome::Resolved);
            } else {
                remaining.push_back(waiter);
            }
        }
        inner.waiters = remaining;
        debug!(target: "sync.batch", queued = queued.len(), ?kinds, "flush");
    }

    /// RAII batch bracket: closes (with the given drain budget) even on early
    /// return or panic.
    pub fn batch_scope(&self, drain: Duration) -> BatchGuard<'_> {
        self.begin_batch();
        BatchGuard { sync: self, drain }
    }

    /// Invalidate the current target: bump the epoch, reset the mirror, drop
    /// any open batch, and force-resolve outstanding waiters as cancelled.
    pub fn retire_epoch(&self) -> u64 {
        let mut inner = self.lock();
        inner.epoch += 1;
        let epoch = inner.epoch;
        let cancelled = inner.waiters.len();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.slot.send(WaitOutcome::Cancelled);
        }
        WAITS_CANCELLED.fetch_add(cancelled as u64, Ordering::Relaxed);
        inner.batch.cancel();
        self.batch_cv.notify_all();
        self.mirror.reset(epoch);
        debug!(target: "sync.wait", epoch, cancelled, "epoch_retired");
        epoch
    }

    fn remove_waiter(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.waiters.len();
        inner.waiters.retain(|w| w.id != id);
        inner.waiters.len() != before
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NotificationSink for EventSynchronizer {
    fn deliver(&self, notification: DocNotification) {
        self.notify(notification);
    }
}

/// A registered wait, resolved exactly once by the first matching
/// notification, by cancellation, or by its deadline.
#[must_use = "a registered waiter must be blocked on or abandoned"]
pub struct WaitHandle<'a> {
    sync: &'a EventSynchronizer,
    id: u64,
    rx: Receiver<WaitOutcome>,
}

impl WaitHandle<'_> {
    /// Block the calling thread until resolution or `timeout`.
    pub fn block(self, timeout: Duration) -> WaitOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                if self.sync.remove_waiter(self.id) {
                    WAIT_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "sync.wait", id = self.id, ?timeout, "timeout");
                    WaitOutcome::TimedOut
                } else {
                    // Resolution raced the deadline; the outcome is already in
                    // the slot.
                    self.rx.try_recv().unwrap_or(WaitOutcome::Cancelled)
                }
            }
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Cancelled,
        }
    }

    /// Deregister without blocking (used when the triggering command could not
    /// be dispatched, so no notification will ever come).
    pub fn abandon(self) {
        self.sync.remove_waiter(self.id);
    }
}

pub struct BatchGuard<'a> {
    sync: &'a EventSynchronizer,
    drain: Duration,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.sync.end_batch(self.drain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ime_events::NotificationKind;
    use ime_state::TextSnapshot;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(25);

    fn synchronizer() -> EventSynchronizer {
        EventSynchronizer::new(StateMirror::new(0))
    }

    fn input_note(sync: &EventSynchronizer, text: &str, caret: usize) -> DocNotification {
        DocNotification::new(
            NotificationKind::Input,
            sync.epoch(),
            TextSnapshot::new(text, caret, caret),
        )
    }

    #[test]
    fn resolves_first_registered_waiter_fifo() {
        let sync = synchronizer();
        let first = sync.expect(NotifMask::INPUT);
        let second = sync.expect(NotifMask::INPUT);

        sync.notify(input_note(&sync, "a", 1));

        assert_eq!(first.block(SHORT), WaitOutcome::Resolved);
        assert_eq!(second.block(SHORT), WaitOutcome::TimedOut);
        assert_eq!(sync.mirror().snapshot().text(), "a");
    }

    #[test]
    fn mask_accepts_either_kind() {
        let sync = synchronizer();
        let waiter = sync.expect(NotifMask::COMPOSITION_END | NotifMask::INPUT);
        sync.notify(input_note(&sync, "x", 1));
        assert_eq!(waiter.block(SHORT), WaitOutcome::Resolved);
    }

    #[test]
    fn unmatched_kind_leaves_waiter_pending() {
        let sync = synchronizer();
        let waiter = sync.expect(NotifMask::SELECTION_CHANGE);
        sync.notify(input_note(&sync, "x", 1));
        // Snapshot still refreshed the mirror even though no waiter matched.
        assert_eq!(sync.mirror().snapshot().text(), "x");
        assert_eq!(waiter.block(SHORT), WaitOutcome::TimedOut);
    }

    #[test]
    fn stale_epoch_notifications_are_dropped() {
        let sync = synchronizer();
        let waiter = sync.expect(NotifMask::INPUT);
        sync.notify(DocNotification::new(
            NotificationKind::Input,
            99,
            TextSnapshot::new("ghost", 0, 0),
        ));
        assert_eq!(waiter.block(SHORT), WaitOutcome::TimedOut);
        assert_eq!(sync.mirror().snapshot().text(), "");
    }

    #[test]
    fn retire_epoch_cancels_outstanding_waiters() {
        let sync = synchronizer();
        std::thread::scope(|scope| {
            let waiter = sync.expect(NotifMask::INPUT);
            let blocked = scope.spawn(move || waiter.block(Duration::from_secs(2)));
            // Give the blocked thread a moment to park.
            std::thread::sleep(Duration::from_millis(5));
            let epoch = sync.retire_epoch();
            assert_eq!(epoch, 1);
            assert_eq!(blocked.join().expect("join"), WaitOutcome::Cancelled);
        });
        // Post-retirement notifications for the old epoch are stale.
        sync.notify(DocNotification::new(
            NotificationKind::Input,
            0,
            TextSnapshot::new("old", 0, 0),
        ));
        assert_eq!(sync.mirror().snapshot().text(), "");
    }

    #[test]
    fn abandon_removes_registration() {
        let sync = synchronizer();
        sync.expect(NotifMask::INPUT).abandon();
        let waiter = sync.expect(NotifMask::INPUT);
        sync.notify(input_note(&sync, "a", 1));
        assert_eq!(waiter.block(SHORT), WaitOutcome::Resolved);
    }

    #[test]
    fn batch_buffers_and_flushes_once() {
        let sync = synchronizer();
        let waiter = sync.expect(NotifMask::INPUT);

        sync.begin_batch();
        sync.note_batched_wait();
        sync.note_batched_wait();
        sync.notify(input_note(&sync, "foo", 3));
        sync.notify(DocNotification::new(
            NotificationKind::SelectionChange,
            sync.epoch(),
            TextSnapshot::new("foo", 1, 1),
        ));
        // Nothing applied or resolved while open.
        assert_eq!(sync.mirror().snapshot().text(), "");

        sync.end_batch(SHORT);
        assert_eq!(waiter.block(SHORT), WaitOutcome::Resolved);
        let state = sync.mirror().snapshot();
        assert_eq!(state.text(), "foo");
        assert_eq!(state.selection(), (1, 1));
        // Both queued snapshots applied, in order (net state is the last one).
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn end_batch_drains_late_notifications() {
        let sync = synchronizer();
        sync.begin_batch();
        sync.note_batched_wait();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(10));
                sync.notify(input_note(&sync, "late", 4));
            });
            sync.end_batch(Duration::from_millis(500));
        });
        assert_eq!(sync.mirror().snapshot().text(), "late");
    }

    #[test]
    fn nested_batches_flush_only_at_zero_crossing() {
        let sync = synchronizer();
        sync.begin_batch();
        sync.begin_batch();
        sync.notify(input_note(&sync, "inner", 5));
        sync.end_batch(SHORT);
        assert!(sync.in_batch());
        assert_eq!(sync.mirror().snapshot().text(), "");
        sync.end_batch(SHORT);
        assert!(!sync.in_batch());
        assert_eq!(sync.mirror().snapshot().text(), "inner");
    }

    #[test]
    fn unbalanced_end_is_a_noop() {
        let sync = synchronizer();
        sync.end_batch(SHORT);
        assert!(!sync.in_batch());
        // Still fully operational afterwards.
        let waiter = sync.expect(NotifMask::INPUT);
        sync.notify(input_note(&sync, "ok", 2));
        assert_eq!(waiter.block(SHORT), WaitOutcome::Resolved);
    }

    #[test]
    fn batch_guard_closes_on_drop() {
        let sync = synchronizer();
        {
            let _guard = sync.batch_scope(SHORT);
            sync.notify(input_note(&sync, "guarded", 7));
            assert!(sync.in_batch());
        }
        assert!(!sync.in_batch());
        assert_eq!(sync.mirror().snapshot().text(), "guarded");
    }
}
