//! Batch edit coalescing: Idle -> Open -> Idle with nesting depth.
//!
//! While a batch is open, document notifications are queued instead of being
//! applied or dispatched to waiters. Only the close that brings the depth back
//! to zero flushes; the flush applies the queued snapshots in arrival order
//! and resolves blocked waiters against the single coalesced result.

use ime_events::DocNotification;

#[derive(Debug, Default)]
pub(crate) struct BatchState {
    depth: u32,
    queue: Vec<DocNotification>,
    /// Number of waitable commands issued while the batch has been open; the
    /// closing flush drains this many notifications (bounded by a deadline)
    /// so the coalesced snapshot reflects every command in the bracket.
    expected: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CloseAction {
    /// `end_batch` with no matching open batch: logged no-op, never a flush.
    Unbalanced,
    /// Inner close of a nested batch.
    StillOpen,
    /// Depth crossed zero; flush the queued notifications.
    Flush,
}

impl BatchState {
    pub(crate) fn open(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn buffer(&mut self, notification: DocNotification) {
        self.queue.push(notification);
    }

    pub(crate) fn note_expected(&mut self) {
        if self.depth > 0 {
            self.expected += 1;
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn expected(&self) -> usize {
        self.expected
    }

    /// Decrement depth. On the zero-crossing close the depth is left at 1 and
    /// `Flush` is returned; the caller drains outstanding notifications and
    /// then calls [`BatchState::take_flush`], which resets to Idle.
    pub(crate) fn close(&mut self) -> CloseAction {
        match self.depth {
            0 => CloseAction::Unbalanced,
            1 => CloseAction::Flush,
            _ => {
                self.depth -= 1;
                CloseAction::StillOpen
            }
        }
    }

    /// Take the queued notifications and reset to Idle.
    pub(crate) fn take_flush(&mut self) -> Vec<DocNotification> {
        self.depth = 0;
        self.expected = 0;
        std::mem::take(&mut self.queue)
    }

    /// Drop all batch state (focus retired mid-batch).
    pub(crate) fn cancel(&mut self) {
        self.depth = 0;
        self.expected = 0;
        self.queue.clear();
    }
}
