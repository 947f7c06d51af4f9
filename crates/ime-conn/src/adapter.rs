//! The synchronous-facing connection adapter implementing the host IME
//! contract.
//!
//! Every mutating verb clamps its arguments against the current mirror
//! snapshot, emits one or more document commands, and (outside an open batch)
//! blocks on the synchronizer until the mirror reflects the command or a
//! bounded timeout elapses. Read-only queries answer from the mirror and
//! never block.
//!
//! Wait policy per verb (which commands are waitable, and on what):
//!
//! | verb                    | waits on                     | skipped when                         |
//! |-------------------------|------------------------------|--------------------------------------|
//! | commit_text             | composition-end or input     | empty text, no active composition    |
//! | set_composing_text      | composition-update           | identical to last composing text     |
//! | finish_composing_text   | composition-end              | no active composition                |
//! | delete_surrounding_text | input                        | before == 0 and after == 0           |
//! | set_selection           | selection-change             | clamped range equals current mirror  |
//! | send_key_event          | input or selection-change    | key cannot mutate text or selection  |
//! | set_composing_region    | (never waits)                | n/a                                  |
//!
//! The skip conditions exist because in each case the document will not emit
//! the event the wait would hang on. The `set_selection` skip only applies
//! outside a batch, where the mirror tracks the document; mid-batch the
//! mirror is frozen and the request is forwarded unclamped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ime_events::{CommandSink, DocCommand, DocOp, KeyCode, KeyEvent, NotifMask};
use ime_state::{EditableState, ExtractedText, Span, clamp_selection};
use ime_sync::EventSynchronizer;
use tracing::trace;

use crate::composition::CompositionTracker;
use crate::keys::KeyEventForwarder;

pub struct InputConnectionAdapter {
    sync: Arc<EventSynchronizer>,
    sink: CommandSink,
    tracker: Arc<Mutex<CompositionTracker>>,
    activity: Arc<AtomicBool>,
    timeout: Duration,
    forwarder: KeyEventForwarder,
}

impl InputConnectionAdapter {
    pub(crate) fn new(
        sync: Arc<EventSynchronizer>,
        sink: CommandSink,
        tracker: Arc<Mutex<CompositionTracker>>,
        activity: Arc<AtomicBool>,
        timeout: Duration,
    ) -> Self {
        let forwarder = KeyEventForwarder::new(
            Arc::clone(&sync),
            sink.clone(),
            Arc::clone(&activity),
            timeout,
        );
        Self {
            sync,
            sink,
            tracker,
            activity,
            timeout,
            forwarder,
        }
    }

    /// Commit `text` at the selection (replacing any active composition),
    /// placing the caret per the caret hint. An empty commit with no prior
    /// composition is still issued but must not wait: no event will fire.
    pub fn commit_text(&self, text: &str, caret: i32) {
        let had_composition = {
            let mut tracker = self.tracker();
            let had = tracker.is_active();
            tracker.clear();
            had
        };
        let wait = (!text.is_empty() || had_composition)
            .then_some(NotifMask::COMPOSITION_END | NotifMask::INPUT);
        self.issue(
            DocOp::CommitText {
                text: text.to_owned(),
                caret,
            },
            wait,
        );
    }

    /// Replace the composing text. Opens a composition if none is active
    /// (adopting any pending composing region); re-submitting the identical
    /// text is silent. The empty string collapses the composing range but
    /// keeps the composition active.
    pub fn set_composing_text(&self, text: &str, caret: i32) {
        let start_region = {
            let mut tracker = self.tracker();
            let re_anchor = tracker.has_pending_region();
            if tracker.is_active() && !re_anchor && tracker.matches_last(text) {
                trace!(target: "conn.adapter", "composing_text_unchanged");
                return;
            }
            let start = (!tracker.is_active() || re_anchor).then(|| {
                let region = tracker.take_region();
                tracker.begin();
                region
            });
            tracker.submitted(text);
            start
        };
        if let Some(region) = start_region {
            // Opening is not itself waitable; the update that follows is.
            self.issue(DocOp::StartComposition { region }, None);
        }
        self.issue(
            DocOp::UpdateCompositionText {
                text: text.to_owned(),
                caret,
            },
            Some(NotifMask::COMPOSITION_UPDATE),
        );
    }

    /// Reposition the composition anchor. No text mutation, no wait; the next
    /// `set_composing_text` reconciles against it, and the document clamps
    /// the region into its own bounds when the composition opens (the mirror
    /// may be frozen mid-batch, so its length is not authoritative here).
    pub fn set_composing_region(&self, start: i64, end: i64) {
        let (s, e) = normalize_request(start, end);
        trace!(target: "conn.adapter", start = s, end = e, "composing_region");
        self.tracker().note_region(Span::new(s, e));
    }

    /// Convert the composing range into committed plain text.
    pub fn finish_composing_text(&self) {
        let was_active = {
            let mut tracker = self.tracker();
            let active = tracker.is_active();
            tracker.clear();
            active
        };
        let wait = was_active.then_some(NotifMask::COMPOSITION_END);
        self.issue(DocOp::EndComposition, wait);
    }

    /// Delete `before` chars before and `after` chars after the selection.
    /// A zero/zero delete is a structural no-op: issued, never waited on.
    pub fn delete_surrounding_text(&self, before: i32, after: i32) {
        let before = before.max(0) as usize;
        let after = after.max(0) as usize;
        let wait = (before > 0 || after > 0).then_some(NotifMask::INPUT);
        self.issue(DocOp::DeleteSurrounding { before, after }, wait);
    }

    /// Move the selection, clamping invalid ranges instead of failing.
    /// Outside a batch a request matching the mirror's current selection is
    /// dropped entirely: nothing would change and nothing would answer.
    /// Inside a batch the mirror is frozen mid-bracket, so the request passes
    /// through for the document to clamp against the batched text; the
    /// document answers every selection request, keeping the closing drain
    /// bounded.
    pub fn set_selection(&self, start: i64, end: i64) {
        if self.sync.in_batch() {
            let (s, e) = normalize_request(start, end);
            self.issue(
                DocOp::SetSelection { start: s, end: e },
                Some(NotifMask::SELECTION_CHANGE),
            );
            return;
        }
        let snapshot = self.snapshot();
        let (s, e) = clamp_selection(start, end, snapshot.char_len());
        if (s, e) == snapshot.selection() {
            trace!(target: "conn.adapter", start = s, end = e, "selection_unchanged");
            return;
        }
        self.issue(
            DocOp::SetSelection { start: s, end: e },
            Some(NotifMask::SELECTION_CHANGE),
        );
    }

    /// Up to `n` chars before the cursor, from the last confirmed mirror
    /// state. Never issues a command, never blocks.
    pub fn text_before_cursor(&self, n: usize) -> String {
        self.snapshot().text_before_cursor(n)
    }

    /// Up to `n` chars after the cursor; mirror read, non-blocking.
    pub fn text_after_cursor(&self, n: usize) -> String {
        self.snapshot().text_after_cursor(n)
    }

    /// Full text plus selection offsets; mirror read, non-blocking.
    pub fn extracted_text(&self) -> ExtractedText {
        self.snapshot().extracted()
    }

    pub fn begin_batch_edit(&self) {
        self.sync.begin_batch();
    }

    pub fn end_batch_edit(&self) {
        self.sync.end_batch(self.timeout);
    }

    /// Forward one raw key event (down or up half).
    pub fn send_key_event(&self, key: KeyEvent) {
        self.forwarder.send_key_event(key);
    }

    /// Forward a down/up pair for `code`, waiting once for its effect.
    pub fn press_key(&self, code: KeyCode) {
        self.forwarder.press_key(code);
    }

    fn snapshot(&self) -> EditableState {
        self.sync.mirror().snapshot()
    }

    fn tracker(&self) -> MutexGuard<'_, CompositionTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Dispatch one command; when `wait` names a notification mask and no
    /// batch is open, block (bounded) until the mirror caught up. Inside a
    /// batch the wait is deferred to the closing flush.
    fn issue(&self, op: DocOp, wait: Option<NotifMask>) {
        self.activity.store(true, Ordering::Relaxed);
        let epoch = self.sync.epoch();

        if self.sync.in_batch() {
            if wait.is_some() {
                self.sync.note_batched_wait();
            }
            self.sink.dispatch(DocCommand { epoch, op });
            return;
        }

        match wait {
            Some(mask) => {
                let waiter = self.sync.expect(mask);
                if self.sink.dispatch(DocCommand { epoch, op }) {
                    let _ = waiter.block(self.timeout);
                } else {
                    waiter.abandon();
                }
            }
            None => {
                self.sink.dispatch(DocCommand { epoch, op });
            }
        }
    }
}

/// Drop sign and order from a raw range request. Bounds clamping is the
/// document's job; the caller may not know the current text length.
fn normalize_request(start: i64, end: i64) -> (usize, usize) {
    let (s, e) = (start.max(0) as usize, end.max(0) as usize);
    if s <= e { (s, e) } else { (e, s) }
}
