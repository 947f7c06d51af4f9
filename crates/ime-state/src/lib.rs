//! Canonical editable-target state mirror.
//!
//! One `EditableState` exists per focused target and is the single source of
//! truth visible to the connection adapter. It is mutated only by applying
//! notification snapshots (single-writer discipline); adapter reads are whole
//! clones taken at call time, so no partial write is ever observable.
//!
//! Indexing model: all offsets count Unicode scalar values (`char`s). Incoming
//! ranges may be negative, inverted, or past the end; they are clamped into
//! `[0, len]`, never rejected.

use std::sync::{Arc, Mutex};
use tracing::trace;

/// Half-open `[start, end)` range in char offsets, normalized so `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Construct a span, swapping endpoints when supplied out of order.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// State payload optionally carried on a document notification. Applying one
/// to the mirror refreshes text, selection, and composition wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextSnapshot {
    pub text: String,
    pub selection_start: usize,
    pub selection_end: usize,
    pub composition: Option<Span>,
}

impl TextSnapshot {
    pub fn new(text: impl Into<String>, selection_start: usize, selection_end: usize) -> Self {
        Self {
            text: text.into(),
            selection_start,
            selection_end,
            composition: None,
        }
    }

    pub fn with_composition(mut self, span: Span) -> Self {
        self.composition = Some(span);
        self
    }
}

/// Answer to an extracted-text request: full text plus selection offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub selection_start: usize,
    pub selection_end: usize,
}

/// Clamp a possibly negative / inverted / out-of-bounds selection request into
/// a valid `(start, end)` pair over a text of `len` chars.
pub fn clamp_selection(start: i64, end: i64, len: usize) -> (usize, usize) {
    let clamp_one = |v: i64| -> usize { v.clamp(0, len as i64) as usize };
    let (mut s, mut e) = (clamp_one(start), clamp_one(end));
    if s > e {
        std::mem::swap(&mut s, &mut e);
    }
    (s, e)
}

/// Versioned snapshot of the focused target's text, selection, and composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditableState {
    text: String,
    selection_start: usize,
    selection_end: usize,
    composition: Option<Span>,
    generation: u64,
    epoch: u64,
}

impl EditableState {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text length in chars.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn selection(&self) -> (usize, usize) {
        (self.selection_start, self.selection_end)
    }

    pub fn composition(&self) -> Option<Span> {
        self.composition
    }

    /// Monotonic mutation counter; bumps on every accepted snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Target-identity token; a fresh focus cycle starts a fresh epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply a notification snapshot, clamping selection and composition into
    /// the new text bounds. Always accepted; invalid ranges clamp silently.
    pub fn apply_snapshot(&mut self, snapshot: &TextSnapshot) {
        let len = snapshot.text.chars().count();
        let (sel_start, sel_end) = clamp_selection(
            snapshot.selection_start as i64,
            snapshot.selection_end as i64,
            len,
        );
        self.text = snapshot.text.clone();
        self.selection_start = sel_start;
        self.selection_end = sel_end;
        self.composition = snapshot.composition.map(|span| {
            let (s, e) = clamp_selection(span.start as i64, span.end as i64, len);
            Span::new(s, e)
        });
        self.generation += 1;
        trace!(
            target: "state.mirror",
            generation = self.generation,
            text_chars = len,
            sel_start,
            sel_end,
            composing = self.composition.is_some(),
            "snapshot_applied"
        );
    }

    /// Discard all state and start a fresh epoch (focus change / reload).
    pub fn reset_for_epoch(&mut self, epoch: u64) {
        *self = Self::new(epoch);
        trace!(target: "state.mirror", epoch, "reset");
    }

    /// Up to `n` chars immediately before the selection start.
    pub fn text_before_cursor(&self, n: usize) -> String {
        let take_from = self.selection_start.saturating_sub(n);
        self.char_slice(take_from, self.selection_start)
    }

    /// Up to `n` chars immediately after the selection end.
    pub fn text_after_cursor(&self, n: usize) -> String {
        let len = self.char_len();
        let end = (self.selection_end + n).min(len);
        self.char_slice(self.selection_end, end)
    }

    pub fn extracted(&self) -> ExtractedText {
        ExtractedText {
            text: self.text.clone(),
            selection_start: self.selection_start,
            selection_end: self.selection_end,
        }
    }

    fn char_slice(&self, start: usize, end: usize) -> String {
        self.text.chars().skip(start).take(end.saturating_sub(start)).collect()
    }
}

/// Shared handle to the mirror. Cloning is cheap; all clones observe the same
/// state. Reads are whole-state clones, writes happen only via
/// [`StateMirror::apply`] / [`StateMirror::reset`].
#[derive(Clone)]
pub struct StateMirror {
    inner: Arc<Mutex<EditableState>>,
}

impl StateMirror {
    pub fn new(epoch: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EditableState::new(epoch))),
        }
    }

    /// Snapshot of the mirror at call time.
    pub fn snapshot(&self) -> EditableState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply a notification snapshot, returning the new generation.
    pub fn apply(&self, snapshot: &TextSnapshot) -> u64 {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.apply_snapshot(snapshot);
        state.generation()
    }

    pub fn reset(&self, epoch: u64) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset_for_epoch(epoch);
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(text: &str, sel: (usize, usize)) -> EditableState {
        let mut state = EditableState::new(0);
        state.apply_snapshot(&TextSnapshot::new(text, sel.0, sel.1));
        state
    }

    #[test]
    fn clamp_negative_and_past_end() {
        assert_eq!(clamp_selection(-3, 6, 3), (0, 3));
        assert_eq!(clamp_selection(4, 4, 3), (3, 3));
        assert_eq!(clamp_selection(2, 0, 3), (0, 2), "inverted ranges swap");
    }

    #[test]
    fn apply_snapshot_bumps_generation_and_clamps() {
        let mut state = EditableState::new(7);
        assert_eq!(state.generation(), 0);
        state.apply_snapshot(&TextSnapshot::new("foo", 9, 9));
        assert_eq!(state.generation(), 1);
        assert_eq!(state.selection(), (3, 3));
        assert_eq!(state.epoch(), 7);

        state.apply_snapshot(
            &TextSnapshot::new("foo", 1, 1).with_composition(Span { start: 0, end: 99 }),
        );
        assert_eq!(state.generation(), 2);
        assert_eq!(state.composition(), Some(Span::new(0, 3)));
    }

    #[test]
    fn text_around_cursor_counts_chars_not_bytes() {
        let state = state_with("f\u{3000}obar", (3, 3));
        assert_eq!(state.text_before_cursor(3), "f\u{3000}o");
        assert_eq!(state.text_before_cursor(10), "f\u{3000}o");
        assert_eq!(state.text_after_cursor(2), "ba");
        assert_eq!(state.text_after_cursor(10), "bar");
    }

    #[test]
    fn extracted_round_trip() {
        let state = state_with("foo", (3, 3));
        let extracted = state.extracted();
        assert_eq!(extracted.text, "foo");
        assert_eq!((extracted.selection_start, extracted.selection_end), (3, 3));
    }

    #[test]
    fn reset_starts_clean_epoch() {
        let mirror = StateMirror::new(0);
        mirror.apply(&TextSnapshot::new("abc", 1, 2));
        mirror.reset(5);
        let state = mirror.snapshot();
        assert_eq!(state.text(), "");
        assert_eq!(state.generation(), 0);
        assert_eq!(state.epoch(), 5);
    }
}
