//! Scripted document actor: consumes document commands, edits a target store,
//! and emits notifications carrying full state snapshots.
//!
//! The actor is the authoritative side of the bridge. Every accepted command
//! that can resolve a host-side wait produces exactly one notification, even
//! when the edit collapsed to nothing (for instance an arrow key at a text
//! boundary still answers with a selection-change carrying the unchanged
//! snapshot). Commands stamped with a retired epoch are dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, trace};

use ime_events::{
    DocCommand, DocNotification, DocOp, KeyAction, KeyCode, KeyEvent, NotificationKind,
    NotificationSink,
};
use ime_state::{Span, TextSnapshot, clamp_selection};

use crate::store::{EditableTarget, TargetKind, next_grapheme_boundary, prev_grapheme_boundary, target_for};

/// One editable document with a selection, an optional composition, and a
/// modifier state, driven entirely by [`DocCommand`]s.
pub struct Document {
    target: Box<dyn EditableTarget>,
    /// Selection endpoints; `anchor` stays put while shift-extended arrow
    /// motion moves `focus`.
    anchor: usize,
    focus: usize,
    composition: Option<Span>,
    epoch: u64,
    shift: bool,
}

impl Document {
    pub fn new(kind: TargetKind, initial: &str) -> Self {
        let target = target_for(kind, initial);
        let len = target.char_len();
        Self {
            target,
            anchor: len,
            focus: len,
            composition: None,
            epoch: 0,
            shift: false,
        }
    }

    /// Place the selection directly, without emitting anything. Test setup
    /// hook; the command path is [`DocOp::SetSelection`].
    pub fn place_selection(&mut self, start: usize, end: usize) {
        let len = self.target.char_len();
        let (s, e) = clamp_selection(start as i64, end as i64, len);
        self.anchor = s;
        self.focus = e;
    }

    /// Current state as a notification payload.
    pub fn snapshot(&self) -> TextSnapshot {
        let (start, end) = self.selection();
        TextSnapshot {
            text: self.target.text(),
            selection_start: start,
            selection_end: end,
            composition: self.composition,
        }
    }

    fn selection(&self) -> (usize, usize) {
        (self.anchor.min(self.focus), self.anchor.max(self.focus))
    }

    fn selection_span(&self) -> Span {
        let (start, end) = self.selection();
        Span::new(start, end)
    }

    /// Process one command, delivering any resulting notification to `sink`.
    pub fn handle(&mut self, command: DocCommand, sink: &dyn NotificationSink) {
        if command.epoch < self.epoch {
            trace!(target: "harness.doc", cmd_epoch = command.epoch, epoch = self.epoch, "stale_command_dropped");
            return;
        }
        self.epoch = command.epoch;
        match command.op {
            DocOp::StartComposition { region } => self.start_composition(region),
            DocOp::UpdateCompositionText { text, caret } => {
                self.update_composition(&text, caret, sink)
            }
            DocOp::EndComposition => self.end_composition(sink),
            DocOp::CommitText { text, caret } => self.commit_text(&text, caret, sink),
            DocOp::DeleteSurrounding { before, after } => {
                self.delete_surrounding(before, after, sink)
            }
            DocOp::SetSelection { start, end } => self.set_selection(start, end, sink),
            DocOp::DispatchKey(key) => self.dispatch_key(key, sink),
        }
    }

    /// Drain commands until the channel closes.
    pub fn run(mut self, rx: &Receiver<DocCommand>, sink: &dyn NotificationSink) {
        debug!(target: "harness.doc", kind = ?self.target.kind(), "actor_started");
        while let Ok(command) = rx.recv() {
            self.handle(command, sink);
        }
        debug!(target: "harness.doc", "actor_stopped");
    }

    /// Run the actor on its own thread.
    pub fn spawn(
        self,
        rx: Receiver<DocCommand>,
        sink: Arc<dyn NotificationSink>,
    ) -> JoinHandle<()> {
        thread::spawn(move || self.run(&rx, sink.as_ref()))
    }

    fn emit(&self, kind: NotificationKind, sink: &dyn NotificationSink) {
        sink.deliver(DocNotification::new(kind, self.epoch, self.snapshot()));
    }

    fn start_composition(&mut self, region: Option<Span>) {
        let len = self.target.char_len();
        let span = match region {
            Some(region) => {
                let (start, end) = clamp_selection(region.start as i64, region.end as i64, len);
                Span::new(start, end)
            }
            None => self.selection_span(),
        };
        trace!(target: "harness.doc", start = span.start, end = span.end, "composition_started");
        self.composition = Some(span);
    }

    fn update_composition(&mut self, text: &str, caret: i32, sink: &dyn NotificationSink) {
        let span = self.composition.unwrap_or_else(|| self.selection_span());
        let inserted = self.target.replace(span, text);
        let new_span = Span::new(span.start, span.start + inserted);
        self.composition = Some(new_span);
        let caret = caret_from_hint(caret, new_span, self.target.char_len());
        self.anchor = caret;
        self.focus = caret;
        self.emit(NotificationKind::CompositionUpdate, sink);
    }

    fn end_composition(&mut self, sink: &dyn NotificationSink) {
        // The composed text simply becomes committed text; no edit happens.
        if self.composition.take().is_some() {
            self.emit(NotificationKind::CompositionEnd, sink);
        }
    }

    fn commit_text(&mut self, text: &str, caret: i32, sink: &dyn NotificationSink) {
        let had_composition = self.composition.is_some();
        let span = self.composition.take().unwrap_or_else(|| self.selection_span());
        let removed = span.len();
        let inserted = self.target.replace(span, text);
        let insert_span = Span::new(span.start, span.start + inserted);
        let caret = caret_from_hint(caret, insert_span, self.target.char_len());
        self.anchor = caret;
        self.focus = caret;
        // Emission mirrors the host's wait policy: a commit that could have
        // been waited on always answers with a composition-end.
        if had_composition || !text.is_empty() {
            self.emit(NotificationKind::CompositionEnd, sink);
        } else if removed > 0 {
            self.emit(NotificationKind::Input, sink);
        }
    }

    fn delete_surrounding(&mut self, before: usize, after: usize, sink: &dyn NotificationSink) {
        if before == 0 && after == 0 {
            return;
        }
        let (sel_start, sel_end) = self.selection();
        let len = self.target.char_len();
        let del_after = after.min(len - sel_end);
        let del_before = before.min(sel_start);
        // After side first so the before-side offsets stay valid.
        self.target.replace(Span::new(sel_end, sel_end + del_after), "");
        self.target.replace(Span::new(sel_start - del_before, sel_start), "");
        self.anchor = sel_start - del_before;
        self.focus = sel_end - del_before;
        self.composition = self.composition.map(|span| {
            let shift = |offset: usize| offset.saturating_sub(del_before).min(self.target.char_len());
            Span::new(shift(span.start), shift(span.end))
        });
        self.emit(NotificationKind::Input, sink);
    }

    /// Selection requests are always answered, even when nothing moves; a
    /// request issued inside a host batch is counted toward the closing
    /// drain, and a silent absorption would leave that drain short.
    fn set_selection(&mut self, start: usize, end: usize, sink: &dyn NotificationSink) {
        let len = self.target.char_len();
        let (start, end) = clamp_selection(start as i64, end as i64, len);
        self.anchor = start;
        self.focus = end;
        self.emit(NotificationKind::SelectionChange, sink);
    }

    fn dispatch_key(&mut self, key: KeyEvent, sink: &dyn NotificationSink) {
        if key.code == KeyCode::Shift {
            self.shift = key.action == KeyAction::Down;
            return;
        }
        if key.code.is_modifier() || key.action == KeyAction::Up {
            return;
        }
        let text_before = self.target.text();
        match key.code {
            KeyCode::Char(c) => self.insert_text(&c.to_string()),
            KeyCode::Enter => self.insert_text("\n"),
            KeyCode::Backspace => self.delete_adjacent(true),
            KeyCode::Delete => self.delete_adjacent(false),
            KeyCode::ArrowLeft => self.move_caret(true),
            KeyCode::ArrowRight => self.move_caret(false),
            KeyCode::ArrowUp | KeyCode::Home => self.move_caret_to(0),
            KeyCode::ArrowDown | KeyCode::End => self.move_caret_to(self.target.char_len()),
            // Modifiers returned above.
            KeyCode::Shift | KeyCode::Ctrl | KeyCode::Alt => return,
        }
        self.clamp_composition();
        // A processed key always answers, so key waits resolve even when the
        // edit collapsed (e.g. arrow-left at offset zero).
        if self.target.text() != text_before {
            self.emit(NotificationKind::Input, sink);
        } else {
            self.emit(NotificationKind::SelectionChange, sink);
        }
    }

    fn insert_text(&mut self, text: &str) {
        let span = self.selection_span();
        let inserted = self.target.replace(span, text);
        let caret = span.start + inserted;
        self.anchor = caret;
        self.focus = caret;
    }

    /// Backspace and forward delete. Backspace deletes backward regardless of
    /// held modifiers.
    fn delete_adjacent(&mut self, backward: bool) {
        let span = self.selection_span();
        let span = if !span.is_empty() {
            span
        } else if backward {
            Span::new(prev_grapheme_boundary(&self.target.text(), span.start), span.start)
        } else {
            Span::new(span.end, next_grapheme_boundary(&self.target.text(), span.end))
        };
        self.target.replace(span, "");
        self.anchor = span.start;
        self.focus = span.start;
    }

    fn move_caret(&mut self, backward: bool) {
        let (start, end) = self.selection();
        if self.shift {
            let text = self.target.text();
            self.focus = if backward {
                prev_grapheme_boundary(&text, self.focus)
            } else {
                next_grapheme_boundary(&text, self.focus)
            };
            return;
        }
        if start != end {
            // Plain arrow over a range collapses to the matching edge.
            let caret = if backward { start } else { end };
            self.anchor = caret;
            self.focus = caret;
            return;
        }
        let text = self.target.text();
        let caret = if backward {
            prev_grapheme_boundary(&text, start)
        } else {
            next_grapheme_boundary(&text, start)
        };
        self.anchor = caret;
        self.focus = caret;
    }

    fn move_caret_to(&mut self, offset: usize) {
        self.focus = offset;
        if !self.shift {
            self.anchor = offset;
        }
    }

    fn clamp_composition(&mut self) {
        let len = self.target.char_len();
        self.composition = self
            .composition
            .map(|span| Span::new(span.start.min(len), span.end.min(len)));
    }
}

/// Resolve an IME caret hint against the span the text landed in. Positive
/// hints count from the end of the insert (1 = directly after it),
/// non-positive hints from its start. The result clamps into `[0, len]`.
fn caret_from_hint(hint: i32, insert: Span, len: usize) -> usize {
    let pos = if hint > 0 {
        insert.end as i64 + i64::from(hint) - 1
    } else {
        insert.start as i64 + i64::from(hint)
    };
    pos.clamp(0, len as i64) as usize
}
