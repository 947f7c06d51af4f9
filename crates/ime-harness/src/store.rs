//! Editable target stores backing the scripted document.
//!
//! Two families of target exist: value-backed form controls (single-line
//! inputs and textareas) and node-backed editable documents (contenteditable
//! regions and full design-mode documents). Both store their text in a rope;
//! the difference is the content policy applied on writes.

use ropey::Rope;
use unicode_segmentation::UnicodeSegmentation;

use ime_state::Span;

/// Kind of editing target under focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Single-line form control; line breaks are stripped on insert.
    PlainInput,
    TextArea,
    ContentEditable,
    DesignMode,
}

impl TargetKind {
    pub fn is_multiline(self) -> bool {
        !matches!(self, TargetKind::PlainInput)
    }
}

/// Text storage for one editing target. Offsets are char indices; `replace`
/// returns how many chars were actually inserted after content policy.
pub trait EditableTarget: Send {
    fn kind(&self) -> TargetKind;
    fn text(&self) -> String;
    fn char_len(&self) -> usize;
    fn replace(&mut self, span: Span, text: &str) -> usize;
}

/// Value-backed form control (`PlainInput` or `TextArea`).
pub struct ValueTarget {
    kind: TargetKind,
    rope: Rope,
}

impl ValueTarget {
    pub fn new(kind: TargetKind, initial: &str) -> Self {
        let mut target = Self {
            kind,
            rope: Rope::new(),
        };
        let len = target.char_len();
        target.replace(Span::new(0, len), initial);
        target
    }
}

impl EditableTarget for ValueTarget {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn char_len(&self) -> usize {
        self.rope.len_chars()
    }

    fn replace(&mut self, span: Span, text: &str) -> usize {
        let end = span.end.min(self.rope.len_chars());
        let start = span.start.min(end);
        self.rope.remove(start..end);
        if self.kind.is_multiline() {
            self.rope.insert(start, text);
            text.chars().count()
        } else {
            let stripped: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
            self.rope.insert(start, &stripped);
            stripped.chars().count()
        }
    }
}

/// Node-backed editable region (`ContentEditable` or `DesignMode`). Inserts
/// verbatim; line breaks become content like any other char.
pub struct NodeTarget {
    kind: TargetKind,
    rope: Rope,
}

impl NodeTarget {
    pub fn new(kind: TargetKind, initial: &str) -> Self {
        Self {
            kind,
            rope: Rope::from_str(initial),
        }
    }
}

impl EditableTarget for NodeTarget {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn char_len(&self) -> usize {
        self.rope.len_chars()
    }

    fn replace(&mut self, span: Span, text: &str) -> usize {
        let end = span.end.min(self.rope.len_chars());
        let start = span.start.min(end);
        self.rope.remove(start..end);
        self.rope.insert(start, text);
        text.chars().count()
    }
}

/// Construct the store matching `kind`.
pub fn target_for(kind: TargetKind, initial: &str) -> Box<dyn EditableTarget> {
    match kind {
        TargetKind::PlainInput | TargetKind::TextArea => Box::new(ValueTarget::new(kind, initial)),
        TargetKind::ContentEditable | TargetKind::DesignMode => {
            Box::new(NodeTarget::new(kind, initial))
        }
    }
}

/// Largest grapheme boundary strictly before `at`, in char offsets.
pub fn prev_grapheme_boundary(text: &str, at: usize) -> usize {
    let mut prev = 0;
    let mut pos = 0;
    for grapheme in text.graphemes(true) {
        pos += grapheme.chars().count();
        if pos >= at {
            return prev;
        }
        prev = pos;
    }
    prev
}

/// Smallest grapheme boundary strictly after `at`, in char offsets.
pub fn next_grapheme_boundary(text: &str, at: usize) -> usize {
    let mut pos = 0;
    for grapheme in text.graphemes(true) {
        pos += grapheme.chars().count();
        if pos > at {
            return pos;
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_input_strips_line_breaks() {
        let mut target = ValueTarget::new(TargetKind::PlainInput, "");
        assert_eq!(target.replace(Span::new(0, 0), "a\nb\r\nc"), 3);
        assert_eq!(target.text(), "abc");
    }

    #[test]
    fn textarea_keeps_line_breaks() {
        let mut target = ValueTarget::new(TargetKind::TextArea, "");
        assert_eq!(target.replace(Span::new(0, 0), "a\nb"), 3);
        assert_eq!(target.text(), "a\nb");
    }

    #[test]
    fn replace_clamps_span_to_length() {
        let mut target = NodeTarget::new(TargetKind::ContentEditable, "abc");
        target.replace(Span::new(1, 99), "X");
        assert_eq!(target.text(), "aX");
    }

    #[test]
    fn grapheme_boundaries_cluster_combining_marks() {
        // "e" + COMBINING ACUTE is one grapheme of two chars.
        let text = "ae\u{0301}b";
        assert_eq!(next_grapheme_boundary(text, 1), 3);
        assert_eq!(prev_grapheme_boundary(text, 3), 1);
        assert_eq!(prev_grapheme_boundary(text, 1), 0);
        assert_eq!(next_grapheme_boundary(text, 3), 4);
        assert_eq!(next_grapheme_boundary(text, 4), 4, "clamps at end");
        assert_eq!(prev_grapheme_boundary(text, 0), 0, "clamps at start");
    }
}
