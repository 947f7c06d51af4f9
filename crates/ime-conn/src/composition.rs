//! Composing-region bookkeeping for the connection adapter.

use ime_state::Span;

/// Tracks the active composition and the last composing text the host
/// submitted, so duplicate submissions stay silent, plus any region set via
/// `set_composing_region` that the next composing text must re-anchor to.
#[derive(Debug, Default)]
pub(crate) struct CompositionTracker {
    active: bool,
    last_submitted: Option<String>,
    pending_region: Option<Span>,
}

impl CompositionTracker {
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    /// Remember a repositioned composition anchor. Reconciled on the next
    /// composing-text submission; never mutates text by itself.
    pub(crate) fn note_region(&mut self, region: Span) {
        self.pending_region = Some(region);
    }

    pub(crate) fn has_pending_region(&self) -> bool {
        self.pending_region.is_some()
    }

    pub(crate) fn take_region(&mut self) -> Option<Span> {
        self.pending_region.take()
    }

    /// Identical code units to the last submission: must not re-trigger a
    /// composition update.
    pub(crate) fn matches_last(&self, text: &str) -> bool {
        self.last_submitted.as_deref() == Some(text)
    }

    pub(crate) fn begin(&mut self) {
        self.active = true;
        self.last_submitted = None;
    }

    pub(crate) fn submitted(&mut self, text: &str) {
        self.last_submitted = Some(text.to_owned());
    }

    /// Composition ended (finish or commit) or target retired.
    pub(crate) fn clear(&mut self) {
        self.active = false;
        self.last_submitted = None;
        self.pending_region = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_submission_detection() {
        let mut tracker = CompositionTracker::default();
        tracker.begin();
        assert!(!tracker.matches_last("foo"));
        tracker.submitted("foo");
        assert!(tracker.matches_last("foo"));
        assert!(!tracker.matches_last("bar"));
        // Empty string is a real submission, distinct from "none yet".
        tracker.submitted("");
        assert!(tracker.matches_last(""));
    }

    #[test]
    fn begin_resets_last_submission() {
        let mut tracker = CompositionTracker::default();
        tracker.begin();
        tracker.submitted("foo");
        tracker.clear();
        tracker.begin();
        assert!(!tracker.matches_last("foo"));
    }

    #[test]
    fn region_is_consumed_once() {
        let mut tracker = CompositionTracker::default();
        tracker.note_region(Span::new(1, 4));
        assert!(tracker.has_pending_region());
        assert_eq!(tracker.take_region(), Some(Span::new(1, 4)));
        assert_eq!(tracker.take_region(), None);
    }
}
