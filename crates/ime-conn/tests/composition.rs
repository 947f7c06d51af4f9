//! Composition lifecycle through the connection adapter: open, update,
//! re-anchor, finish, and the duplicate-submission rule.

mod common;

use std::time::{Duration, Instant};

use common::plain_session;
use ime_events::NotificationKind;
use ime_state::Span;

#[test]
fn compose_update_and_finish() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.set_composing_text("foo", 1);
    assert_eq!(ic.extracted_text().text, "foo");
    let mirror = session.bridge.synchronizer().mirror().snapshot();
    assert_eq!(mirror.composition(), Some(Span::new(0, 3)));

    // The empty string collapses the composing range but stays composing.
    ic.set_composing_text("", 1);
    assert_eq!(ic.extracted_text().text, "");
    assert!(
        session
            .bridge
            .synchronizer()
            .mirror()
            .snapshot()
            .composition()
            .is_some()
    );

    ic.set_composing_text("bar", 1);
    ic.finish_composing_text();

    let mirror = session.bridge.synchronizer().mirror().snapshot();
    assert_eq!(mirror.text(), "bar");
    assert_eq!(mirror.composition(), None);
    assert_eq!(
        session.recorder.kinds(),
        [
            NotificationKind::CompositionUpdate,
            NotificationKind::CompositionUpdate,
            NotificationKind::CompositionUpdate,
            NotificationKind::CompositionEnd,
        ]
    );
}

#[test]
fn identical_composing_text_is_submitted_once() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.set_composing_text("foo", 1);
    ic.set_composing_text("foo", 1);
    ic.finish_composing_text();

    assert_eq!(ic.extracted_text().text, "foo");
    assert_eq!(
        session.recorder.count_of(NotificationKind::CompositionUpdate),
        1
    );
}

#[test]
fn composing_region_reanchors_the_next_composition() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.commit_text("far", 1);
    ic.set_composing_region(1, 3);
    ic.set_composing_text("rabar", 1);

    let extracted = ic.extracted_text();
    assert_eq!(extracted.text, "frabar");
    assert_eq!((extracted.selection_start, extracted.selection_end), (6, 6));
    let mirror = session.bridge.synchronizer().mirror().snapshot();
    assert_eq!(mirror.composition(), Some(Span::new(1, 6)));

    ic.finish_composing_text();
    assert_eq!(ic.extracted_text().text, "frabar");
}

#[test]
fn commit_replaces_active_composition() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.set_composing_text("foo", 1);
    ic.commit_text("bar", 1);

    let mirror = session.bridge.synchronizer().mirror().snapshot();
    assert_eq!(mirror.text(), "bar");
    assert_eq!(mirror.composition(), None);
    assert_eq!(
        session.recorder.count_of(NotificationKind::CompositionEnd),
        1
    );
}

#[test]
fn finish_without_composition_returns_immediately() {
    let session = plain_session("abc", (3, 3));
    let ic = session.bridge.connection();

    let start = Instant::now();
    ic.finish_composing_text();
    // No composition means no wait; well under the 2s wait budget.
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(ic.extracted_text().text, "abc");
}
