//! End-to-end coverage of the plain text verbs: commit, delete surrounding,
//! selection moves, and the non-blocking text queries.

mod common;

use common::plain_session;
use ime_events::NotificationKind;

#[test]
fn commit_text_round_trip() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.commit_text("foo", 1);

    let extracted = ic.extracted_text();
    assert_eq!(extracted.text, "foo");
    assert_eq!((extracted.selection_start, extracted.selection_end), (3, 3));
    assert_eq!(session.recorder.kinds(), [NotificationKind::CompositionEnd]);
}

#[test]
fn commit_sequence_honors_caret_hints() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.commit_text("foo", 1);
    // Empty commit with no composition: issued, changes nothing, waits on
    // nothing (a large hint must not matter).
    ic.commit_text("", 10);
    ic.commit_text("bar", 1);
    assert_eq!(ic.extracted_text().text, "foobar");

    // Negative hint counts back from the insert start.
    ic.commit_text("foo", -1);
    let extracted = ic.extracted_text();
    assert_eq!(extracted.text, "foobarfoo");
    assert_eq!((extracted.selection_start, extracted.selection_end), (5, 5));
}

#[test]
fn ideographic_space_commits_as_one_char() {
    let session = plain_session("", (0, 0));
    let ic = session.bridge.connection();

    ic.commit_text("\u{3000}", 1);

    let extracted = ic.extracted_text();
    assert_eq!(extracted.text, "\u{3000}");
    assert_eq!((extracted.selection_start, extracted.selection_end), (1, 1));
    assert_eq!(ic.text_before_cursor(1), "\u{3000}");
}

#[test]
fn set_selection_clamps_instead_of_failing() {
    let session = plain_session("foo", (3, 3));
    let ic = session.bridge.connection();

    ic.set_selection(-3, 6);
    let extracted = ic.extracted_text();
    assert_eq!((extracted.selection_start, extracted.selection_end), (0, 3));

    // Re-requesting the same clamped range changes nothing and emits nothing.
    ic.set_selection(0, 3);
    ic.commit_text("x", 1);
    assert_eq!(
        session.recorder.count_of(NotificationKind::SelectionChange),
        1
    );
}

#[test]
fn delete_surrounding_text_scenarios() {
    let session = plain_session("foobarfoo", (5, 5));
    let ic = session.bridge.connection();

    ic.delete_surrounding_text(1, 0);
    assert_eq!(ic.extracted_text().text, "foobrfoo");
    assert_eq!(ic.extracted_text().selection_start, 4);

    ic.delete_surrounding_text(1, 1);
    assert_eq!(ic.extracted_text().text, "foofoo");
    assert_eq!(ic.extracted_text().selection_start, 3);

    // Counts past the end clamp to what exists.
    ic.delete_surrounding_text(0, 10);
    assert_eq!(ic.extracted_text().text, "foo");

    // Zero/zero and negative requests are structural no-ops.
    ic.delete_surrounding_text(0, 0);
    ic.delete_surrounding_text(-1, -1);
    ic.commit_text("!", 1);
    assert_eq!(ic.extracted_text().text, "foo!");
    assert_eq!(session.recorder.count_of(NotificationKind::Input), 3);
}

#[test]
fn text_queries_answer_from_the_mirror() {
    let session = plain_session("foobarfoo", (3, 6));
    let ic = session.bridge.connection();

    assert_eq!(ic.text_before_cursor(3), "foo");
    assert_eq!(ic.text_after_cursor(3), "foo");
    assert_eq!(ic.text_before_cursor(100), "foo");
    assert_eq!(ic.text_after_cursor(100), "foo");

    let extracted = ic.extracted_text();
    assert_eq!(extracted.text, "foobarfoo");
    assert_eq!((extracted.selection_start, extracted.selection_end), (3, 6));
    // Queries never produced a notification.
    assert!(session.recorder.kinds().is_empty());
}
