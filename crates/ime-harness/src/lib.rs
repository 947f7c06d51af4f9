//! In-process document harness: a scripted editable target that consumes
//! document commands and answers with snapshot-carrying notifications,
//! standing in for a real rendering engine during tests and demos.

mod document;
mod recorder;
mod store;

pub use document::Document;
pub use recorder::RecordingSink;
pub use store::{
    EditableTarget, NodeTarget, TargetKind, ValueTarget, next_grapheme_boundary,
    prev_grapheme_boundary, target_for,
};
