//! Host-facing input connection layer.
//!
//! [`TextInputBridge`] owns one editing session: the state mirror, the event
//! synchronizer, composition bookkeeping, and the focus lifecycle.
//! [`InputConnectionAdapter`] is the synchronous verb surface handed to the
//! platform IME (commit, compose, delete, select, query, batch, keys), built
//! on the bridge's synchronizer so every mutating verb observes its own
//! effect before returning.

mod adapter;
mod composition;
mod keys;
mod session;

pub use adapter::InputConnectionAdapter;
pub use keys::KeyEventForwarder;
pub use session::{FocusReason, RestartReason, SoftInputHost, TextInputBridge};
