//! Raw key forwarding into the document's key pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ime_events::{CommandSink, DocCommand, DocOp, KeyAction, KeyCode, KeyEvent, NotifMask};
use ime_sync::EventSynchronizer;
use tracing::trace;

/// Forwards key events to the document. Keys that can mutate text or
/// selection block (bounded) on the resulting notification; bare modifiers
/// are fire-and-forget. Every forwarded key marks user activity, which gates
/// soft-keyboard visibility; this works even with no target text at all
/// (the command is simply inert on the document side).
pub struct KeyEventForwarder {
    sync: Arc<EventSynchronizer>,
    sink: CommandSink,
    activity: Arc<AtomicBool>,
    timeout: Duration,
}

impl KeyEventForwarder {
    pub(crate) fn new(
        sync: Arc<EventSynchronizer>,
        sink: CommandSink,
        activity: Arc<AtomicBool>,
        timeout: Duration,
    ) -> Self {
        Self {
            sync,
            sink,
            activity,
            timeout,
        }
    }

    /// Forward a single key event (one half of a down/up pair).
    pub fn send_key_event(&self, key: KeyEvent) {
        let wait = key.action == KeyAction::Down && key.code.may_mutate();
        self.forward(&[key], wait);
    }

    /// Forward a full down/up pair and wait once for its effect.
    pub fn press_key(&self, code: KeyCode) {
        self.forward(&[KeyEvent::down(code), KeyEvent::up(code)], code.may_mutate());
    }

    fn forward(&self, keys: &[KeyEvent], wait: bool) {
        self.activity.store(true, Ordering::Relaxed);
        let epoch = self.sync.epoch();
        trace!(target: "conn.keys", count = keys.len(), wait, "forward");

        if self.sync.in_batch() {
            if wait {
                self.sync.note_batched_wait();
            }
            for key in keys {
                self.sink.dispatch(DocCommand {
                    epoch,
                    op: DocOp::DispatchKey(*key),
                });
            }
            return;
        }

        let waiter = wait.then(|| {
            self.sync
                .expect(NotifMask::INPUT | NotifMask::SELECTION_CHANGE)
        });
        let mut dispatched = true;
        for key in keys {
            dispatched &= self.sink.dispatch(DocCommand {
                epoch,
                op: DocOp::DispatchKey(*key),
            });
        }
        if let Some(waiter) = waiter {
            if dispatched {
                let _ = waiter.block(self.timeout);
            } else {
                waiter.abandon();
            }
        }
    }
}
