//! Per-target session lifecycle: focus epochs and soft-keyboard visibility
//! gating.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ime_config::BridgeConfig;
use ime_events::CommandSink;
use ime_state::StateMirror;
use ime_sync::EventSynchronizer;
use tracing::debug;

use crate::adapter::InputConnectionAdapter;
use crate::composition::CompositionTracker;

/// Why a target gained or lost focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusReason {
    UserFocus,
    Programmatic,
    /// Transient blur/focus churn (e.g. same-tick blur followed by refocus);
    /// visibility changes are deferred so only the settled state is observed.
    Temporary,
}

/// Direction reported to the host when the input session restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Focus,
    Blur,
}

/// External soft-keyboard collaborator. The bridge only signals; it owns no
/// visibility state beyond the gating flags below.
pub trait SoftInputHost: Send + Sync {
    fn restart_input(&self, reason: RestartReason);
    fn show_soft_input(&self) {}
    fn hide_soft_input(&self) {}
}

/// Owns the mirror, synchronizer, and composition state for one editing
/// session, and drives the focus lifecycle. Hand out connection adapters via
/// [`TextInputBridge::connection`].
pub struct TextInputBridge {
    sync: Arc<EventSynchronizer>,
    sink: CommandSink,
    tracker: Arc<Mutex<CompositionTracker>>,
    /// True once any user-driven activity (key or mutating IME call) has been
    /// observed; show/hide callbacks are suppressed before that.
    activity: Arc<AtomicBool>,
    pending_hide: AtomicBool,
    host: Arc<dyn SoftInputHost>,
    timeout: Duration,
}

impl TextInputBridge {
    pub fn new(config: &BridgeConfig, sink: CommandSink, host: Arc<dyn SoftInputHost>) -> Self {
        Self {
            sync: Arc::new(EventSynchronizer::new(StateMirror::new(0))),
            sink,
            tracker: Arc::new(Mutex::new(CompositionTracker::default())),
            activity: Arc::new(AtomicBool::new(false)),
            pending_hide: AtomicBool::new(false),
            host,
            timeout: config.wait_timeout,
        }
    }

    /// The synchronizer doubles as the notification sink handed to the
    /// document side.
    pub fn synchronizer(&self) -> Arc<EventSynchronizer> {
        Arc::clone(&self.sync)
    }

    pub fn current_epoch(&self) -> u64 {
        self.sync.epoch()
    }

    pub fn user_action_observed(&self) -> bool {
        self.activity.load(Ordering::Relaxed)
    }

    /// Create a connection adapter bound to this session.
    pub fn connection(&self) -> InputConnectionAdapter {
        InputConnectionAdapter::new(
            Arc::clone(&self.sync),
            self.sink.clone(),
            Arc::clone(&self.tracker),
            Arc::clone(&self.activity),
            self.timeout,
        )
    }

    /// Standalone key forwarder, for callers that only inject keys.
    pub fn key_forwarder(&self) -> crate::keys::KeyEventForwarder {
        crate::keys::KeyEventForwarder::new(
            Arc::clone(&self.sync),
            self.sink.clone(),
            Arc::clone(&self.activity),
            self.timeout,
        )
    }

    /// An editing target gained focus: retire the old epoch (cancelling any
    /// outstanding waiters), reset the mirror and composition state, restart
    /// the input session. A deferred hide from a temporary blur is cancelled;
    /// the keyboard is shown only once a user action has been observed.
    pub fn on_focus(&self, reason: FocusReason) {
        let epoch = self.sync.retire_epoch();
        self.tracker.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!(target: "conn.session", epoch, ?reason, "focus");
        self.host.restart_input(RestartReason::Focus);
        self.pending_hide.store(false, Ordering::SeqCst);
        if self.user_action_observed() {
            self.host.show_soft_input();
        }
    }

    /// The target lost focus. A temporary blur defers the hide (a prompt
    /// refocus cancels it via [`TextInputBridge::on_focus`]); otherwise the
    /// hide fires immediately, again gated on observed user action.
    pub fn on_blur(&self, reason: FocusReason) {
        let epoch = self.sync.retire_epoch();
        self.tracker.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!(target: "conn.session", epoch, ?reason, "blur");
        self.host.restart_input(RestartReason::Blur);
        if !self.user_action_observed() {
            return;
        }
        if reason == FocusReason::Temporary {
            self.pending_hide.store(true, Ordering::SeqCst);
        } else {
            self.host.hide_soft_input();
        }
    }

    /// Flush a deferred hide once focus churn has settled with no refocus.
    pub fn settle(&self) {
        if self.pending_hide.swap(false, Ordering::SeqCst) && self.user_action_observed() {
            self.host.hide_soft_input();
        }
    }
}
