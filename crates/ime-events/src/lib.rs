//! Command, notification, and key types shared across the bridge, plus the
//! channel policy and telemetry counters for the document command lane.

use std::fmt;
use std::sync::atomic::AtomicU64;

use crossbeam_channel::{Receiver, Sender, bounded};
use ime_state::{Span, TextSnapshot};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// Commands to the document are fire-and-forget over a bounded channel. A single producer (the
// connection adapter on the host thread) feeds a single consumer (the document actor), so a
// blocking send under backpressure preserves command order without drop strategies. Send failure
// (consumer gone) is recorded and otherwise ignored: the IME contract has no failure channel, and
// the bounded wait in the synchronizer guarantees the caller still returns.
// -------------------------------------------------------------------------------------------------
pub const COMMAND_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Minimal relaxed atomic counters; inspected in tests and periodically logged by the binary.
// -------------------------------------------------------------------------------------------------
pub static COMMANDS_DISPATCHED: AtomicU64 = AtomicU64::new(0);
pub static COMMAND_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static NOTIFICATIONS_APPLIED: AtomicU64 = AtomicU64::new(0);
pub static NOTIFICATIONS_STALE_DROPPED: AtomicU64 = AtomicU64::new(0);
pub static WAITS_REGISTERED: AtomicU64 = AtomicU64::new(0);
pub static WAIT_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
pub static WAITS_CANCELLED: AtomicU64 = AtomicU64::new(0);
pub static BATCH_FLUSHES: AtomicU64 = AtomicU64::new(0);
pub static BATCH_UNBALANCED_ENDS: AtomicU64 = AtomicU64::new(0);

/// Kind of asynchronous state-change notification emitted by the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    CompositionUpdate,
    CompositionEnd,
    /// Text content changed.
    Input,
    SelectionChange,
}

bitflags::bitflags! {
    /// Set of notification kinds a pending waiter accepts. Several IME calls
    /// resolve on whichever of two kinds arrives first (e.g. a commit resolves
    /// on composition-end or input).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NotifMask: u8 {
        const COMPOSITION_UPDATE = 1;
        const COMPOSITION_END = 2;
        const INPUT = 4;
        const SELECTION_CHANGE = 8;
    }
}

impl NotificationKind {
    pub fn mask(self) -> NotifMask {
        match self {
            NotificationKind::CompositionUpdate => NotifMask::COMPOSITION_UPDATE,
            NotificationKind::CompositionEnd => NotifMask::COMPOSITION_END,
            NotificationKind::Input => NotifMask::INPUT,
            NotificationKind::SelectionChange => NotifMask::SELECTION_CHANGE,
        }
    }
}

/// Asynchronous notification from the document. `epoch` identifies the focus
/// cycle it belongs to; notifications from a retired target are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocNotification {
    pub kind: NotificationKind,
    pub epoch: u64,
    pub snapshot: Option<TextSnapshot>,
}

impl DocNotification {
    pub fn new(kind: NotificationKind, epoch: u64, snapshot: TextSnapshot) -> Self {
        Self {
            kind,
            epoch,
            snapshot: Some(snapshot),
        }
    }

    pub fn bare(kind: NotificationKind, epoch: u64) -> Self {
        Self {
            kind,
            epoch,
            snapshot: None,
        }
    }
}

/// Fire-and-forget operation dispatched to the document.
///
/// Caret hints follow the host IME convention: a hint `> 0` positions the
/// caret relative to the end of the inserted text (1 = directly after it),
/// a hint `<= 0` relative to its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocOp {
    /// Open a composition over `region`, or over the current selection when
    /// `region` is `None`. Re-anchors an already active composition.
    StartComposition { region: Option<Span> },
    UpdateCompositionText { text: String, caret: i32 },
    EndComposition,
    CommitText { text: String, caret: i32 },
    /// Delete `before` chars before the selection start and `after` chars
    /// after the selection end (each clamped to what exists).
    DeleteSurrounding { before: usize, after: usize },
    SetSelection { start: usize, end: usize },
    DispatchKey(KeyEvent),
}

/// One immutable command, stamped with the epoch it was issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocCommand {
    pub epoch: u64,
    pub op: DocOp,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ModMask: u8 { const SHIFT = 1; const CTRL = 2; const ALT = 4; }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Backspace,
    Delete,
    Enter,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
    Shift,
    Ctrl,
    Alt,
}

impl KeyCode {
    pub fn is_modifier(self) -> bool {
        matches!(self, KeyCode::Shift | KeyCode::Ctrl | KeyCode::Alt)
    }

    /// Whether pressing this key can change text or selection. Drives the
    /// forwarder's wait policy: only possibly-mutating keys block on a
    /// completion notification.
    pub fn may_mutate(self) -> bool {
        !self.is_modifier()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn down(code: KeyCode) -> Self {
        Self {
            code,
            action: KeyAction::Down,
        }
    }

    pub fn up(code: KeyCode) -> Self {
        Self {
            code,
            action: KeyAction::Up,
        }
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:?}", self.code, self.action)
    }
}

/// Inbound delivery surface for document notifications. The synchronizer
/// implements this; harnesses can wrap it to observe the stream.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: DocNotification);
}

/// Outbound command lane to the document.
#[derive(Clone)]
pub struct CommandSink {
    tx: Sender<DocCommand>,
}

impl CommandSink {
    /// Send one command. Returns `false` when the document side is gone; the
    /// caller proceeds on mirror state rather than surfacing an error.
    pub fn dispatch(&self, command: DocCommand) -> bool {
        let op = op_label(&command.op);
        match self.tx.send(command) {
            Ok(()) => {
                COMMANDS_DISPATCHED.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::trace!(target: "conn.command", op, "dispatched");
                true
            }
            Err(_) => {
                COMMAND_SEND_FAILURES.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::warn!(target: "conn.command", op, "document_channel_closed");
                false
            }
        }
    }
}

fn op_label(op: &DocOp) -> &'static str {
    match op {
        DocOp::StartComposition { .. } => "start_composition",
        DocOp::UpdateCompositionText { .. } => "update_composition_text",
        DocOp::EndComposition => "end_composition",
        DocOp::CommitText { .. } => "commit_text",
        DocOp::DeleteSurrounding { .. } => "delete_surrounding",
        DocOp::SetSelection { .. } => "set_selection",
        DocOp::DispatchKey(_) => "dispatch_key",
    }
}

/// Bounded command channel with the default capacity.
pub fn command_channel() -> (CommandSink, Receiver<DocCommand>) {
    command_channel_with(COMMAND_CHANNEL_CAP)
}

pub fn command_channel_with(capacity: usize) -> (CommandSink, Receiver<DocCommand>) {
    let (tx, rx) = bounded(capacity);
    (CommandSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_masks_are_disjoint() {
        let kinds = [
            NotificationKind::CompositionUpdate,
            NotificationKind::CompositionEnd,
            NotificationKind::Input,
            NotificationKind::SelectionChange,
        ];
        let mut seen = NotifMask::empty();
        for kind in kinds {
            assert!(!seen.intersects(kind.mask()));
            seen |= kind.mask();
        }
        assert_eq!(seen, NotifMask::all());
    }

    #[test]
    fn modifier_keys_never_mutate() {
        assert!(!KeyCode::Shift.may_mutate());
        assert!(!KeyCode::Ctrl.may_mutate());
        assert!(KeyCode::Char('t').may_mutate());
        assert!(KeyCode::ArrowLeft.may_mutate());
        assert!(KeyCode::Backspace.may_mutate());
    }

    #[test]
    fn dispatch_reports_closed_channel() {
        let (sink, rx) = command_channel_with(4);
        assert!(sink.dispatch(DocCommand {
            epoch: 0,
            op: DocOp::EndComposition,
        }));
        drop(rx);
        assert!(!sink.dispatch(DocCommand {
            epoch: 0,
            op: DocOp::EndComposition,
        }));
    }
}
