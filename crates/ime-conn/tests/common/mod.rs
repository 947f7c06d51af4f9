//! Shared wiring: a bridge connected to a scripted document actor on its own
//! thread, with a recording sink between them.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ime_config::BridgeConfig;
use ime_conn::{RestartReason, SoftInputHost, TextInputBridge};
use ime_events::{NotificationSink, command_channel_with};
use ime_harness::{Document, RecordingSink, TargetKind};

pub struct QuietHost;

impl SoftInputHost for QuietHost {
    fn restart_input(&self, _reason: RestartReason) {}
}

pub struct Session {
    pub bridge: TextInputBridge,
    pub recorder: Arc<RecordingSink>,
    _actor: JoinHandle<()>,
}

pub fn session(kind: TargetKind, text: &str, selection: (usize, usize)) -> Session {
    let config = BridgeConfig {
        wait_timeout: Duration::from_secs(2),
        channel_capacity: 64,
    };
    let (sink, rx) = command_channel_with(config.channel_capacity);
    let bridge = TextInputBridge::new(&config, sink, Arc::new(QuietHost));
    let recorder = Arc::new(RecordingSink::new(bridge.synchronizer()));

    let mut document = Document::new(kind, text);
    document.place_selection(selection.0, selection.1);
    // Seed the mirror with the document's starting state before any commands
    // flow, the way a focus notification would.
    bridge.synchronizer().mirror().apply(&document.snapshot());
    let notif_sink: Arc<dyn NotificationSink> = recorder.clone();
    let actor = document.spawn(rx, notif_sink);

    Session {
        bridge,
        recorder,
        _actor: actor,
    }
}

pub fn plain_session(text: &str, selection: (usize, usize)) -> Session {
    session(TargetKind::PlainInput, text, selection)
}
