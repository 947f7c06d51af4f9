//! Imebridge entrypoint: wires a text-input bridge to the in-process
//! document harness and drives a scripted editing session, logging the
//! traffic on both sides. Useful for eyeballing synchronization behavior
//! under `RUST_LOG=trace`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use ime_config::load_from;
use ime_conn::{FocusReason, RestartReason, SoftInputHost, TextInputBridge};
use ime_events::{
    BATCH_FLUSHES, COMMANDS_DISPATCHED, KeyCode, NOTIFICATIONS_APPLIED, NotificationSink,
    WAIT_TIMEOUTS, WAITS_REGISTERED, command_channel_with,
};
use ime_harness::{Document, RecordingSink, TargetKind};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "imebridge", version, about = "IME text-input bridge demo")]
struct Args {
    /// Optional configuration file path (overrides discovery of `imebridge.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Kind of editable target to script against.
    #[arg(long = "target", value_enum, default_value_t = TargetArg::Plain)]
    target: TargetArg,
    /// Initial target content.
    #[arg(long = "text", default_value = "")]
    text: String,
    /// Append logs to this file instead of stderr.
    #[arg(long = "log")]
    log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    Plain,
    Textarea,
    Contenteditable,
    Designmode,
}

impl From<TargetArg> for TargetKind {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Plain => TargetKind::PlainInput,
            TargetArg::Textarea => TargetKind::TextArea,
            TargetArg::Contenteditable => TargetKind::ContentEditable,
            TargetArg::Designmode => TargetKind::DesignMode,
        }
    }
}

/// Host that only logs keyboard signals; there is no real soft keyboard here.
struct LoggingHost;

impl SoftInputHost for LoggingHost {
    fn restart_input(&self, reason: RestartReason) {
        info!(target: "host.ime", ?reason, "restart_input");
    }

    fn show_soft_input(&self) {
        info!(target: "host.ime", "show_soft_input");
    }

    fn hide_soft_input(&self) {
        info!(target: "host.ime", "hide_soft_input");
    }
}

fn configure_logging(log: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    match log {
        Some(path) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => std::path::Path::new("."),
            };
            let name = path.file_name().map_or_else(
                || std::ffi::OsString::from("imebridge.log"),
                |n| n.to_os_string(),
            );
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.log.as_ref());
    info!(target: "runtime", "startup");

    let config = load_from(args.config.as_deref())?;
    let (sink, rx) = command_channel_with(config.channel_capacity);
    let bridge = TextInputBridge::new(&config, sink, Arc::new(LoggingHost));
    let recorder = Arc::new(RecordingSink::new(bridge.synchronizer()));

    let document = Document::new(args.target.into(), &args.text);
    bridge.synchronizer().mirror().apply(&document.snapshot());
    let notif_sink: Arc<dyn NotificationSink> = Arc::clone(&recorder) as Arc<dyn NotificationSink>;
    let actor = document.spawn(rx, notif_sink);

    bridge.on_focus(FocusReason::UserFocus);
    run_script(&bridge);
    bridge.on_blur(FocusReason::Programmatic);
    bridge.settle();

    let extracted = bridge.connection().extracted_text();
    println!(
        "final text: {:?} selection: {}..{}",
        extracted.text, extracted.selection_start, extracted.selection_end
    );
    println!("notifications: {:?}", recorder.take());

    info!(
        target: "runtime.telemetry",
        commands = COMMANDS_DISPATCHED.load(Ordering::Relaxed),
        applied = NOTIFICATIONS_APPLIED.load(Ordering::Relaxed),
        waits = WAITS_REGISTERED.load(Ordering::Relaxed),
        timeouts = WAIT_TIMEOUTS.load(Ordering::Relaxed),
        batch_flushes = BATCH_FLUSHES.load(Ordering::Relaxed),
        "session_complete"
    );

    drop(bridge);
    let _ = actor.join();
    Ok(())
}

/// A representative editing session: typing, a composition with updates and a
/// re-anchor, surrounding deletion, and a batched edit.
fn run_script(bridge: &TextInputBridge) {
    let ic = bridge.connection();

    ic.commit_text("hello ", 1);

    ic.set_composing_text("wor", 1);
    ic.set_composing_text("worl", 1);
    ic.set_composing_text("world", 1);
    ic.finish_composing_text();

    ic.delete_surrounding_text(5, 0);
    ic.set_composing_region(0, 5);
    ic.set_composing_text("goodbye", 1);
    ic.finish_composing_text();

    ic.begin_batch_edit();
    ic.commit_text(" and ", 1);
    ic.commit_text("farewell", 1);
    ic.end_batch_edit();

    let forwarder = bridge.key_forwarder();
    forwarder.press_key(KeyCode::Char('!'));
    ic.press_key(KeyCode::Backspace);
    ic.press_key(KeyCode::Char('.'));

    info!(
        target: "runtime.script",
        before = %ic.text_before_cursor(10),
        after = %ic.text_after_cursor(10),
        "script_complete"
    );
}
