use serde_json::Value;
use std::io;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use widget_bridge::notice::{NoticeBoard, StatusNotice};
use widget_bridge::{
    BridgeError, CompletionLedger, ExitOutcome, HostConfig, HostDelegate, ThemeCatalog,
};

const LOG_ENV: &str = "WIDGET_HOST_LOG";

fn main() {
    if let Err(err) = init_logging() {
        eprintln!("widget_host: {err}");
        process::exit(1);
    }

    if let Err(err) = run() {
        error!("widget_host fatal error: {err}");
        process::exit(1);
    }
}

fn init_logging() -> Result<(), BridgeError> {
    let filter = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&filter)
        .map_err(|e| BridgeError::Config(format!("invalid log filter '{filter}': {e}")))?;

    // stdout carries widget frames; logs go to stderr.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("failed to initialize logging: {e}")))
}

fn run() -> Result<(), BridgeError> {
    let config = HostConfig::from_env()?;
    info!(
        sid = %config.session.sid,
        target = ?config.session.target,
        auto_init = config.session.auto_init,
        "starting widget host"
    );

    let host = widget_bridge::run(config, Arc::new(ThemeCatalog::builtin()), ConsoleHost::default())?;

    let modules: Vec<&str> = host.ledger.completed_modules().collect();
    let skills: Vec<&str> = host.ledger.completed_skills().collect();
    info!(?modules, ?skills, "completed content");
    Ok(())
}

/// Logs widget traffic and keeps the host-side completion record.
#[derive(Default)]
struct ConsoleHost {
    ledger: CompletionLedger,
    notices: NoticeBoard,
}

impl ConsoleHost {
    fn notify(&mut self, notice: StatusNotice) {
        info!(kind = ?notice.kind, "{}", notice.text);
        self.notices.show(notice);
    }
}

impl HostDelegate for ConsoleHost {
    fn widget_ready(&mut self) {
        info!("widget is ready");
    }

    fn initialized(&mut self, config: &Value) {
        info!(%config, "widget initialized");
    }

    fn initialization_failed(&mut self, error: &BridgeError) {
        error!("{error}");
    }

    fn exited(&mut self, outcome: &ExitOutcome) {
        match self.ledger.record(outcome) {
            Some(target) => info!(%target, "completed; progress saved"),
            None if outcome.is_completion() => info!("completed"),
            None => info!(source = %outcome.event().source, "exited without completing"),
        }
    }

    fn theme_applied(&mut self, _detail: &Value) {
        self.notify(StatusNotice::success("CSS applied successfully", Instant::now()));
    }

    fn theme_failed(&mut self, error: &BridgeError) {
        self.notify(StatusNotice::error(error.to_string(), Instant::now()));
    }

    fn sounds_loaded(&mut self, _detail: &Value) {
        self.notify(StatusNotice::success("Custom sounds loaded", Instant::now()));
    }

    fn sounds_failed(&mut self, error: &BridgeError) {
        self.notify(StatusNotice::error(error.to_string(), Instant::now()));
    }

    fn open_url(&mut self, url: &str) {
        info!(%url, "widget asked to open a url");
    }

    fn play_sound(&mut self, sound: &Value) {
        info!(%sound, "widget asked to play a sound");
    }

    fn widget_error(&mut self, detail: &Value) {
        warn!(%detail, "widget error");
    }
}
