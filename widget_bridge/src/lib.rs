pub mod config;
pub mod diagnostics;
pub mod error;
pub mod exit;
pub mod handle;
pub mod notice;
pub mod protocol;
pub mod session;
pub mod theme;
pub mod user_data;

use crate::protocol::{reader_loop, writer_loop};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long shutdown waits for queued envelopes to reach the widget.
pub const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub use crate::config::{
    AuthToken, DeepLinkTarget, HostConfig, LaunchTarget, SessionConfig, WidgetType,
};
pub use crate::diagnostics::{DiagnosticsSink, EventLog, SharedEventLog};
pub use crate::error::{BridgeError, Result};
pub use crate::exit::{CompletionLedger, ExitEvent, ExitOutcome, ExitSource};
pub use crate::handle::{ElementChannel, Inbound, WebViewChannel, WidgetChannel, WidgetHandle};
pub use crate::protocol::{Envelope, HostCommand, WidgetMessage};
pub use crate::session::{SessionState, ThemeOutcome, WidgetSession};
pub use crate::theme::{CssSource, SoundOverride, Theme, ThemeCatalog, ThemePriority};
pub use crate::user_data::{UserDataSource, UserDataType, fetch_user_data};
pub use serde_json;

/// Host-side reactions to widget traffic. Every method defaults to a no-op.
pub trait HostDelegate {
    fn widget_ready(&mut self) {}

    fn initialized(&mut self, _config: &Value) {}

    fn initialization_failed(&mut self, _error: &BridgeError) {}

    fn exited(&mut self, _outcome: &ExitOutcome) {}

    fn theme_applied(&mut self, _detail: &Value) {}

    fn theme_failed(&mut self, _error: &BridgeError) {}

    fn sounds_loaded(&mut self, _detail: &Value) {}

    fn sounds_failed(&mut self, _error: &BridgeError) {}

    fn open_url(&mut self, _url: &str) {}

    fn play_sound(&mut self, _sound: &Value) {}

    fn navigation_complete(&mut self, _url: Option<&str>) {}

    fn widget_error(&mut self, _detail: &Value) {}
}

impl HostDelegate for () {}

pub fn run<H: HostDelegate>(config: HostConfig, themes: Arc<ThemeCatalog>, host: H) -> Result<H> {
    run_with_io(config, themes, host, io::stdin(), io::stdout())
}

/// Runs one session against a framed widget connection until the widget
/// exits, fails to initialize, or closes its side. Returns the host delegate.
pub fn run_with_io<H, R, W>(
    config: HostConfig,
    themes: Arc<ThemeCatalog>,
    host: H,
    reader: R,
    writer: W,
) -> Result<H>
where
    H: HostDelegate,
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let HostConfig {
        session: session_config,
        theme,
        manual_init_delay,
        outbound_queue_cap,
    } = config;
    let auto_init = session_config.auto_init;
    // A zero-capacity channel only hands off to a writer already blocked in recv.
    let outbound_queue_cap = outbound_queue_cap.max(1);

    let (out_tx, out_rx) = mpsc::sync_channel::<String>(outbound_queue_cap);
    let (in_tx, in_rx) = mpsc::channel::<String>();

    let writer_handle = thread::spawn(move || writer_loop(out_rx, writer));
    let reader_handle = thread::spawn(move || reader_loop(reader, |text| in_tx.send(text).is_ok()));

    let mut session = WidgetSession::new(session_config, themes, host);
    session.attach(Box::new(WebViewChannel::new(out_tx, outbound_queue_cap)));

    let mut pending_theme = theme;
    let mut manual_init_at: Option<Instant> = None;

    loop {
        let now = Instant::now();
        session.poll(now);

        let awaiting_host =
            session.state() == SessionState::ReadyAwaitingInit && session.is_widget_ready();
        if !auto_init && awaiting_host {
            let due = *manual_init_at.get_or_insert(now + manual_init_delay);
            if now >= due {
                if let Err(err) = session.initialize() {
                    warn!("initialize failed: {err}");
                    break;
                }
            }
        }

        if session.state() == SessionState::Initialized {
            if let Some(name) = pending_theme.take() {
                match session.apply_theme(&name) {
                    Ok(outcome) => info!(theme = %name, ?outcome, "configured theme applied"),
                    Err(err) => warn!(theme = %name, "configured theme not applied: {err}"),
                }
            }
        }

        if session.state().is_terminal() {
            break;
        }

        let manual_deadline =
            manual_init_at.filter(|_| session.state() == SessionState::ReadyAwaitingInit);
        let deadline = [session.next_deadline(), manual_deadline]
            .into_iter()
            .flatten()
            .min();

        let received = match deadline {
            Some(deadline) => in_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => in_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(text) => session.receive(text, Instant::now()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!(sid = %session.sid(), "widget closed its side of the channel");
                break;
            }
        }
    }

    info!(sid = %session.sid(), state = %session.state(), "session finished");

    // Releasing the channel drops the outbound sender so the writer drains and exits.
    let host = session.into_host();
    drop(in_rx);

    let drain_deadline = Instant::now() + WRITER_DRAIN_TIMEOUT;
    while !writer_handle.is_finished() && Instant::now() < drain_deadline {
        thread::sleep(Duration::from_millis(5));
    }

    if writer_handle.is_finished() {
        match writer_handle.join() {
            Ok(result) => result?,
            Err(err) => warn!("writer thread join failed: {err:?}"),
        }
    } else {
        // The widget stopped reading; a blocked write would hang shutdown.
        warn!("writer thread still active during shutdown; skipping join");
    }

    if reader_handle.is_finished() {
        match reader_handle.join() {
            Ok(result) => result?,
            Err(err) => warn!("reader thread join failed: {err:?}"),
        }
    } else {
        // A blocked read on the widget side would hang shutdown.
        warn!("reader thread still active during shutdown; skipping join");
    }

    Ok(host)
}
