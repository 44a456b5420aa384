//! Widget session: initialization handshake, inbound dispatch, theming and
//! exit handling for one embedded widget.
//!
//! All mutation happens through `&mut self` on the host's event loop. Time is
//! passed in explicitly: [`WidgetSession::receive`] and [`WidgetSession::poll`]
//! take the current `Instant`, and [`WidgetSession::next_deadline`] tells the
//! loop when the pending initialization is due.

use crate::HostDelegate;
use crate::config::{AuthToken, LaunchTarget, SessionConfig};
use crate::diagnostics::{self, DiagnosticsSink, Direction, NullSink};
use crate::error::{BridgeError, Result};
use crate::exit::{ExitEvent, ExitSource, classify_exit};
use crate::handle::{Inbound, WidgetChannel, WidgetHandle};
use crate::protocol::{HostCommand, WidgetMessage};
use crate::theme::{CssSource, SoundOverride, ThemeCatalog, ThemePriority};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unready,
    ReadyAwaitingInit,
    Initializing,
    Initialized,
    Exited,
    Errored,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unready => "unready",
            Self::ReadyAwaitingInit => "ready_awaiting_init",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Exited => "exited",
            Self::Errored => "errored",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeOutcome {
    Sent,
    Undelivered,
    UnknownTheme,
}

/// Armed INITIALIZE. Re-arming replaces the slot, so only the latest one
/// can ever fire.
#[derive(Debug)]
struct PendingInit {
    generation: u64,
    deadline: Instant,
    command: HostCommand,
}

pub struct WidgetSession<H: HostDelegate> {
    sid: String,
    auth_token: AuthToken,
    auto_init: bool,
    debounce: Duration,
    target: Option<LaunchTarget>,
    state: SessionState,
    widget_ready: bool,
    disposed: bool,
    pending_init: Option<PendingInit>,
    next_generation: u64,
    handle: WidgetHandle,
    themes: Arc<ThemeCatalog>,
    current_theme: Option<String>,
    diagnostics: Box<dyn DiagnosticsSink>,
    host: H,
}

impl<H: HostDelegate> WidgetSession<H> {
    pub fn new(config: SessionConfig, themes: Arc<ThemeCatalog>, host: H) -> Self {
        let SessionConfig {
            sid,
            auth_token,
            target,
            auto_init,
            debounce,
        } = config;

        Self {
            sid,
            auth_token,
            auto_init,
            debounce,
            target: Some(target),
            state: SessionState::Unready,
            widget_ready: false,
            disposed: false,
            pending_init: None,
            next_generation: 0,
            handle: WidgetHandle::new(),
            themes,
            current_theme: None,
            diagnostics: Box::new(NullSink),
            host,
        }
    }

    pub fn with_diagnostics(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_widget_ready(&self) -> bool {
        self.widget_ready
    }

    pub fn target(&self) -> Option<&LaunchTarget> {
        self.target.as_ref()
    }

    pub fn current_theme(&self) -> Option<&str> {
        self.current_theme.as_deref()
    }

    pub fn has_pending_init(&self) -> bool {
        self.pending_init.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_init.as_ref().map(|pending| pending.deadline)
    }

    pub fn handle(&self) -> &WidgetHandle {
        &self.handle
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn attach(&mut self, channel: Box<dyn WidgetChannel>) {
        if self.disposed {
            warn!(sid = %self.sid, "attach after dispose ignored");
            return;
        }

        if self.handle.attach(channel) {
            info!(sid = %self.sid, "widget channel replaced");
        }
        self.note(Direction::Note, "CHANNEL_ATTACHED", "");

        if self.state == SessionState::Unready {
            self.set_state(SessionState::ReadyAwaitingInit);
        }
    }

    /// Changes what the next INITIALIZE opens. An already armed INITIALIZE
    /// keeps the target it was armed with.
    pub fn set_launch_target(&mut self, target: LaunchTarget) {
        debug!(sid = %self.sid, ?target, "launch target set");
        self.target = Some(target);
    }

    pub fn clear_launch_target(&mut self) {
        self.target = None;
    }

    /// Single dispatch point for everything the widget sends.
    pub fn receive(&mut self, inbound: impl Into<Inbound>, now: Instant) {
        let inbound = inbound.into();

        if self.disposed {
            debug!(sid = %self.sid, "message after dispose ignored");
            return;
        }

        let raw = inbound.describe();
        let envelope = match inbound.into_envelope() {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(sid = %self.sid, "discarding widget message: {err}");
                self.note(Direction::Note, "MALFORMED_ENVELOPE", format!("{err}: {raw}"));
                return;
            }
        };

        debug!(sid = %self.sid, kind = %envelope.kind, "widget message");
        self.note(Direction::Inbound, &envelope.kind, raw);
        self.dispatch(WidgetMessage::from_envelope(envelope), now);
    }

    fn dispatch(&mut self, message: WidgetMessage, now: Instant) {
        match message {
            WidgetMessage::RequestInitialization => self.on_request_initialization(now),
            WidgetMessage::InitializationComplete { config } => {
                self.on_initialization_complete(config)
            }
            WidgetMessage::InitializationError { message } => {
                self.on_initialization_error(message)
            }
            WidgetMessage::ExitRequested(event) => self.finish(event),
            WidgetMessage::CustomCssApplied { detail } => {
                info!(sid = %self.sid, theme = ?self.current_theme, "custom css applied");
                self.host.theme_applied(&detail);
            }
            WidgetMessage::CustomCssError { error } => {
                let err = BridgeError::ThemeApplication { error };
                error!(sid = %self.sid, "{err}");
                self.host.theme_failed(&err);
            }
            WidgetMessage::CustomSoundsLoaded { detail } => {
                info!(sid = %self.sid, "custom sounds loaded");
                self.host.sounds_loaded(&detail);
            }
            WidgetMessage::CustomSoundsError { error } => {
                let err = BridgeError::SoundsApplication { error };
                error!(sid = %self.sid, "{err}");
                self.host.sounds_failed(&err);
            }
            WidgetMessage::OpenUrl { url: Some(url) } => {
                info!(sid = %self.sid, %url, "widget requested url");
                self.host.open_url(&url);
            }
            WidgetMessage::OpenUrl { url: None } => {
                warn!(sid = %self.sid, "OPEN_URL without a url ignored");
            }
            WidgetMessage::PlaySound { sound } => {
                debug!(sid = %self.sid, %sound, "widget requested sound");
                self.host.play_sound(&sound);
            }
            WidgetMessage::NavigationComplete { url } => {
                debug!(sid = %self.sid, url = ?url, "widget navigation complete");
                self.host.navigation_complete(url.as_deref());
            }
            WidgetMessage::Error { detail } => {
                error!(sid = %self.sid, %detail, "widget reported an error");
                self.host.widget_error(&detail);
            }
            WidgetMessage::Unknown { kind, payload } => {
                if looks_exit_related(&kind) {
                    info!(sid = %self.sid, %kind, ?payload, "potential exit message not handled");
                } else {
                    debug!(sid = %self.sid, %kind, "unhandled widget message type");
                }
            }
        }
    }

    fn on_request_initialization(&mut self, now: Instant) {
        match self.state {
            SessionState::Unready => {
                warn!(sid = %self.sid, "readiness signal before channel attach ignored");
                return;
            }
            SessionState::Initialized | SessionState::Exited | SessionState::Errored => {
                debug!(sid = %self.sid, state = %self.state, "readiness signal ignored");
                return;
            }
            SessionState::ReadyAwaitingInit | SessionState::Initializing => {}
        }

        if !self.widget_ready {
            self.widget_ready = true;
            self.host.widget_ready();
        }

        if !self.auto_init {
            debug!(sid = %self.sid, "widget ready; waiting for host to initialize");
            return;
        }

        let Some(target) = self.target.clone() else {
            info!(sid = %self.sid, "no launch target; initialization not armed");
            return;
        };

        self.arm_init(target, now);
        if self.state == SessionState::ReadyAwaitingInit {
            self.set_state(SessionState::Initializing);
        }
    }

    fn arm_init(&mut self, target: LaunchTarget, now: Instant) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let pending = PendingInit {
            generation,
            deadline: now + self.debounce,
            command: HostCommand::Initialize {
                auth_token: self.auth_token.clone(),
                target,
            },
        };

        match self.pending_init.replace(pending) {
            Some(previous) => debug!(
                sid = %self.sid,
                superseded = previous.generation,
                generation,
                "initialize re-armed"
            ),
            None => debug!(sid = %self.sid, generation, "initialize armed"),
        }
    }

    fn cancel_pending_init(&mut self) {
        if let Some(pending) = self.pending_init.take() {
            debug!(sid = %self.sid, generation = pending.generation, "pending initialize cancelled");
        }
    }

    /// Fires the pending INITIALIZE once its debounce window has passed.
    /// Returns true when a command went out.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = self
            .pending_init
            .as_ref()
            .is_some_and(|pending| pending.deadline <= now);
        if !due {
            return false;
        }

        let Some(pending) = self.pending_init.take() else {
            return false;
        };

        if self.state != SessionState::Initializing || self.disposed {
            debug!(sid = %self.sid, state = %self.state, "stale initialize dropped");
            return false;
        }

        info!(sid = %self.sid, generation = pending.generation, "sending INITIALIZE");
        self.send(&pending.command)
    }

    /// Host-triggered initialization for sessions that do not auto-init.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != SessionState::ReadyAwaitingInit || self.disposed {
            warn!(sid = %self.sid, state = %self.state, "initialize rejected");
            return Err(BridgeError::NotReady {
                operation: "initialize",
                state: self.state,
            });
        }

        let target = self.target.clone().ok_or(BridgeError::MissingLaunchTarget)?;

        self.cancel_pending_init();
        self.set_state(SessionState::Initializing);
        let command = HostCommand::Initialize {
            auth_token: self.auth_token.clone(),
            target,
        };
        self.send(&command);
        Ok(())
    }

    fn on_initialization_complete(&mut self, config: Value) {
        if self.state != SessionState::Initializing {
            warn!(sid = %self.sid, state = %self.state, "INITIALIZATION_COMPLETE ignored");
            return;
        }

        self.cancel_pending_init();
        self.set_state(SessionState::Initialized);
        self.host.initialized(&config);
    }

    fn on_initialization_error(&mut self, message: String) {
        if self.state != SessionState::Initializing {
            warn!(sid = %self.sid, state = %self.state, %message, "INITIALIZATION_ERROR ignored");
            return;
        }

        self.cancel_pending_init();
        self.target = None;
        self.set_state(SessionState::Errored);

        let err = BridgeError::Initialization { message };
        error!(sid = %self.sid, "{err}");
        self.host.initialization_failed(&err);
    }

    /// Host-side exit (e.g. its own back button), handled like EXIT_REQUESTED.
    pub fn close(&mut self, source: ExitSource) {
        self.note(Direction::Note, "HOST_EXIT", source.to_string());
        self.finish(ExitEvent::new(source));
    }

    fn finish(&mut self, event: ExitEvent) {
        if self.state == SessionState::Exited {
            debug!(sid = %self.sid, "duplicate exit ignored");
            return;
        }

        self.cancel_pending_init();
        let outcome = classify_exit(event, self.target.take());
        self.set_state(SessionState::Exited);

        if outcome.is_completion() {
            info!(sid = %self.sid, target = ?outcome.target(), "widget completed");
        } else {
            info!(
                sid = %self.sid,
                source = %outcome.event().source,
                target = ?outcome.target(),
                "widget exited early"
            );
        }
        self.host.exited(&outcome);
    }

    /// Looks up `name` in the catalog and sends it as inline css. Unknown
    /// names are a no-op.
    pub fn apply_theme(&mut self, name: &str) -> Result<ThemeOutcome> {
        self.require_initialized("apply_theme")?;

        let Some(theme) = self.themes.get(name).cloned() else {
            info!(sid = %self.sid, theme = name, "unknown theme; nothing applied");
            return Ok(ThemeOutcome::UnknownTheme);
        };

        let command = HostCommand::CustomCss {
            source: theme.css_source(),
            priority: theme.priority,
        };
        if !self.send(&command) {
            return Ok(ThemeOutcome::Undelivered);
        }

        info!(sid = %self.sid, theme = name, "theme sent");
        self.current_theme = Some(theme.name);
        Ok(ThemeOutcome::Sent)
    }

    pub fn set_custom_css(&mut self, source: CssSource, priority: ThemePriority) -> Result<bool> {
        self.require_initialized("set_custom_css")?;
        Ok(self.send(&HostCommand::CustomCss { source, priority }))
    }

    pub fn set_custom_sounds(&mut self, sounds: Vec<SoundOverride>) -> Result<bool> {
        self.require_initialized("set_custom_sounds")?;
        Ok(self.send(&HostCommand::CustomSounds { sounds }))
    }

    /// Cancels the pending initialization and releases the channel.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.cancel_pending_init();
        self.handle.dispose();
        self.disposed = true;
        debug!(sid = %self.sid, state = %self.state, "session disposed");
    }

    /// Disposes the session and hands back the host delegate.
    pub fn into_host(mut self) -> H {
        self.dispose();
        self.host
    }

    fn require_initialized(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Initialized && !self.disposed {
            return Ok(());
        }
        warn!(sid = %self.sid, state = %self.state, operation, "command rejected before initialization");
        Err(BridgeError::NotReady {
            operation,
            state: self.state,
        })
    }

    fn send(&mut self, command: &HostCommand) -> bool {
        let detail = command
            .to_redacted_envelope()
            .and_then(|envelope| envelope.to_text())
            .unwrap_or_else(|err| err.to_string());
        self.note(Direction::Outbound, command.kind(), detail);
        self.handle.send(command)
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        info!(sid = %self.sid, from = %self.state, to = %next, "session state changed");
        self.state = next;
    }

    fn note(&mut self, direction: Direction, kind: &str, detail: impl Into<String>) {
        self.diagnostics
            .record(diagnostics::entry(direction, kind, detail));
    }
}

fn looks_exit_related(kind: &str) -> bool {
    let lower = kind.to_ascii_lowercase();
    ["exit", "close", "complete", "finish", "back", "end"]
        .iter()
        .any(|hint| lower.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SharedEventLog;
    use crate::handle::ElementChannel;
    use crate::protocol::Envelope;
    use serde_json::json;
    use std::sync::mpsc::{self, Receiver};

    #[derive(Default)]
    struct Events {
        ready: usize,
        widget_errors: Vec<Value>,
        urls: Vec<String>,
        sounds_loaded: usize,
        sound_errors: Vec<String>,
        sounds_played: Vec<Value>,
        navigations: Vec<Option<String>>,
    }

    impl HostDelegate for Events {
        fn widget_ready(&mut self) {
            self.ready += 1;
        }

        fn sounds_loaded(&mut self, _detail: &Value) {
            self.sounds_loaded += 1;
        }

        fn sounds_failed(&mut self, error: &BridgeError) {
            self.sound_errors.push(error.to_string());
        }

        fn play_sound(&mut self, sound: &Value) {
            self.sounds_played.push(sound.clone());
        }

        fn navigation_complete(&mut self, url: Option<&str>) {
            self.navigations.push(url.map(str::to_string));
        }

        fn open_url(&mut self, url: &str) {
            self.urls.push(url.to_string());
        }

        fn widget_error(&mut self, detail: &Value) {
            self.widget_errors.push(detail.clone());
        }
    }

    fn session(auto_init: bool) -> (WidgetSession<Events>, Receiver<Envelope>) {
        let config = SessionConfig::builder()
            .auth_token("tok")
            .auto_init(auto_init)
            .build()
            .expect("config builds");
        let mut session = WidgetSession::new(config, Arc::new(ThemeCatalog::builtin()), Events::default());
        let (tx, rx) = mpsc::channel();
        session.attach(Box::new(ElementChannel::new(tx)));
        (session, rx)
    }

    fn sent_kinds(rx: &Receiver<Envelope>) -> Vec<String> {
        rx.try_iter().map(|envelope| envelope.kind).collect()
    }

    #[test]
    fn attach_moves_session_to_ready() {
        let config = SessionConfig::builder().auth_token("tok").build().expect("config");
        let mut session = WidgetSession::new(config, Arc::new(ThemeCatalog::new()), ());
        assert_eq!(session.state(), SessionState::Unready);

        let (tx, _rx) = mpsc::channel();
        session.attach(Box::new(ElementChannel::new(tx)));
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
    }

    #[test]
    fn readiness_before_attach_is_ignored() {
        let config = SessionConfig::builder().auth_token("tok").build().expect("config");
        let mut session = WidgetSession::new(config, Arc::new(ThemeCatalog::new()), Events::default());

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, Instant::now());
        assert_eq!(session.state(), SessionState::Unready);
        assert!(!session.has_pending_init());
        assert_eq!(session.host().ready, 0);
    }

    #[test]
    fn deferred_session_waits_for_host() {
        let (mut session, rx) = session(false);
        let now = Instant::now();

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now);
        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now);
        assert!(session.is_widget_ready());
        assert_eq!(session.host().ready, 1);
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
        assert!(!session.poll(now + Duration::from_secs(1)));
        assert!(sent_kinds(&rx).is_empty());

        session.initialize().expect("host initialize");
        assert_eq!(session.state(), SessionState::Initializing);
        assert_eq!(sent_kinds(&rx), vec!["INITIALIZE"]);

        match session.initialize() {
            Err(BridgeError::NotReady { operation, state }) => {
                assert_eq!(operation, "initialize");
                assert_eq!(state, SessionState::Initializing);
            }
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[test]
    fn initialize_before_attach_is_rejected() {
        let config = SessionConfig::builder()
            .auth_token("tok")
            .auto_init(false)
            .build()
            .expect("config");
        let mut session = WidgetSession::new(config, Arc::new(ThemeCatalog::new()), ());
        assert!(matches!(session.initialize(), Err(BridgeError::NotReady { .. })));
    }

    #[test]
    fn initialize_without_target_is_rejected() {
        let (mut session, rx) = session(false);
        session.clear_launch_target();

        assert!(matches!(session.initialize(), Err(BridgeError::MissingLaunchTarget)));
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
        assert!(sent_kinds(&rx).is_empty());
    }

    #[test]
    fn auto_init_without_target_arms_nothing() {
        let (mut session, rx) = session(true);
        session.clear_launch_target();

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, Instant::now());
        assert!(!session.has_pending_init());
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
        assert!(sent_kinds(&rx).is_empty());
    }

    #[test]
    fn poll_waits_for_debounce_deadline() {
        let (mut session, rx) = session(true);
        let now = Instant::now();

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now);
        assert_eq!(session.next_deadline(), Some(now + Duration::from_millis(100)));
        assert!(!session.poll(now + Duration::from_millis(99)));
        assert!(session.poll(now + Duration::from_millis(100)));
        assert!(!session.poll(now + Duration::from_millis(500)));
        assert_eq!(sent_kinds(&rx), vec!["INITIALIZE"]);
    }

    #[test]
    fn completion_outside_initializing_is_ignored() {
        let (mut session, _rx) = session(false);
        session.receive(r#"{"type":"INITIALIZATION_COMPLETE"}"#, Instant::now());
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
    }

    #[test]
    fn readiness_after_initialized_does_not_reinitialize() {
        let (mut session, rx) = session(true);
        let now = Instant::now();

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now);
        session.poll(now + Duration::from_millis(100));
        session.receive(r#"{"type":"INITIALIZATION_COMPLETE","payload":{"config":{}}}"#, now);
        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now + Duration::from_secs(1));

        assert!(!session.has_pending_init());
        assert_eq!(session.state(), SessionState::Initialized);
        assert_eq!(sent_kinds(&rx), vec!["INITIALIZE"]);
    }

    #[test]
    fn custom_css_and_sounds_require_initialized() {
        let (mut session, rx) = session(false);

        assert!(session
            .set_custom_css(CssSource::Url("https://cdn.test/a.css".into()), ThemePriority::Url)
            .is_err());
        assert!(session.set_custom_sounds(Vec::new()).is_err());
        assert!(sent_kinds(&rx).is_empty());

        session.initialize().expect("initialize");
        session.receive(r#"{"type":"INITIALIZATION_COMPLETE"}"#, Instant::now());
        assert!(session
            .set_custom_css(CssSource::Url("https://cdn.test/a.css".into()), ThemePriority::Url)
            .expect("css by url"));
        assert!(session
            .set_custom_sounds(crate::theme::sound_preset("muted").expect("preset"))
            .expect("sounds"));

        let sent: Vec<Envelope> = rx.try_iter().collect();
        assert_eq!(sent[1].kind, "CUSTOM_CSS");
        assert_eq!(
            sent[1].payload,
            Some(json!({ "css": null, "url": "https://cdn.test/a.css", "priority": "url" }))
        );
        assert_eq!(sent[2].kind, "CUSTOM_SOUNDS");
    }

    #[test]
    fn passive_messages_reach_the_host_without_state_change() {
        let (mut session, _rx) = session(false);
        let now = Instant::now();

        session.receive(r#"{"type":"OPEN_URL","payload":{"url":"https://example.com"}}"#, now);
        session.receive(r#"{"type":"OPEN_URL"}"#, now);
        session.receive(r#"{"type":"ERROR","payload":{"message":"boom"}}"#, now);
        session.receive(r#"{"type":"MODULE_FINISHED","payload":{}}"#, now);

        assert_eq!(session.host().urls, vec!["https://example.com".to_string()]);
        assert_eq!(session.host().widget_errors, vec![json!({ "message": "boom" })]);
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
    }

    #[test]
    fn sound_and_navigation_messages_reach_the_host() {
        let (mut session, rx) = session(false);
        let now = Instant::now();

        session.receive(r#"{"type":"CUSTOM_SOUNDS_LOADED","payload":{"count":2}}"#, now);
        session.receive(r#"{"type":"CUSTOM_SOUNDS_ERROR","payload":{"error":"bad mp3"}}"#, now);
        session.receive(r#"{"type":"PLAY_SOUND","payload":{"sound":"ding"}}"#, now);
        session.receive(r#"{"type":"NAVIGATION_COMPLETE","payload":{"url":"/x"}}"#, now);
        session.receive(r#"{"type":"NAVIGATION_COMPLETE"}"#, now);

        let host = session.host();
        assert_eq!(host.sounds_loaded, 1);
        assert_eq!(host.sound_errors, vec!["widget failed to load sounds: bad mp3".to_string()]);
        assert_eq!(host.sounds_played, vec![json!("ding")]);
        assert_eq!(host.navigations, vec![Some("/x".to_string()), None]);
        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
        assert!(sent_kinds(&rx).is_empty());
    }

    #[test]
    fn malformed_traffic_is_logged_not_dispatched() {
        let log = SharedEventLog::default();
        let (session, _rx) = session(true);
        let mut session = session.with_diagnostics(log.clone());

        session.receive("definitely not json", Instant::now());
        session.receive(Envelope::new("", None), Instant::now());

        assert_eq!(session.state(), SessionState::ReadyAwaitingInit);
        let snapshot = log.snapshot();
        assert_eq!(
            snapshot.kinds(Direction::Note),
            vec!["MALFORMED_ENVELOPE", "MALFORMED_ENVELOPE"]
        );
        assert!(snapshot.kinds(Direction::Inbound).is_empty());
    }

    #[test]
    fn outbound_diagnostics_never_carry_the_token() {
        let log = SharedEventLog::default();
        let (session, _rx) = session(false);
        let mut session = session.with_diagnostics(log.clone());

        session.initialize().expect("initialize");

        let snapshot = log.snapshot();
        let outbound: Vec<_> = snapshot
            .entries()
            .filter(|entry| entry.direction == Direction::Outbound)
            .collect();
        assert_eq!(outbound.len(), 1);
        assert!(!outbound[0].detail.contains("\"tok\""));
        assert!(outbound[0].detail.contains("[redacted]"));
    }

    #[test]
    fn dispose_cancels_timer_and_detaches() {
        let (mut session, rx) = session(true);
        let now = Instant::now();

        session.receive(r#"{"type":"REQUEST_INITIALIZATION"}"#, now);
        session.dispose();

        assert!(!session.has_pending_init());
        assert!(!session.handle().is_attached());
        assert!(!session.poll(now + Duration::from_secs(1)));
        session.receive(r#"{"type":"INITIALIZATION_COMPLETE"}"#, now);
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(sent_kinds(&rx).is_empty());
    }

    #[test]
    fn host_close_is_an_early_exit() {
        let (mut session, _rx) = session(true);
        session.close(ExitSource::BackButton);

        assert_eq!(session.state(), SessionState::Exited);
        assert!(session.target().is_none());
    }

    #[test]
    fn exit_related_names_are_detected() {
        assert!(looks_exit_related("WIDGET_CLOSED"));
        assert!(looks_exit_related("moduleFinished"));
        assert!(!looks_exit_related("SCORE_UPDATED"));
    }
}
