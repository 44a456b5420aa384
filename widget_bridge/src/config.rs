//! Session and host configuration.
//!
//! A [`SessionConfig`] is handed to each [`WidgetSession`](crate::WidgetSession)
//! at construction; the bridge keeps no process-wide token state. The host
//! binary builds its [`HostConfig`] from `WIDGET_*` environment variables.

use crate::error::{BridgeError, Result};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_INIT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;
pub const DEFAULT_SID: &str = "W1";

/// Opaque user token. Held in memory only and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(BridgeError::Config("auth token is empty".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([redacted])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    FullExperience,
    DeepLink,
}

impl WidgetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullExperience => "full_experience",
            Self::DeepLink => "deep_link",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "full_experience" => Ok(Self::FullExperience),
            "deep_link" => Ok(Self::DeepLink),
            other => Err(BridgeError::Config(format!("unknown widget type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeepLinkTarget {
    Module(String),
    Skill(String),
}

impl DeepLinkTarget {
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::Module(id) => Some(id),
            Self::Skill(_) => None,
        }
    }

    pub fn skill_id(&self) -> Option<&str> {
        match self {
            Self::Skill(id) => Some(id),
            Self::Module(_) => None,
        }
    }
}

impl fmt::Display for DeepLinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(id) => write!(f, "module {id}"),
            Self::Skill(id) => write!(f, "skill {id}"),
        }
    }
}

/// What the widget should open once initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    FullExperience,
    DeepLink(DeepLinkTarget),
}

impl LaunchTarget {
    pub fn module(id: impl Into<String>) -> Self {
        Self::DeepLink(DeepLinkTarget::Module(id.into()))
    }

    pub fn skill(id: impl Into<String>) -> Self {
        Self::DeepLink(DeepLinkTarget::Skill(id.into()))
    }

    pub fn widget_type(&self) -> WidgetType {
        match self {
            Self::FullExperience => WidgetType::FullExperience,
            Self::DeepLink(_) => WidgetType::DeepLink,
        }
    }

    pub fn deep_link(&self) -> Option<&DeepLinkTarget> {
        match self {
            Self::FullExperience => None,
            Self::DeepLink(target) => Some(target),
        }
    }

    /// Builds a target from the loose `{widget_type, module_id?, skill_id?}`
    /// shape. Deep links need exactly one id; full experience takes none.
    pub fn from_parts(
        widget_type: WidgetType,
        module_id: Option<String>,
        skill_id: Option<String>,
    ) -> Result<Self> {
        let module_id = module_id.filter(|id| !id.trim().is_empty());
        let skill_id = skill_id.filter(|id| !id.trim().is_empty());

        match (widget_type, module_id, skill_id) {
            (WidgetType::FullExperience, None, None) => Ok(Self::FullExperience),
            (WidgetType::FullExperience, _, _) => Err(BridgeError::Config(
                "full_experience does not take a module or skill id".to_string(),
            )),
            (WidgetType::DeepLink, Some(module_id), None) => Ok(Self::module(module_id)),
            (WidgetType::DeepLink, None, Some(skill_id)) => Ok(Self::skill(skill_id)),
            (WidgetType::DeepLink, Some(_), Some(_)) => Err(BridgeError::Config(
                "deep_link takes either a module id or a skill id, not both".to_string(),
            )),
            (WidgetType::DeepLink, None, None) => Err(BridgeError::Config(
                "deep_link requires a module id or a skill id".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sid: String,
    pub auth_token: AuthToken,
    pub target: LaunchTarget,
    pub auto_init: bool,
    pub debounce: Duration,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sid: Option<String>,
    auth_token: Option<String>,
    target: Option<LaunchTarget>,
    auto_init: Option<bool>,
    debounce: Option<Duration>,
}

impl SessionConfigBuilder {
    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn target(mut self, target: LaunchTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn auto_init(mut self, auto_init: bool) -> Self {
        self.auto_init = Some(auto_init);
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn build(self) -> Result<SessionConfig> {
        let auth_token = self
            .auth_token
            .ok_or_else(|| BridgeError::Config("auth token is required".to_string()))
            .and_then(AuthToken::new)?;

        Ok(SessionConfig {
            sid: self
                .sid
                .filter(|sid| !sid.is_empty())
                .unwrap_or_else(|| DEFAULT_SID.to_string()),
            auth_token,
            target: self.target.unwrap_or(LaunchTarget::FullExperience),
            auto_init: self.auto_init.unwrap_or(true),
            debounce: self.debounce.unwrap_or(DEFAULT_INIT_DEBOUNCE),
        })
    }
}

/// Settings for the stdio host binary.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub session: SessionConfig,
    pub theme: Option<String>,
    pub manual_init_delay: Duration,
    pub outbound_queue_cap: usize,
}

impl HostConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let widget_type = match lookup("WIDGET_TYPE") {
            Some(raw) if !raw.trim().is_empty() => WidgetType::parse(&raw)?,
            _ => WidgetType::FullExperience,
        };
        let target = LaunchTarget::from_parts(
            widget_type,
            lookup("WIDGET_MODULE_ID"),
            lookup("WIDGET_SKILL_ID"),
        )?;

        let mut builder = SessionConfig::builder()
            .auth_token(lookup("WIDGET_AUTH_TOKEN").unwrap_or_default())
            .target(target);

        if let Some(sid) = lookup("WIDGET_SID") {
            builder = builder.sid(sid);
        }
        if let Some(raw) = lookup("WIDGET_AUTO_INIT") {
            builder = builder.auto_init(parse_flag("WIDGET_AUTO_INIT", &raw)?);
        }
        if let Some(raw) = lookup("WIDGET_INIT_DEBOUNCE_MS") {
            builder = builder.debounce(parse_millis("WIDGET_INIT_DEBOUNCE_MS", &raw)?);
        }

        let manual_init_delay = match lookup("WIDGET_MANUAL_INIT_DELAY_MS") {
            Some(raw) => parse_millis("WIDGET_MANUAL_INIT_DELAY_MS", &raw)?,
            None => Duration::ZERO,
        };

        let outbound_queue_cap = lookup("WIDGET_OUTBOUND_QUEUE_CAP")
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAP);

        Ok(Self {
            session: builder.build()?,
            theme: lookup("WIDGET_THEME").filter(|name| !name.is_empty()),
            manual_init_delay,
            outbound_queue_cap,
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BridgeError::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| BridgeError::Config(format!("{key}: expected milliseconds, got '{raw}'")))
}
