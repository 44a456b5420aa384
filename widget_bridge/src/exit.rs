//! Exit classification and host-side completion bookkeeping.

use crate::config::{DeepLinkTarget, LaunchTarget};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSource {
    EndOfModule,
    BackButton,
    ExitButton,
    Other(String),
    Unspecified,
}

impl ExitSource {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("end_of_module") => Self::EndOfModule,
            Some("back_button") => Self::BackButton,
            Some("exit_button") => Self::ExitButton,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Unspecified,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Self::EndOfModule)
    }
}

impl fmt::Display for ExitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfModule => f.write_str("end_of_module"),
            Self::BackButton => f.write_str("back_button"),
            Self::ExitButton => f.write_str("exit_button"),
            Self::Other(other) => f.write_str(other),
            Self::Unspecified => f.write_str("<unspecified>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitEvent {
    pub source: ExitSource,
    pub extra: Map<String, Value>,
}

impl ExitEvent {
    pub fn new(source: ExitSource) -> Self {
        Self {
            source,
            extra: Map::new(),
        }
    }

    /// Any payload shape is accepted; only a string `source` is interpreted.
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = payload else {
            return Self::new(ExitSource::Unspecified);
        };

        let mut extra = map.clone();
        let source = match extra.remove("source") {
            Some(Value::String(source)) => ExitSource::parse(Some(&source)),
            _ => ExitSource::Unspecified,
        };

        Self { source, extra }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    Completed {
        target: Option<LaunchTarget>,
        event: ExitEvent,
    },
    EarlyExit {
        target: Option<LaunchTarget>,
        event: ExitEvent,
    },
}

impl ExitOutcome {
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn target(&self) -> Option<&LaunchTarget> {
        match self {
            Self::Completed { target, .. } | Self::EarlyExit { target, .. } => target.as_ref(),
        }
    }

    pub fn event(&self) -> &ExitEvent {
        match self {
            Self::Completed { event, .. } | Self::EarlyExit { event, .. } => event,
        }
    }

    pub fn completed_deep_link(&self) -> Option<&DeepLinkTarget> {
        match self {
            Self::Completed { target, .. } => target.as_ref().and_then(LaunchTarget::deep_link),
            Self::EarlyExit { .. } => None,
        }
    }
}

/// Only `end_of_module` counts as completion; every other source, known or
/// not, is an early exit.
pub fn classify_exit(event: ExitEvent, target: Option<LaunchTarget>) -> ExitOutcome {
    if event.source.is_completion() {
        ExitOutcome::Completed { target, event }
    } else {
        ExitOutcome::EarlyExit { target, event }
    }
}

/// Host-owned record of finished modules and skills.
#[derive(Debug, Clone, Default)]
pub struct CompletionLedger {
    modules: BTreeSet<String>,
    skills: BTreeSet<String>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the target when this outcome completed something new.
    pub fn record(&mut self, outcome: &ExitOutcome) -> Option<DeepLinkTarget> {
        let target = outcome.completed_deep_link()?;
        let inserted = match target {
            DeepLinkTarget::Module(id) => self.modules.insert(id.clone()),
            DeepLinkTarget::Skill(id) => self.skills.insert(id.clone()),
        };
        inserted.then(|| target.clone())
    }

    pub fn is_completed(&self, target: &DeepLinkTarget) -> bool {
        match target {
            DeepLinkTarget::Module(id) => self.modules.contains(id),
            DeepLinkTarget::Skill(id) => self.skills.contains(id),
        }
    }

    pub fn completed_modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    pub fn completed_skills(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len() + self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of `total` targets completed, clamped to `0.0..=1.0`.
    pub fn progress(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (self.len() as f64 / total as f64).min(1.0)
    }
}
