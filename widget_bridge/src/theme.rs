//! Theme catalog and the custom css / sound payload shapes.

use crate::error::{BridgeError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePriority {
    Inline,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub display_name: String,
    pub css: String,
    pub priority: ThemePriority,
}

impl Theme {
    pub fn inline(name: &str, display_name: &str, css: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            css: css.to_string(),
            priority: ThemePriority::Inline,
        }
    }

    pub fn css_source(&self) -> CssSource {
        CssSource::Inline(self.css.clone())
    }
}

/// Where the widget should take its stylesheet from. One per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssSource {
    Inline(String),
    Url(String),
}

impl CssSource {
    /// Accepts the loose `(css, url)` pair used by the element api and
    /// requires exactly one side to be set.
    pub fn from_parts(css: Option<String>, url: Option<String>) -> Result<Self> {
        match (css, url) {
            (Some(css), None) => Ok(Self::Inline(css)),
            (None, Some(url)) if !url.trim().is_empty() => Ok(Self::Url(url)),
            (None, Some(_)) => Err(BridgeError::InvalidCss("css url is empty".to_string())),
            (Some(_), Some(_)) => Err(BridgeError::InvalidCss(
                "css and url are mutually exclusive".to_string(),
            )),
            (None, None) => Err(BridgeError::InvalidCss(
                "either css or url must be set".to_string(),
            )),
        }
    }
}

/// Read-only set of host themes shared by every session.
#[derive(Debug, Clone, Default)]
pub struct ThemeCatalog {
    themes: BTreeMap<String, Theme>,
}

impl ThemeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.themes.insert(theme.name.clone(), theme);
        self
    }

    /// `default` (no custom css), `light` and `dark`.
    pub fn builtin() -> Self {
        Self::new()
            .with_theme(Theme::inline("default", "Default", ""))
            .with_theme(Theme::inline("light", "Light Mode", LIGHT_CSS))
            .with_theme(Theme::inline("dark", "Dark Mode", DARK_CSS))
    }

    pub fn get(&self, name: &str) -> Option<&Theme> {
        self.themes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.themes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundOverride {
    pub name: String,
    pub url: String,
}

impl SoundOverride {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Named sound configurations. An empty url mutes that sound.
pub fn sound_preset(preset: &str) -> Option<Vec<SoundOverride>> {
    match preset {
        "muted" => Some(
            ["achievement", "notification", "error", "success"]
                .into_iter()
                .map(|name| SoundOverride::new(name, ""))
                .collect(),
        ),
        "custom" => Some(vec![
            SoundOverride::new(
                "achievement",
                "https://yourdomain.com/sounds/custom-achievement.mp3",
            ),
            SoundOverride::new(
                "notification",
                "https://yourdomain.com/sounds/custom-notification.mp3",
            ),
        ]),
        _ => None,
    }
}

const LIGHT_CSS: &str = r#"
:root {
  --brand-primary: #1c64f2;
  --tints-primary-1: #ebf5ff;
  --shades-primary-1: #233876;
  --neutral-white: #ffffff;
  --neutral-100: #f6f6f6;
  --neutral-800: #313131;
}

body {
  background-color: var(--neutral-white) !important;
  color: var(--neutral-800) !important;
}
"#;

const DARK_CSS: &str = r#"
:root {
  --brand-primary: #76a9fa;
  --tints-primary-1: #1a223a;
  --shades-primary-1: #c3ddfd;
  --neutral-white: #1a1a1a;
  --neutral-100: #242424;
  --neutral-200: #2d2d2d;
  --neutral-300: #3a3a3a;
  --neutral-800: #f6f6f6;
}

body {
  background-color: var(--neutral-white) !important;
  color: var(--neutral-800) !important;
}

.card, .module-card {
  background-color: var(--neutral-200) !important;
  border-color: var(--neutral-300) !important;
}
"#;
