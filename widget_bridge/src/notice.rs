use std::time::{Duration, Instant};

pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Short-lived status line shown after an acknowledgement arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotice {
    pub text: String,
    pub kind: NoticeKind,
    shown_at: Instant,
}

impl StatusNotice {
    pub fn success(text: impl Into<String>, now: Instant) -> Self {
        Self {
            text: text.into(),
            kind: NoticeKind::Success,
            shown_at: now,
        }
    }

    pub fn error(text: impl Into<String>, now: Instant) -> Self {
        Self {
            text: text.into(),
            kind: NoticeKind::Error,
            shown_at: now,
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) < NOTICE_TTL
    }
}

/// Holds at most one notice; a newer one replaces the old.
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    current: Option<StatusNotice>,
}

impl NoticeBoard {
    pub fn show(&mut self, notice: StatusNotice) {
        self.current = Some(notice);
    }

    pub fn visible(&mut self, now: Instant) -> Option<&StatusNotice> {
        if self
            .current
            .as_ref()
            .is_some_and(|notice| !notice.is_visible(now))
        {
            self.current = None;
        }
        self.current.as_ref()
    }
}
