use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn css_class(&self) -> &'static str {
        match self {
            NoticeKind::Success => "notice success",
            NoticeKind::Error => "notice error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    expires_at: Instant,
}

/// Toast-style messages that disappear after a fixed lifetime.
#[derive(Debug, Clone)]
pub struct Notices {
    ttl: Duration,
    items: Vec<Notice>,
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.push_at(kind, text, Instant::now());
    }

    pub fn error(&mut self, error: impl std::fmt::Display) {
        self.push(NoticeKind::Error, error.to_string());
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(NoticeKind::Success, text);
    }

    fn push_at(&mut self, kind: NoticeKind, text: impl Into<String>, now: Instant) {
        self.items.push(Notice {
            kind,
            text: text.into(),
            expires_at: now + self.ttl,
        });
    }

    /// Notices still visible at `now`; expired ones are dropped.
    pub fn active(&mut self, now: Instant) -> &[Notice] {
        self.items.retain(|n| n.expires_at > now);
        &self.items
    }

    /// Drop everything, e.g. when the page owning them goes away.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_expire() {
        let mut notices = Notices::new(Duration::from_millis(3000));
        let start = Instant::now();
        notices.push_at(NoticeKind::Error, "team is full", start);
        notices.push_at(NoticeKind::Success, "saved", start + Duration::from_millis(2000));

        assert_eq!(notices.active(start + Duration::from_millis(1000)).len(), 2);
        let left = notices.active(start + Duration::from_millis(3500));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "saved");
        assert!(notices.active(start + Duration::from_millis(6000)).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut notices = Notices::new(Duration::from_secs(3));
        notices.error("boom");
        notices.clear();
        assert!(notices.active(Instant::now()).is_empty());
    }
}
