use foundation::time::Time;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient, dismissible message for the user.
///
/// `kind` is a stable machine-readable tag; `message` is display text.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub at: Time,
    pub level: NoticeLevel,
    pub kind: &'static str,
    pub message: String,
}

/// Collects notices until the host drains and displays them.
#[derive(Debug, Default)]
pub struct NoticeBus {
    notices: Vec<Notice>,
}

impl NoticeBus {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
        }
    }

    pub fn emit(
        &mut self,
        at: Time,
        level: NoticeLevel,
        kind: &'static str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        tracing::debug!(kind, %message, "notice");
        self.notices.push(Notice {
            at,
            level,
            kind,
            message,
        });
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.notices.iter().filter(|n| n.kind == kind).count()
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

#[cfg(test)]
mod tests {
    use super::{NoticeBus, NoticeLevel};
    use foundation::time::Time;

    #[test]
    fn records_notices_with_time() {
        let mut bus = NoticeBus::new();
        bus.emit(Time(2.0), NoticeLevel::Info, "test", "hello");
        assert_eq!(bus.notices().len(), 1);
        assert_eq!(bus.notices()[0].at, Time(2.0));
        assert_eq!(bus.count_kind("test"), 1);
    }

    #[test]
    fn drain_clears_notices() {
        let mut bus = NoticeBus::new();
        bus.emit(Time(0.0), NoticeLevel::Error, "k", "m");
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.notices().is_empty());
    }
}
