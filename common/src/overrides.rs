use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    Drying,
    Pause,
}

impl OverrideKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drying => "DRYING",
            Self::Pause => "PAUSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrideWindow {
    pub started_ms: u64,
    pub end_ms: Option<u64>,
    pub active: bool,
}

impl OverrideWindow {
    pub fn is_active_at(&self, now_ms: u64) -> bool {
        self.active && self.end_ms.map(|end| now_ms < end).unwrap_or(false)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.end_ms {
            Some(end) if self.active => end.saturating_sub(now_ms),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideError {
    NonPositiveDuration,
    TooLong { max_ms: u64 },
}

/// DRYING and PAUSE windows. The two are tracked independently and may be
/// active at the same time.
#[derive(Debug, Clone, Default)]
pub struct OverrideTimers {
    drying: OverrideWindow,
    pause: OverrideWindow,
    max_duration_ms: u64,
}

impl OverrideTimers {
    pub fn new(max_duration_ms: u64) -> Self {
        Self {
            drying: OverrideWindow::default(),
            pause: OverrideWindow::default(),
            max_duration_ms,
        }
    }

    pub fn window(&self, kind: OverrideKind) -> &OverrideWindow {
        match kind {
            OverrideKind::Drying => &self.drying,
            OverrideKind::Pause => &self.pause,
        }
    }

    fn window_mut(&mut self, kind: OverrideKind) -> &mut OverrideWindow {
        match kind {
            OverrideKind::Drying => &mut self.drying,
            OverrideKind::Pause => &mut self.pause,
        }
    }

    /// Starts (or restarts) a window and returns its end time.
    pub fn start(
        &mut self,
        kind: OverrideKind,
        duration_ms: i64,
        now_ms: u64,
    ) -> Result<u64, OverrideError> {
        let Ok(duration_ms) = u64::try_from(duration_ms) else {
            return Err(OverrideError::NonPositiveDuration);
        };
        if duration_ms == 0 {
            return Err(OverrideError::NonPositiveDuration);
        }
        if duration_ms > self.max_duration_ms {
            return Err(OverrideError::TooLong {
                max_ms: self.max_duration_ms,
            });
        }

        let end_ms = now_ms.saturating_add(duration_ms);
        *self.window_mut(kind) = OverrideWindow {
            started_ms: now_ms,
            end_ms: Some(end_ms),
            active: true,
        };
        info!("{} override active for {duration_ms}ms", kind.as_str());
        Ok(end_ms)
    }

    pub fn clear(&mut self, kind: OverrideKind) -> bool {
        let window = self.window_mut(kind);
        let was_active = window.active;
        *window = OverrideWindow::default();
        was_active
    }

    /// Clears every window whose end time has been reached.
    pub fn tick(&mut self, now_ms: u64) -> Vec<OverrideKind> {
        let mut expired = Vec::new();
        for kind in [OverrideKind::Drying, OverrideKind::Pause] {
            let window = self.window(kind);
            if window.active && !window.is_active_at(now_ms) {
                self.clear(kind);
                info!("{} override expired", kind.as_str());
                expired.push(kind);
            }
        }
        expired
    }

    pub fn is_active(&self, kind: OverrideKind, now_ms: u64) -> bool {
        self.window(kind).is_active_at(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers() -> OverrideTimers {
        OverrideTimers::new(60 * 60_000)
    }

    #[test]
    fn rejects_non_positive_durations() {
        let mut timers = timers();
        assert_eq!(
            timers.start(OverrideKind::Drying, 0, 1_000),
            Err(OverrideError::NonPositiveDuration)
        );
        assert_eq!(
            timers.start(OverrideKind::Pause, -5, 1_000),
            Err(OverrideError::NonPositiveDuration)
        );
        assert!(!timers.is_active(OverrideKind::Drying, 1_000));
    }

    #[test]
    fn rejects_durations_over_limit() {
        let mut timers = timers();
        assert_eq!(
            timers.start(OverrideKind::Pause, 60 * 60_000 + 1, 0),
            Err(OverrideError::TooLong {
                max_ms: 60 * 60_000
            })
        );
    }

    #[test]
    fn expires_exactly_at_end_time() {
        let mut timers = timers();
        let end = timers.start(OverrideKind::Drying, 10_000, 5_000).unwrap();
        assert_eq!(end, 15_000);

        assert!(timers.is_active(OverrideKind::Drying, 14_999));
        assert!(timers.tick(14_999).is_empty());
        assert!(timers.window(OverrideKind::Drying).active);

        assert!(!timers.is_active(OverrideKind::Drying, 15_000));
        assert_eq!(timers.tick(15_000), vec![OverrideKind::Drying]);
        assert_eq!(
            *timers.window(OverrideKind::Drying),
            OverrideWindow::default()
        );
    }

    #[test]
    fn clear_is_immediate() {
        let mut timers = timers();
        timers.start(OverrideKind::Pause, 60_000, 0).unwrap();

        assert!(timers.clear(OverrideKind::Pause));
        assert!(!timers.is_active(OverrideKind::Pause, 1));
        assert_eq!(timers.window(OverrideKind::Pause).end_ms, None);
        assert!(!timers.clear(OverrideKind::Pause));
    }

    #[test]
    fn drying_and_pause_coexist() {
        let mut timers = timers();
        timers.start(OverrideKind::Drying, 60_000, 0).unwrap();
        timers.start(OverrideKind::Pause, 30_000, 0).unwrap();

        assert!(timers.is_active(OverrideKind::Drying, 10_000));
        assert!(timers.is_active(OverrideKind::Pause, 10_000));

        assert_eq!(timers.tick(30_000), vec![OverrideKind::Pause]);
        assert!(timers.is_active(OverrideKind::Drying, 30_000));
    }

    #[test]
    fn restart_extends_window() {
        let mut timers = timers();
        timers.start(OverrideKind::Pause, 10_000, 0).unwrap();
        let end = timers.start(OverrideKind::Pause, 10_000, 8_000).unwrap();

        assert_eq!(end, 18_000);
        assert!(timers.is_active(OverrideKind::Pause, 12_000));
        assert_eq!(timers.window(OverrideKind::Pause).remaining_ms(12_000), 6_000);
    }
}
