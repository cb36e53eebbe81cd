//! Scroll settling: coalesce a burst of scroll positions into one.

use std::time::{Duration, Instant};

use crate::geometry::UnsafePosition;

/// Holds the latest scroll position until no new one arrived for the settle
/// window.
#[derive(Clone, Debug)]
pub struct ScrollSettler {
    window: Duration,
    pending: Option<(UnsafePosition, Instant)>,
}

impl ScrollSettler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Record a scroll tick. Restarts the settle window.
    pub fn push(&mut self, position: UnsafePosition, now: Instant) {
        self.pending = Some((position, now));
    }

    /// Settled position, once the window elapsed since the last tick.
    pub fn poll(&mut self, now: Instant) -> Option<UnsafePosition> {
        let (position, last) = self.pending?;
        if now.saturating_duration_since(last) < self.window {
            return None;
        }
        self.pending = None;
        Some(position)
    }

    /// Latest position regardless of the window.
    pub fn flush(&mut self) -> Option<UnsafePosition> {
        self.pending.take().map(|(position, _)| position)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_settling(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for ScrollSettler {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_last_position_of_burst_settles() {
        let start = Instant::now();
        let mut settler = ScrollSettler::default();
        settler.push(UnsafePosition::new(0.0, 10.0), start);
        settler.push(UnsafePosition::new(0.0, 20.0), start + Duration::from_millis(100));
        settler.push(UnsafePosition::new(0.0, 30.0), start + Duration::from_millis(200));

        assert_eq!(settler.poll(start + Duration::from_millis(600)), None);
        assert!(settler.is_settling());
        assert_eq!(
            settler.poll(start + Duration::from_millis(700)),
            Some(UnsafePosition::new(0.0, 30.0))
        );
        assert_eq!(settler.poll(start + Duration::from_millis(800)), None);
    }

    #[test]
    fn cancel_and_flush() {
        let now = Instant::now();
        let mut settler = ScrollSettler::new(Duration::from_millis(50));
        settler.push(UnsafePosition::new(0.0, 5.0), now);
        assert_eq!(settler.flush(), Some(UnsafePosition::new(0.0, 5.0)));
        settler.push(UnsafePosition::new(0.0, 6.0), now);
        settler.cancel();
        assert!(!settler.is_settling());
        assert_eq!(settler.poll(now + Duration::from_secs(1)), None);
    }
}
