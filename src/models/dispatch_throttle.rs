// Outbound analysis rate limiting, independent of the render rate.
//
// There is no queue: a frame that arrives inside the window is dropped and the
// next eligible frame is always the most recent one.

/// Minimum-interval gate on analysis dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchThrottle {
    interval_ms: u64,
    last_dispatch_ms: Option<u64>,
}

impl DispatchThrottle {
    /// 10 Hz ceiling on analysis calls
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_dispatch_ms: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn last_dispatch_ms(&self) -> Option<u64> {
        self.last_dispatch_ms
    }

    /// Whether a dispatch at `now_ms` would be allowed. Does not record anything.
    pub fn is_eligible(&self, now_ms: u64) -> bool {
        match self.last_dispatch_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Check and record in one step. Returns `true` if the caller may dispatch.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        if !self.is_eligible(now_ms) {
            return false;
        }
        self.last_dispatch_ms = Some(now_ms);
        true
    }
}

impl Default for DispatchThrottle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_dispatch_is_always_allowed() {
        let mut throttle = DispatchThrottle::default();
        assert!(throttle.try_acquire(0));
        assert_eq!(throttle.last_dispatch_ms(), Some(0));
    }

    #[test]
    fn test_second_call_inside_window_is_refused() {
        let mut throttle = DispatchThrottle::new(100);
        assert!(throttle.try_acquire(1_000));
        assert!(!throttle.try_acquire(1_000));
        assert!(!throttle.try_acquire(1_099));
        assert!(throttle.try_acquire(1_100));
        assert_eq!(throttle.last_dispatch_ms(), Some(1_100));
    }

    #[test]
    fn test_refused_attempt_does_not_move_window() {
        let mut throttle = DispatchThrottle::new(100);
        assert!(throttle.try_acquire(0));
        assert!(!throttle.try_acquire(60));
        assert!(throttle.try_acquire(100));
    }

    #[test]
    fn test_at_most_one_dispatch_per_window() {
        // 60 Hz render ticks for ten seconds against a 100 ms window
        let mut throttle = DispatchThrottle::new(100);
        let mut dispatched = Vec::new();
        let mut t = 0.0f64;
        while t < 10_000.0 {
            let now = t as u64;
            if throttle.try_acquire(now) {
                dispatched.push(now);
            }
            t += 1000.0 / 60.0;
        }

        for pair in dispatched.windows(2) {
            assert!(pair[1] - pair[0] >= 100);
        }
        assert!(dispatched.len() <= 100);
        assert!(dispatched.len() >= 80);
    }

    #[test]
    fn test_clock_going_backwards_is_not_eligible() {
        let mut throttle = DispatchThrottle::new(100);
        assert!(throttle.try_acquire(500));
        assert!(!throttle.try_acquire(200));
    }
}
