use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Fixed-window per-camera call limiter. Enforces the vision model's
/// per-minute quota independent of the camera's own capture cadence, so a
/// misconfigured high-FPS camera cannot exhaust the budget (spec 4.3).
pub struct RateLimiter {
    limit_per_minute: u32,
    state: Mutex<WindowState>,
}

struct WindowState {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Returns `true` if the call is allowed under the current minute
    /// window; `false` if the caller must skip this frame.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now.duration_since(state.window_start) >= Duration::from_secs(60) {
            state.window_start = now;
            state.count = 0;
        }
        if state.count >= self.limit_per_minute {
            return false;
        }
        state.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_refuses() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
