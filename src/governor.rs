use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-adapter request budget: at most `limit` requests per rolling window.
///
/// State is process-local and rebuilt on restart; under-counting after a
/// restart costs a few extra upstream calls, nothing more.
pub struct RateGovernor {
    limit: u32,
    window: Duration,
    state: Mutex<GovernorState>,
}

struct GovernorState {
    count: u32,
    window_start: Instant,
}

impl RateGovernor {
    pub fn new(limit: u32, window: Duration) -> Self {
        RateGovernor {
            limit,
            window,
            state: Mutex::new(GovernorState {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    fn reset_if_window_elapsed(state: &mut GovernorState, window: Duration) {
        if state.window_start.elapsed() >= window {
            state.count = 0;
            state.window_start = Instant::now();
        }
    }

    /// True iff the budget still has room in the current window.
    pub fn can_proceed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        Self::reset_if_window_elapsed(&mut state, self.window);
        state.count < self.limit
    }

    /// Count one issued request against the window.
    pub fn record_request(&self) {
        let mut state = self.state.lock().unwrap();
        Self::reset_if_window_elapsed(&mut state, self.window);
        state.count += 1;
    }

    /// Check and record under one lock. Returns false without counting when
    /// the budget is exhausted.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        Self::reset_if_window_elapsed(&mut state, self.window);
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Requests left in the current window.
    pub fn remaining(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        Self::reset_if_window_elapsed(&mut state, self.window);
        self.limit.saturating_sub(state.count)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Time until the current window rolls over.
    pub fn resets_in(&self) -> Duration {
        let state = self.state.lock().unwrap();
        self.window.saturating_sub(state.window_start.elapsed())
    }
}
