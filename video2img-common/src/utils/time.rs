use std::time::{Duration, Instant};

/// Runs something at most once per period, e.g., progress logs in a hot loop.
pub struct Every {
    every: Duration,
    last: Instant,
}

impl Every {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            last: Instant::now(),
        }
    }

    pub fn perform(&mut self, f: impl FnOnce()) {
        let now = Instant::now();
        if now - self.last >= self.every {
            self.last = now;
            f()
        }
    }
}
