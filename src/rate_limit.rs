use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_FAILURES: u32 = 5;
const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct Attempts {
    count: u32,
    window_start: Instant,
}

/// Per-client-address login throttle: after 5 failed attempts, the address
/// is locked out for 15 minutes, and every further failure restarts the
/// window. Owned by the application and injected into the login handler
/// rather than living in ambient global state.
///
/// Entries are never evicted, so the map grows with address cardinality.
/// Acceptable at this traffic level; noted, not fixed.
#[derive(Debug, Default)]
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, Attempts>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the address is currently locked out. A previously
    /// unseen address is initialized to a clean slate before the check.
    pub fn check(&self, addr: &str) -> bool {
        self.check_at(addr, Instant::now())
    }

    pub fn record_failure(&self, addr: &str) {
        self.record_failure_at(addr, Instant::now());
    }

    pub fn record_success(&self, addr: &str) {
        self.record_success_at(addr, Instant::now());
    }

    fn check_at(&self, addr: &str, now: Instant) -> bool {
        let mut attempts = self.attempts.lock().unwrap();
        let entry = attempts.entry(addr.to_owned()).or_insert(Attempts {
            count: 0,
            window_start: now,
        });
        !(entry.count >= MAX_FAILURES && now.duration_since(entry.window_start) < LOCKOUT_WINDOW)
    }

    fn record_failure_at(&self, addr: &str, now: Instant) {
        let mut attempts = self.attempts.lock().unwrap();
        let entry = attempts.entry(addr.to_owned()).or_insert(Attempts {
            count: 0,
            window_start: now,
        });
        entry.count += 1;
        entry.window_start = now;
    }

    fn record_success_at(&self, addr: &str, now: Instant) {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.insert(
            addr.to_owned(),
            Attempts {
                count: 0,
                window_start: now,
            },
        );
    }
}
