/// Cooperative cancellation: a level-triggered stop signal and the
/// bounded wait loop every blocking operation in this crate goes through.
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{ProfboxError, Result};

/// Slice length for signal waits inside [`wait_event`]. Keeps shutdown
/// latency bounded even when the condition is slow to come true.
const STOP_WAIT_SLICE: Duration = Duration::from_millis(100);

/// A one-way shutdown flag shared across threads.
///
/// Set exactly once per profiling cycle by the orchestrating layer; once
/// set it stays set, and observing it never mutates it. Any number of
/// waiters may block on it concurrently.
pub struct StopSignal {
    state: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Request shutdown and wake every waiter.
    pub fn set(&self) {
        let mut set = self.state.lock().unwrap();
        *set = true;
        self.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap()
    }

    /// Block until the signal is set or `timeout` elapses. Returns whether
    /// the signal is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.state.lock().unwrap();
        loop {
            if *set {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(set, deadline - now).unwrap();
            set = guard;
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until `condition` holds, `stop` is set, or `timeout` elapses.
///
/// The condition is re-checked between bounded waits on the stop signal,
/// so both shutdown latency and condition-polling latency stay around
/// [`STOP_WAIT_SLICE`]. No side effects beyond blocking the caller.
pub fn wait_event<F>(timeout: Duration, stop: &StopSignal, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if stop.wait(STOP_WAIT_SLICE) {
            return Err(ProfboxError::Stopped);
        }
        if Instant::now() > deadline {
            return Err(ProfboxError::Timeout(timeout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_event_returns_immediately_when_condition_holds() {
        let stop = StopSignal::new();
        let start = Instant::now();
        wait_event(Duration::from_secs(5), &stop, || true).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_event_times_out() {
        let stop = StopSignal::new();
        let result = wait_event(Duration::from_millis(200), &stop, || false);
        assert!(matches!(result, Err(ProfboxError::Timeout(_))));
    }

    #[test]
    fn test_wait_event_observes_stop_signal_promptly() {
        let stop = Arc::new(StopSignal::new());
        let setter = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            setter.set();
        });

        let start = Instant::now();
        let result = wait_event(Duration::from_secs(10), &stop, || false);
        handle.join().unwrap();

        assert!(matches!(result, Err(ProfboxError::Stopped)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_stop_signal_stays_set() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
        stop.set();
        assert!(stop.is_set());
        assert!(stop.wait(Duration::from_millis(1)));
        assert!(stop.is_set());
    }

    #[test]
    fn test_many_waiters_observe_one_set() {
        let stop = Arc::new(StopSignal::new());
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let stop = Arc::clone(&stop);
            waiters.push(thread::spawn(move || stop.wait(Duration::from_secs(5))));
        }
        stop.set();
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }
}
