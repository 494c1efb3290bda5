use chrono::{Local, NaiveDateTime};
use std::sync::Mutex;
use std::time::Duration;

/// Wall-clock port. The agent loop never calls `Local::now()` or
/// `thread::sleep` directly so tests can run a month of cycles instantly.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
    fn sleep_until(&self, wake: NaiveDateTime);
}

/// Local wall time and real sleeps.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep_until(&self, wake: NaiveDateTime) {
        if let Ok(wait) = (wake - self.now()).to_std() {
            std::thread::sleep(wait);
        }
    }
}

/// Clock that only moves when told to. Sleeping jumps straight to the wake
/// time.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn sleep_until(&self, wake: NaiveDateTime) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        if wake > *now {
            *now = wake;
        }
    }
}

/// How the previous cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    Completed,
    Errored,
}

/// Next-wake policy: a fixed interval after a completed cycle, a shorter
/// backoff after an error.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    pub cycle_interval: Duration,
    pub error_backoff: Duration,
}

impl Scheduler {
    pub fn new(cycle_interval: Duration, error_backoff: Duration) -> Self {
        Self {
            cycle_interval,
            error_backoff,
        }
    }

    pub fn next_wake(&self, now: NaiveDateTime, end: CycleEnd) -> NaiveDateTime {
        let wait = match end {
            CycleEnd::Completed => self.cycle_interval,
            CycleEnd::Errored => self.error_backoff,
        };
        add(now, wait)
    }
}

pub(crate) fn add(at: NaiveDateTime, by: Duration) -> NaiveDateTime {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(NaiveDateTime::MAX)
}
