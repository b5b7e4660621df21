use crate::internal::unixtime::now_millis;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

//--------------------------------------------------------------------------------------------------
// Wall clock used for expiry and cache freshness decisions
//--------------------------------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

impl<T: Clock> Clock for Arc<T> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_millis()
    }
}

//--------------------------------------------------------------------------------------------------
// Clock that only moves when told to
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        ManualClock(AtomicI64::new(now_ms))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

//--------------------------------------------------------------------------------------------------
