use crate::clock::Clock;
use crate::codec;
use crate::token::BearerToken;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info};

//--------------------------------------------------------------------------------------------------
// Triggers and handler
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryTrigger {
    AlreadyExpired,
    Deadline,
    Poll,
    Focus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    Disarmed,
    Armed,
    Firing,
}

/// Called at most once per arming, with the token that expired
pub trait ExpiryHandler: Send + Sync {
    fn on_expired(&self, token: &BearerToken, trigger: ExpiryTrigger);
}

impl<F> ExpiryHandler for F
where
    F: Fn(&BearerToken, ExpiryTrigger) + Send + Sync,
{
    fn on_expired(&self, token: &BearerToken, trigger: ExpiryTrigger) {
        self(token, trigger)
    }
}

//--------------------------------------------------------------------------------------------------
// Monitor internals
//--------------------------------------------------------------------------------------------------

struct Arming {
    token: BearerToken,
    fired: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Arming {
    fn cancel(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    handler: Box<dyn ExpiryHandler>,
    armed: Mutex<Option<Arming>>,
    firing: AtomicBool,
}

impl Shared {
    fn fire(&self, token: &BearerToken, fired: &Arc<AtomicBool>, trigger: ExpiryTrigger) -> bool {
        if fired.swap(true, Ordering::SeqCst) {
            debug!("Expiry already handled, ignoring {:?}", trigger);
            return false;
        }

        // Detach this arming before the handler runs, the handler is free to disarm or re-arm
        let arming = {
            let mut armed = self.armed.lock();
            match armed.as_ref() {
                Some(current) if Arc::ptr_eq(&current.fired, fired) => armed.take(),
                _ => None,
            }
        };

        info!("Token expired ({:?}), forcing logout", trigger);
        self.firing.store(true, Ordering::SeqCst);
        self.handler.on_expired(token, trigger);
        self.firing.store(false, Ordering::SeqCst);

        if let Some(arming) = arming {
            arming.cancel();
        }
        true
    }
}

//--------------------------------------------------------------------------------------------------
// Expiry monitor
//--------------------------------------------------------------------------------------------------

/// Watches one token at a time. A deadline timer covers the common case, a periodic poll of the
/// clock covers a deadline that slipped while the host was suspended.
pub struct ExpiryMonitor {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl ExpiryMonitor {
    pub fn new<H>(clock: Arc<dyn Clock>, poll_interval: Duration, handler: H) -> Self
    where
        H: ExpiryHandler + 'static,
    {
        ExpiryMonitor {
            shared: Arc::new(Shared {
                clock,
                handler: Box::new(handler),
                armed: Mutex::new(None),
                firing: AtomicBool::new(false),
            }),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Must be called from within a tokio runtime
    pub fn arm(&self, token: &BearerToken) {
        self.disarm();

        let fired = Arc::new(AtomicBool::new(false));
        let remaining_ms = codec::expiration_time_ms(token)
            .map_or(0, |expires_ms| expires_ms - self.shared.clock.now_ms());

        if remaining_ms <= 0 {
            self.shared.fire(token, &fired, ExpiryTrigger::AlreadyExpired);
            return;
        }

        // Hold the slot while spawning so a timer can't fire before its arming is recorded
        let mut armed = self.shared.armed.lock();

        let deadline = {
            let shared = self.shared.clone();
            let fired = fired.clone();
            let token = token.clone();
            let wait = Duration::from_millis(remaining_ms.unsigned_abs());
            tokio::spawn(async move {
                sleep(wait).await;
                shared.fire(&token, &fired, ExpiryTrigger::Deadline);
            })
        };

        let poll = {
            let shared = self.shared.clone();
            let fired = fired.clone();
            let token = token.clone();
            let period = self.poll_interval;
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if codec::is_expired(&token, shared.clock.now_ms()) {
                        shared.fire(&token, &fired, ExpiryTrigger::Poll);
                        return;
                    }
                }
            })
        };

        let previous = armed.replace(Arming {
            token: token.clone(),
            fired,
            tasks: vec![deadline, poll],
        });
        drop(armed);

        if let Some(previous) = previous {
            previous.cancel();
        }
        debug!("Expiry monitor armed, token expires in {} ms", remaining_ms);
    }

    pub fn disarm(&self) {
        let arming = self.shared.armed.lock().take();
        if let Some(arming) = arming {
            arming.cancel();
            debug!("Expiry monitor disarmed");
        }
    }

    /// Re-checks the armed token right now. Returns whether this call forced the logout.
    pub fn check_now(&self) -> bool {
        let (token, fired) = {
            let armed = self.shared.armed.lock();
            match armed.as_ref() {
                Some(arming) => (arming.token.clone(), arming.fired.clone()),
                None => return false,
            }
        };

        if codec::is_expired(&token, self.shared.clock.now_ms()) {
            self.shared.fire(&token, &fired, ExpiryTrigger::Focus)
        } else {
            false
        }
    }

    pub fn armed_token(&self) -> Option<BearerToken> {
        self.shared
            .armed
            .lock()
            .as_ref()
            .map(|arming| arming.token.clone())
    }

    pub fn state(&self) -> MonitorState {
        if self.shared.firing.load(Ordering::SeqCst) {
            MonitorState::Firing
        } else if self.shared.armed.lock().is_some() {
            MonitorState::Armed
        } else {
            MonitorState::Disarmed
        }
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        self.disarm();
    }
}

//--------------------------------------------------------------------------------------------------
