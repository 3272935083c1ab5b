//! Host dispatch: the loop that keeps re-attempting every configured host.
//!
//! Each cycle walks the host list in order. A host is skipped while an earlier
//! attempt for it is still running or while it is backing off after failing to
//! connect. Otherwise the dispatcher waits for a concurrency permit and only
//! then spawns the attempt, so the number of live attempt tasks never exceeds
//! the gate capacity.

use crate::backoff::backoff_delay;
use crate::config::{Host, RetryCfg, UnlockConfig};
use crate::error::{UnlockError, UnlockResult};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

/// Result of an attempt that reached an authenticated session.
#[derive(Debug, Default)]
pub struct AttemptReport {
    pub prompts_answered: usize,
    /// How the remote shell ended, when it did not exit cleanly.
    pub termination: Option<UnlockError>,
}

/// Runs one end-to-end unlock attempt against a host.
///
/// Implementations must release every resource they open before returning.
pub trait HostUnlocker: Send + Sync + 'static {
    fn unlock(&self, host: &Host) -> impl Future<Output = UnlockResult<AttemptReport>> + Send;
}

/// Whether a host may be dispatched right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eligibility {
    Ready,
    InFlight,
    BackingOff(Duration),
}

#[derive(Debug, Default)]
struct HostState {
    in_flight: bool,
    failures: u32,
    retry_at: Option<Instant>,
}

/// Per-host in-flight and backoff bookkeeping owned by the dispatcher.
#[derive(Clone, Default)]
struct HostTracker {
    inner: Arc<Mutex<HashMap<String, HostState>>>,
}

impl HostTracker {
    fn with_state<T>(&self, name: &str, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut hosts = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(hosts.entry(name.to_string()).or_default())
    }

    fn eligibility(&self, name: &str, now: Instant) -> Eligibility {
        self.with_state(name, |state| {
            if state.in_flight {
                return Eligibility::InFlight;
            }
            match state.retry_at {
                Some(at) if at > now => Eligibility::BackingOff(at - now),
                _ => Eligibility::Ready,
            }
        })
    }

    fn begin(&self, name: &str) -> InFlightGuard {
        self.with_state(name, |state| state.in_flight = true);
        InFlightGuard {
            tracker: self.clone(),
            name: name.to_string(),
        }
    }

    /// Record a failed dial and return how long the host now backs off.
    fn record_unreachable(&self, name: &str, retry: &RetryCfg) -> Duration {
        self.with_state(name, |state| {
            state.failures = state.failures.saturating_add(1);
            let delay = backoff_delay(retry, state.failures);
            state.retry_at = Some(Instant::now() + delay);
            delay
        })
    }

    fn record_reached(&self, name: &str) {
        self.with_state(name, |state| {
            state.failures = 0;
            state.retry_at = None;
        });
    }
}

/// Clears the in-flight mark when the attempt task ends, panics included.
struct InFlightGuard {
    tracker: HostTracker,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker
            .with_state(&self.name, |state| state.in_flight = false);
    }
}

/// Top-level control loop over all configured hosts.
pub struct Dispatcher<U> {
    hosts: Vec<Arc<Host>>,
    unlocker: Arc<U>,
    gate: Arc<Semaphore>,
    capacity: usize,
    tracker: HostTracker,
    retry: RetryCfg,
    cooldown: Duration,
    cycle_interval: Duration,
}

impl<U: HostUnlocker> Dispatcher<U> {
    /// Build a dispatcher whose gate admits `min(max_concurrency, host_count)` attempts.
    pub fn new(config: &UnlockConfig, unlocker: U) -> Self {
        let capacity = config.gate_capacity();
        Self {
            hosts: config.hosts.iter().cloned().map(Arc::new).collect(),
            unlocker: Arc::new(unlocker),
            gate: Arc::new(Semaphore::new(capacity)),
            capacity,
            tracker: HostTracker::default(),
            retry: config.retry.clone(),
            cooldown: config.cooldown(),
            cycle_interval: config.cycle_interval(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dispatch cycles forever; only returns if the gate is closed.
    pub async fn run(&self) -> UnlockResult<()> {
        let mut ticker = interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.dispatch_cycle().await?;
        }
    }

    /// Walk the host list once, spawning an attempt for every eligible host.
    ///
    /// Returns how many attempts were started.
    pub async fn dispatch_cycle(&self) -> UnlockResult<usize> {
        let mut started = 0;
        for host in &self.hosts {
            match self.tracker.eligibility(&host.name, Instant::now()) {
                Eligibility::Ready => {}
                Eligibility::InFlight => {
                    debug!("{}: previous attempt still running; skipping", host.name);
                    continue;
                }
                Eligibility::BackingOff(left) => {
                    debug!("{}: backing off for another {left:?}", host.name);
                    continue;
                }
            }

            let permit = Arc::clone(&self.gate)
                .acquire_owned()
                .await
                .map_err(|_| UnlockError::GateClosed)?;
            let guard = self.tracker.begin(&host.name);

            tokio::spawn(run_attempt(
                Arc::clone(&self.unlocker),
                Arc::clone(host),
                self.tracker.clone(),
                self.retry.clone(),
                self.cooldown,
                permit,
                guard,
            ));
            started += 1;
        }
        Ok(started)
    }
}

async fn run_attempt<U: HostUnlocker>(
    unlocker: Arc<U>,
    host: Arc<Host>,
    tracker: HostTracker,
    retry: RetryCfg,
    cooldown: Duration,
    _permit: OwnedSemaphorePermit,
    _guard: InFlightGuard,
) {
    match unlocker.unlock(&host).await {
        Ok(report) => {
            tracker.record_reached(&host.name);
            if report.prompts_answered > 0 {
                info!(
                    "unlocked {}: answered {} prompt(s)",
                    host.name, report.prompts_answered
                );
            } else {
                info!("{}: session ended without an unlock prompt", host.name);
            }
            if let Some(err) = report.termination {
                warn!("{}: {err}", host.name);
            }
        }
        Err(err) if err.is_pre_connection() => {
            let delay = tracker.record_unreachable(&host.name, &retry);
            warn!("{}: {err}; next attempt in {delay:?}", host.name);
            return;
        }
        Err(err) => {
            tracker.record_reached(&host.name);
            warn!("{}: {err}", host.name);
        }
    }

    // give the host time to boot before it can be dialed again
    sleep(cooldown).await;
}
