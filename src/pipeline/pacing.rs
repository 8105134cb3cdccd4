//! Rate limiting, wall-clock budget, cancellation and the single-retry rule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clients::ClientError;

/// Sleep granularity while pacing, so cancellation stays responsive.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

/// Shared stop flag, checked between tenants and between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Enforces a minimum gap between consecutive external calls.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Option<Instant>,
    cancel: CancelFlag,
}

impl Pacer {
    pub fn new(delay: Duration, cancel: CancelFlag) -> Self {
        Self {
            delay,
            last: None,
            cancel,
        }
    }

    /// Block until `delay` has passed since the previous call. The first
    /// call never waits.
    pub fn wait(&mut self) {
        if let Some(last) = self.last {
            let mut remaining = self.delay.saturating_sub(last.elapsed());
            while !remaining.is_zero() && !self.cancel.is_cancelled() {
                let step = remaining.min(SLEEP_GRANULARITY);
                std::thread::sleep(step);
                remaining = remaining.saturating_sub(step);
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Wall-clock budget of one job invocation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }
}

/// Run `call`; on a transient failure wait one pacing interval and try
/// exactly once more.
pub fn with_retry<T>(
    pacer: &mut Pacer,
    mut call: impl FnMut() -> Result<T, ClientError>,
) -> Result<T, ClientError> {
    match call() {
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "Transient external failure, retrying once");
            pacer.wait();
            call()
        }
        other => other,
    }
}
