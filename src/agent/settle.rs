use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Shared clock of the most recent network activity
///
/// The coordinator's network pump touches this whenever the host reports
/// completed responses; settle waits read it to find the silence window.
#[derive(Debug)]
pub struct ActivityTracker {
    last: Mutex<Instant>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        ActivityTracker {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Records network activity at the current instant
    pub fn touch(&self) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Instant::now();
    }

    /// Time elapsed since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.elapsed()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing policy for settle detection
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    /// Unconditional wait after navigation before polling starts
    pub grace: Duration,
    /// Silence window that counts as settled
    pub idle: Duration,
    /// Poll interval while waiting
    pub poll: Duration,
    /// Hard ceiling on the whole wait
    pub max_wait: Duration,
}

/// How a settle wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// No network activity for the configured idle window
    NetworkIdle,
    /// The hard ceiling elapsed with activity still trickling in
    MaxWaitElapsed,
}

/// Waits for a page to finish loading after navigation
///
/// Load events alone are not trustworthy: client-side routing fires them
/// before data fetches complete. Network silence is the authoritative
/// signal, bounded by `max_wait` for pages that never go quiet (long
/// polling, streaming).
#[derive(Debug, Clone)]
pub struct SettleDetector {
    activity: Arc<ActivityTracker>,
    policy: SettlePolicy,
}

impl SettleDetector {
    pub fn new(activity: Arc<ActivityTracker>, policy: SettlePolicy) -> Self {
        SettleDetector { activity, policy }
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Blocks until the page settles or the hard ceiling elapses
    pub async fn wait_settled(&self) -> SettleOutcome {
        tokio::time::sleep(self.policy.grace).await;

        let started = Instant::now();
        loop {
            if self.activity.idle_for() >= self.policy.idle {
                tracing::trace!(waited_ms = started.elapsed().as_millis() as u64, "network idle");
                return SettleOutcome::NetworkIdle;
            }
            if started.elapsed() >= self.policy.max_wait {
                tracing::debug!(
                    max_wait_ms = self.policy.max_wait.as_millis() as u64,
                    "settle wait hit hard ceiling"
                );
                return SettleOutcome::MaxWaitElapsed;
            }
            tokio::time::sleep(self.policy.poll).await;
        }
    }
}
