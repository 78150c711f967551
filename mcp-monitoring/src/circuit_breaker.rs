//! Circuit breakers, one per (server, path)
//!
//! CLOSED counts consecutive failures and opens at the failure threshold.
//! OPEN rejects probes until the reset timeout has passed, then admits a
//! trial probe in HALF_OPEN. HALF_OPEN closes after the recovery threshold
//! of consecutive successes and reopens on any failure.

use crate::config::CircuitBreakerConfig;
use crate::result::ProbePath;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Snapshot of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_transition: DateTime<Utc>,
    /// Time left before an OPEN breaker admits a trial probe
    pub retry_after_ms: Option<u64>,
}

impl CircuitState {
    /// State of a breaker that has never seen a probe
    pub fn closed() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_transition: Utc::now(),
            retry_after_ms: None,
        }
    }
}

/// Whether a probe may be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    Allow,
    Reject { retry_after: Duration },
}

/// How a finished probe feeds the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitOutcome {
    Success,
    Failure,
    /// Neither (auth problems, cancellations, deferred probes)
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CircuitKey {
    server: String,
    path: ProbePath,
}

#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_transition: DateTime<Utc>,
    /// Reset timeout of the server's latest config
    reset_timeout: Duration,
}

impl Breaker {
    fn new(reset_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            last_transition: Utc::now(),
            reset_timeout,
        }
    }

    fn transition(&mut self, to: BreakerState) {
        self.state = to;
        self.last_transition = Utc::now();
        self.consecutive_successes = 0;
        match to {
            BreakerState::Open => self.opened_at = Some(Instant::now()),
            BreakerState::Closed => {
                self.opened_at = None;
                self.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {}
        }
    }

    fn remaining(&self) -> Duration {
        self.opened_at
            .map(|at| self.reset_timeout.saturating_sub(at.elapsed()))
            .unwrap_or_default()
    }

    fn snapshot(&self) -> CircuitState {
        let retry_after_ms =
            (self.state == BreakerState::Open).then(|| self.remaining().as_millis() as u64);
        CircuitState {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_transition: self.last_transition,
            retry_after_ms,
        }
    }
}

/// Registry of every breaker in the fleet
///
/// Each breaker sits behind its own lock; the map lock is only held to look
/// an entry up or insert it.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<CircuitKey, Arc<Mutex<Breaker>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, server: &str, path: ProbePath, reset_timeout: Duration) -> Arc<Mutex<Breaker>> {
        let key = CircuitKey {
            server: server.to_string(),
            path,
        };
        if let Some(breaker) = self.breakers.read().get(&key) {
            return breaker.clone();
        }
        self.breakers
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Breaker::new(reset_timeout))))
            .clone()
    }

    /// Decide whether the next probe on this path may go out
    pub fn check(&self, server: &str, path: ProbePath, config: &CircuitBreakerConfig) -> CircuitDecision {
        let breaker = self.entry(server, path, config.reset_timeout());
        let mut breaker = breaker.lock();
        breaker.reset_timeout = config.reset_timeout();
        if breaker.state != BreakerState::Open {
            return CircuitDecision::Allow;
        }

        let remaining = breaker.remaining();
        if remaining.is_zero() {
            breaker.transition(BreakerState::HalfOpen);
            info!(server = %server, path = %path, "Circuit half-open, admitting trial probe");
            CircuitDecision::Allow
        } else {
            CircuitDecision::Reject {
                retry_after: remaining,
            }
        }
    }

    /// Feed the final outcome of one probe (after retries)
    pub fn record(
        &self,
        server: &str,
        path: ProbePath,
        config: &CircuitBreakerConfig,
        outcome: CircuitOutcome,
    ) -> BreakerState {
        let breaker = self.entry(server, path, config.reset_timeout());
        let mut breaker = breaker.lock();
        breaker.reset_timeout = config.reset_timeout();

        match outcome {
            CircuitOutcome::Neutral => {}
            CircuitOutcome::Success => {
                breaker.consecutive_failures = 0;
                breaker.consecutive_successes += 1;
                if breaker.state == BreakerState::HalfOpen
                    && breaker.consecutive_successes >= config.recovery_threshold
                {
                    breaker.transition(BreakerState::Closed);
                    info!(server = %server, path = %path, "Circuit closed");
                }
            }
            CircuitOutcome::Failure => {
                breaker.consecutive_successes = 0;
                breaker.consecutive_failures += 1;
                let reopen = match breaker.state {
                    BreakerState::Closed => breaker.consecutive_failures >= config.failure_threshold,
                    BreakerState::HalfOpen => true,
                    BreakerState::Open => false,
                };
                if reopen {
                    breaker.transition(BreakerState::Open);
                    warn!(
                        server = %server,
                        path = %path,
                        consecutive_failures = breaker.consecutive_failures,
                        reset_timeout_ms = config.reset_timeout_ms,
                        "Circuit opened"
                    );
                }
            }
        }
        breaker.state
    }

    /// Snapshot of one breaker, `None` if it has never been used
    pub fn state(&self, server: &str, path: ProbePath) -> Option<CircuitState> {
        let key = CircuitKey {
            server: server.to_string(),
            path,
        };
        let breaker = self.breakers.read().get(&key)?.clone();
        let snapshot = breaker.lock().snapshot();
        Some(snapshot)
    }

    /// Drop both breakers of a server
    pub fn remove_server(&self, server: &str) {
        self.breakers.write().retain(|key, _| key.server != server);
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
