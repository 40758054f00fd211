//! Circuit breaker for destination failure protection.
//!
//! Tracks recent failures per destination and fails fast while a destination
//! is unhealthy, instead of burning retry budget against a dead endpoint.
//!
//! # State machine
//!
//! ```text
//!   Closed ── threshold failures in window ──▶ Open
//!     ▲                                         │
//!     │ probe succeeds                          │ cooldown elapses
//!     │                                         ▼
//!     └───────────────────────────────────── HalfOpen
//!                                               │
//!                           probe fails ────────┘──▶ back to Open
//! ```
//!
//! While `HalfOpen`, exactly one probe request is admitted; everything else
//! is rejected until the probe settles. Rejections are synthetic failures
//! that never touch the wire and are never counted as destination failures.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use tether_core::Clock;

/// Circuit breaker configuration, shared by all destinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Failures within the window that trip the circuit open.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub failure_window: Duration,
    /// Time an open circuit waits before admitting a probe.
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Current state of one destination's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, all requests admitted.
    Closed,
    /// Destination unhealthy, requests rejected without sending.
    Open,
    /// Cooldown elapsed, a single probe request is testing recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Admission decision for one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; send normally.
    Allowed,
    /// Circuit half-open; this attempt is the recovery probe.
    Probe,
    /// Circuit open (or a probe is already in flight); do not send.
    Rejected,
}

/// Per-destination breaker state.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    /// Current circuit state.
    pub state: CircuitState,
    /// Failures recorded in the current window.
    pub failure_count: u32,
    /// When the most recent failure was recorded.
    pub last_failure_at: Option<Instant>,
    /// When the circuit last opened.
    pub opened_at: Option<Instant>,
    /// Whether a half-open probe has been admitted and not yet settled.
    pub probe_in_flight: bool,
}

impl CircuitStats {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_at = None;
        self.opened_at = None;
        self.probe_in_flight = false;
    }
}

/// Thread-safe circuit breaker covering multiple destinations.
///
/// State is keyed by destination URL. All timing reads go through the
/// injected [`Clock`] so cooldown behavior is testable without sleeping.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
    circuits: Mutex<HashMap<String, CircuitStats>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given configuration and clock.
    pub fn new(config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, circuits: Mutex::new(HashMap::new()) }
    }

    /// Decides whether a delivery attempt to `destination` may proceed.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open here,
    /// and the caller receives [`Admission::Probe`] for the single recovery
    /// attempt. Further callers are rejected until the probe settles via
    /// [`Self::record_success`], [`Self::record_failure`], or
    /// [`Self::release_probe`].
    pub async fn admit(&self, destination: &str) -> Admission {
        let now = self.clock.now();
        let mut circuits = self.circuits.lock().await;
        let stats = circuits.entry(destination.to_string()).or_insert_with(CircuitStats::new);

        if stats.state == CircuitState::Open {
            let cooled_down = stats
                .opened_at
                .is_some_and(|opened_at| now.saturating_duration_since(opened_at) >= self.config.cooldown);
            if cooled_down {
                tracing::info!(destination, "circuit cooldown elapsed, moving to half-open");
                stats.state = CircuitState::HalfOpen;
                stats.probe_in_flight = false;
            }
        }

        match stats.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen => {
                if stats.probe_in_flight {
                    Admission::Rejected
                } else {
                    stats.probe_in_flight = true;
                    Admission::Probe
                }
            },
        }
    }

    /// Records a successful delivery to `destination`.
    ///
    /// A success in half-open closes the circuit and clears all counters.
    /// In closed it resets the failure count.
    pub async fn record_success(&self, destination: &str) {
        let mut circuits = self.circuits.lock().await;
        let stats = circuits.entry(destination.to_string()).or_insert_with(CircuitStats::new);

        match stats.state {
            CircuitState::Closed => {
                stats.failure_count = 0;
                stats.last_failure_at = None;
            },
            CircuitState::HalfOpen => {
                tracing::info!(destination, "probe succeeded, closing circuit");
                stats.reset();
            },
            CircuitState::Open => {
                tracing::warn!(destination, "success recorded for open circuit");
            },
        }
    }

    /// Records a failed delivery to `destination`.
    ///
    /// Failures older than the rolling window are forgotten before the new
    /// one is counted. Reaching the threshold opens the circuit; a failed
    /// half-open probe reopens it and restarts the cooldown.
    pub async fn record_failure(&self, destination: &str) {
        let now = self.clock.now();
        let mut circuits = self.circuits.lock().await;
        let stats = circuits.entry(destination.to_string()).or_insert_with(CircuitStats::new);

        match stats.state {
            CircuitState::Closed => {
                let window_expired = stats.last_failure_at.is_some_and(|last| {
                    now.saturating_duration_since(last) > self.config.failure_window
                });
                if window_expired {
                    stats.failure_count = 0;
                }

                stats.failure_count += 1;
                stats.last_failure_at = Some(now);

                if stats.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        destination,
                        failures = stats.failure_count,
                        "failure threshold reached, opening circuit"
                    );
                    stats.state = CircuitState::Open;
                    stats.opened_at = Some(now);
                }
            },
            CircuitState::HalfOpen => {
                tracing::warn!(destination, "probe failed, reopening circuit");
                stats.state = CircuitState::Open;
                stats.opened_at = Some(now);
                stats.last_failure_at = Some(now);
                stats.probe_in_flight = false;
            },
            CircuitState::Open => {},
        }
    }

    /// Releases an admitted probe without changing circuit state.
    ///
    /// Used when the probe attempt ends for a reason that says nothing about
    /// destination health, such as a non-retryable response. The next
    /// admission will hand out a fresh probe.
    pub async fn release_probe(&self, destination: &str) {
        let mut circuits = self.circuits.lock().await;
        if let Some(stats) = circuits.get_mut(destination) {
            stats.probe_in_flight = false;
        }
    }

    /// Returns the current breaker state for a destination, if tracked.
    pub async fn stats(&self, destination: &str) -> Option<CircuitStats> {
        let circuits = self.circuits.lock().await;
        circuits.get(destination).cloned()
    }

    /// Forces a destination's circuit into a state. Test and admin hook.
    pub async fn force_state(&self, destination: &str, state: CircuitState) {
        let now = self.clock.now();
        let mut circuits = self.circuits.lock().await;
        let stats = circuits.entry(destination.to_string()).or_insert_with(CircuitStats::new);

        match state {
            CircuitState::Closed => stats.reset(),
            CircuitState::Open => {
                stats.state = CircuitState::Open;
                stats.opened_at = Some(now);
                stats.probe_in_flight = false;
            },
            CircuitState::HalfOpen => {
                stats.state = CircuitState::HalfOpen;
                stats.probe_in_flight = false;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tether_core::TestClock;

    use super::*;

    const DEST: &str = "https://automation.example.com/hook";

    fn test_breaker() -> (CircuitBreaker, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let breaker = CircuitBreaker::new(CircuitConfig::default(), clock.clone());
        (breaker, clock)
    }

    #[tokio::test]
    async fn circuit_starts_closed_and_admits() {
        let (breaker, _clock) = test_breaker();
        assert_eq!(breaker.admit(DEST).await, Admission::Allowed);

        let stats = breaker.stats(DEST).await.unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn threshold_failures_open_circuit() {
        let (breaker, _clock) = test_breaker();

        for _ in 0..4 {
            breaker.record_failure(DEST).await;
            assert_eq!(breaker.admit(DEST).await, Admission::Allowed);
        }

        breaker.record_failure(DEST).await;
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);

        let stats = breaker.stats(DEST).await.unwrap();
        assert_eq!(stats.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn stale_failures_fall_out_of_window() {
        let (breaker, clock) = test_breaker();

        for _ in 0..4 {
            breaker.record_failure(DEST).await;
        }

        // Window expires; the old failures no longer count
        clock.advance(Duration::from_secs(61));
        breaker.record_failure(DEST).await;

        assert_eq!(breaker.admit(DEST).await, Admission::Allowed);
        let stats = breaker.stats(DEST).await.unwrap();
        assert_eq!(stats.failure_count, 1);
    }

    #[tokio::test]
    async fn cooldown_elapses_into_single_probe() {
        let (breaker, clock) = test_breaker();

        for _ in 0..5 {
            breaker.record_failure(DEST).await;
        }
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);

        clock.advance(Duration::from_secs(30));

        assert_eq!(breaker.admit(DEST).await, Admission::Probe);
        // Only one probe until the first settles
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);
    }

    #[tokio::test]
    async fn probe_success_closes_circuit() {
        let (breaker, clock) = test_breaker();

        for _ in 0..5 {
            breaker.record_failure(DEST).await;
        }
        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.admit(DEST).await, Admission::Probe);

        breaker.record_success(DEST).await;

        assert_eq!(breaker.admit(DEST).await, Admission::Allowed);
        let stats = breaker.stats(DEST).await.unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_restarts_cooldown() {
        let (breaker, clock) = test_breaker();

        for _ in 0..5 {
            breaker.record_failure(DEST).await;
        }
        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.admit(DEST).await, Admission::Probe);

        breaker.record_failure(DEST).await;
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);

        // Fresh cooldown from the failed probe
        clock.advance(Duration::from_secs(29));
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);
        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.admit(DEST).await, Admission::Probe);
    }

    #[tokio::test]
    async fn released_probe_hands_out_a_fresh_one() {
        let (breaker, _clock) = test_breaker();

        breaker.force_state(DEST, CircuitState::HalfOpen).await;
        assert_eq!(breaker.admit(DEST).await, Admission::Probe);
        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);

        breaker.release_probe(DEST).await;
        assert_eq!(breaker.admit(DEST).await, Admission::Probe);
    }

    #[tokio::test]
    async fn success_resets_failure_count_while_closed() {
        let (breaker, _clock) = test_breaker();

        breaker.record_failure(DEST).await;
        breaker.record_failure(DEST).await;
        breaker.record_success(DEST).await;

        let stats = breaker.stats(DEST).await.unwrap();
        assert_eq!(stats.failure_count, 0);
    }

    #[tokio::test]
    async fn destinations_are_isolated() {
        let (breaker, _clock) = test_breaker();

        for _ in 0..5 {
            breaker.record_failure(DEST).await;
        }

        assert_eq!(breaker.admit(DEST).await, Admission::Rejected);
        assert_eq!(breaker.admit("https://other.example.com/hook").await, Admission::Allowed);
    }
}
