//! Per-host request throttling.
//!
//! Two cooperating limiters:
//!
//! - [`HostGate`] enforces a configured minimum gap between requests to
//!   the same host. Hosts without a configured delay pass through free.
//! - [`SlidingWindow`] optionally caps total request starts within a
//!   rolling period, across all hosts.
//!
//! Both are designed to be wrapped in `Arc` and shared across download
//! tasks.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound of the random jitter added to each gate wait, in ms.
/// Keeps workers from stampeding a host the instant a gap expires.
const MAX_GATE_JITTER_MS: u64 = 250;

/// Minimum-gap limiter keyed by configured host.
///
/// A delay configured for `bunkr.is` also gates `cdn.bunkr.is`: suffix
/// matches share the configured key's timestamp, so the whole site sees
/// at most one request per gap.
#[derive(Debug, Default)]
pub struct HostGate {
    /// Configured minimum gaps, keyed by lowercase host.
    delays: HashMap<String, Duration>,

    /// Last request time per configured key.
    /// Arc lets the entry be cloned out so the `DashMap` shard lock is
    /// released before awaiting on the inner Mutex.
    last_request: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl HostGate {
    #[must_use]
    pub fn new(delays: HashMap<String, Duration>) -> Self {
        Self {
            delays,
            last_request: DashMap::new(),
        }
    }

    /// Resolves the configured gate for `host`: exact match first, then
    /// a dot-boundary suffix match (`cdn.bunkr.is` matches `bunkr.is`).
    fn delay_for(&self, host: &str) -> Option<(&str, Duration)> {
        if let Some((key, delay)) = self.delays.get_key_value(host) {
            return Some((key.as_str(), *delay));
        }
        self.delays.iter().find_map(|(key, delay)| {
            host.strip_suffix(key.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
                .then_some((key.as_str(), *delay))
        })
    }

    /// Waits until at least the configured gap has elapsed since the last
    /// request to `host`, then stamps the new request time.
    ///
    /// Returns immediately for hosts with no configured delay. The first
    /// request to a gated host is also immediate.
    pub async fn wait(&self, host: &str) {
        let Some((key, delay)) = self.delay_for(host) else {
            return;
        };

        let state = self
            .last_request
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Mutex held across the sleep so a second worker for the same
        // host queues behind this one instead of racing the timestamp.
        let mut last = state.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                let jitter =
                    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_GATE_JITTER_MS));
                let wait = delay - elapsed + jitter;
                debug!(host, wait_ms = wait.as_millis(), "host gate wait");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Caps request starts at `max_calls` within any rolling `period`.
#[derive(Debug)]
pub struct SlidingWindow {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    /// Creates a window allowing `max_calls` (minimum 1) per `period`.
    #[must_use]
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until the window has capacity, then records this call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while let Some(&front) = calls.front() {
                    if now.duration_since(front) >= self.period {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // Capacity opens when the oldest call leaves the window.
                let front = calls.front().copied().unwrap_or(now);
                (front + self.period).saturating_duration_since(now)
            };
            // Lock released before sleeping so other tasks can evict too.
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gate(host: &str, delay: Duration) -> HostGate {
        HostGate::new(HashMap::from([(host.to_string(), delay)]))
    }

    // ==================== HostGate Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_gate_unconfigured_host_passes_immediately() {
        let gate = gate("bunkr.is", Duration::from_secs(2));
        let start = Instant::now();

        gate.wait("other.example").await;
        gate.wait("other.example").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_first_request_immediate() {
        let gate = gate("bunkr.is", Duration::from_secs(2));
        let start = Instant::now();

        gate.wait("bunkr.is").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_enforces_minimum_gap() {
        let gate = gate("bunkr.is", Duration::from_secs(2));

        gate.wait("bunkr.is").await;
        let start = Instant::now();
        gate.wait("bunkr.is").await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "got {elapsed:?}");
        assert!(
            elapsed <= Duration::from_millis(2000 + MAX_GATE_JITTER_MS + 50),
            "got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_subdomains_share_configured_key() {
        let gate = gate("bunkr.is", Duration::from_secs(2));

        gate.wait("cdn.bunkr.is").await;
        let start = Instant::now();
        gate.wait("media-files.bunkr.is").await;

        assert!(
            start.elapsed() >= Duration::from_secs(2),
            "subdomains must share one gate, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_suffix_requires_dot_boundary() {
        let gate = gate("bunkr.is", Duration::from_secs(2));

        gate.wait("bunkr.is").await;
        let start = Instant::now();
        // "notbunkr.is" must not match the "bunkr.is" key.
        gate.wait("notbunkr.is").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_no_wait_when_gap_already_elapsed() {
        let gate = gate("bunkr.is", Duration::from_secs(2));

        gate.wait("bunkr.is").await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let start = Instant::now();
        gate.wait("bunkr.is").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    // ==================== SlidingWindow Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_window_allows_burst_up_to_max() {
        let window = SlidingWindow::new(3, Duration::from_secs(10));
        let start = Instant::now();

        window.acquire().await;
        window.acquire().await;
        window.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_blocks_until_oldest_expires() {
        let window = SlidingWindow::new(2, Duration::from_secs(10));
        let start = Instant::now();

        window.acquire().await;
        window.acquire().await;
        window.acquire().await;

        assert!(
            start.elapsed() >= Duration::from_secs(10),
            "got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_refills_after_period() {
        let window = SlidingWindow::new(2, Duration::from_secs(5));

        window.acquire().await;
        window.acquire().await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let start = Instant::now();
        window.acquire().await;
        window.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_minimum_capacity_is_one() {
        let window = SlidingWindow::new(0, Duration::from_secs(1));
        let start = Instant::now();
        window.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
