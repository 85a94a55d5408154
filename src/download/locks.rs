//! In-process mutual exclusion on output filenames.
//!
//! Two workers resolving to the same filename (case-insensitively) must
//! not write the same `.part` file at once. A worker claims the
//! lowercased name before touching disk and releases it when its guard
//! drops. Contending workers poll with a randomized wait so they do not
//! retry in lockstep.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Mean of the randomized contention wait, in seconds.
const WAIT_MEAN_SECS: f64 = 1.0;

/// Standard deviation of the randomized contention wait, in seconds.
const WAIT_STDDEV_SECS: f64 = 1.5;

/// Registry of filenames currently being written by this process.
#[derive(Debug, Clone, Default)]
pub struct FileLocks {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl FileLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `filename` (case-insensitive), waiting while another worker
    /// holds it. The claim is released when the returned guard drops.
    pub async fn acquire(&self, filename: &str) -> FileLockGuard {
        let key = filename.to_lowercase();
        loop {
            let inserted = self
                .claimed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.clone());
            if inserted {
                return FileLockGuard {
                    claimed: Arc::clone(&self.claimed),
                    key,
                };
            }
            let wait = jittered_wait();
            debug!(filename = %key, wait_ms = wait.as_millis(), "filename claimed elsewhere, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Released claim on drop.
#[must_use = "the filename claim is released when this guard drops"]
#[derive(Debug)]
pub struct FileLockGuard {
    claimed: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Normal-distributed wait (mean 1 s, stddev 1.5 s) clamped at zero,
/// sampled via Box-Muller.
fn jittered_wait() -> Duration {
    let mut rng = rand::thread_rng();
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    Duration::from_secs_f64((WAIT_MEAN_SECS + WAIT_STDDEV_SECS * z).max(0.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_acquire_uncontended_is_immediate() {
        let locks = FileLocks::new();
        let _guard = locks.acquire("photo.jpg").await;
    }

    #[tokio::test]
    async fn test_release_on_drop_allows_reacquire() {
        let locks = FileLocks::new();
        let guard = locks.acquire("photo.jpg").await;
        drop(guard);
        let _guard = locks.acquire("photo.jpg").await;
    }

    #[tokio::test]
    async fn test_distinct_names_do_not_contend() {
        let locks = FileLocks::new();
        let _a = locks.acquire("a.jpg").await;
        let _b = locks.acquire("b.jpg").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_is_case_insensitive() {
        let locks = FileLocks::new();
        let _guard = locks.acquire("Photo.JPG").await;

        let blocked = tokio::time::timeout(
            Duration::from_secs(30),
            locks.acquire("photo.jpg"),
        )
        .await;
        assert!(blocked.is_err(), "differently-cased name must contend");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_acquires_after_release() {
        let locks = FileLocks::new();
        let guard = locks.acquire("clip.mp4").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire("clip.mp4").await;
            Instant::now()
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        let released_at = Instant::now();
        drop(guard);

        let acquired_at = waiter.await.unwrap();
        assert!(
            acquired_at >= released_at,
            "waiter must only proceed after release"
        );
    }

    #[test]
    fn test_jittered_wait_distribution() {
        let samples: Vec<Duration> = (0..1000).map(|_| jittered_wait()).collect();

        // Clamp at zero must actually fire for the low tail.
        assert!(
            samples.iter().any(|d| d.is_zero()),
            "expected some zero waits from clamping"
        );

        // Mean of N(1, 1.5) clamped at zero is ~1.23s.
        let mean = samples.iter().map(Duration::as_secs_f64).sum::<f64>() / 1000.0;
        assert!(
            (0.9..1.6).contains(&mean),
            "wait mean {mean}s outside expected range"
        );
    }
}
