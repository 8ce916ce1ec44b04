//! Bootstrap utilities for statera binaries and background workers.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the STATERA_LOG environment variable.
///
/// Defaults to "info" level if STATERA_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Poll `check` with exponential backoff until it returns true or `timeout`
/// elapses. Returns whether the condition was met.
///
/// # Arguments
/// * `what` - Human-readable name for logging (e.g., "read model convergence")
/// * `timeout` - Upper bound on total waiting
/// * `initial_delay` - First sleep between checks, doubled up to one second
pub async fn wait_until<F, Fut>(
    what: &str,
    timeout: Duration,
    initial_delay: Duration,
    check: F,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    const MAX_DELAY: Duration = Duration::from_secs(1);

    let deadline = Instant::now() + timeout;
    let mut delay = initial_delay.max(Duration::from_millis(1));
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if check().await {
            debug!(what = what, attempt = attempt, "Condition met");
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(what = what, attempt = attempt, "Gave up waiting");
            return false;
        }

        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = std::cmp::min(delay * 2, MAX_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_until_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let met = wait_until("counter", Duration::from_secs(2), Duration::from_millis(1), || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) >= 2 }
        })
        .await;

        assert!(met);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let met = wait_until(
            "never",
            Duration::from_millis(30),
            Duration::from_millis(5),
            || async { false },
        )
        .await;

        assert!(!met);
    }
}
