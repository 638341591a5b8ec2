//! Retry with jittered exponential backoff for transient phase failures
//! (spec §4.7: 250ms/1s/4s, 3 attempts). Adapted from a crawl orchestrator's
//! `calculate_retry_backoff`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Result;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAYS_MS: [u64; MAX_ATTEMPTS as usize] = [250, 1_000, 4_000];

fn jittered(base_ms: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}

/// Runs `f` up to [`MAX_ATTEMPTS`] times. Only [`crate::error::ScanError::is_transient`]
/// failures are retried; anything else returns on the first attempt.
pub async fn with_retry<F, Fut, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                tokio::time::sleep(jittered(BASE_DELAYS_MS[attempt as usize])).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ScanError::Unreachable("dns failure".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_do_not_retry() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ScanError::EmptyCss) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
