// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry an async operation with exponential backoff, doubling the delay
/// per attempt up to `max_delay`. The closure receives the 1-based attempt
/// number.
pub async fn retry_async<F, Fut, T, E>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(_) if attempt < attempts => {
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(max_delay);
                attempt += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, ()> = retry_async(
            |_| {
                let current = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    if current < 2 {
                        Err(())
                    } else {
                        Ok(7)
                    }
                }
            },
            4,
            Duration::from_millis(1),
            Duration::from_millis(8),
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert!(counter.load(Ordering::Relaxed) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_capped() {
        let counter = AtomicUsize::new(0);
        let start = tokio::time::Instant::now();
        let res: Result<(), ()> = retry_async(
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async move { Err(()) }
            },
            4,
            Duration::from_millis(100),
            Duration::from_millis(150),
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 4);
        // 100 + 150 + 150 with the cap, instead of 100 + 200 + 400.
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }
}
