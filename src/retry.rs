//! Bounded retry with a fixed delay schedule.
//!
//! Used wherever a caller has to tolerate something that comes up late
//! (the converter registry on first use). The schedule is explicit: one
//! initial attempt plus one attempt after each listed delay, then give up.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Run `op` until it succeeds or the schedule is exhausted.
///
/// `op` receives the 0-based attempt number. With `delays = [500ms, 1s]`
/// it runs at most three times, waiting 500 ms before the second attempt
/// and 1 s before the third. The last error is returned.
pub async fn retry_with_schedule<T, E, F, Fut>(delays: &[Duration], mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => match delays.get(attempt) {
                Some(delay) => {
                    debug!(
                        "Attempt {} failed ({}); retrying in {}ms",
                        attempt + 1,
                        e,
                        delay.as_millis()
                    );
                    sleep(*delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stops_after_schedule() {
        let calls = AtomicUsize::new(0);
        let delays = [Duration::from_millis(1), Duration::from_millis(1)];
        let result: Result<(), String> = retry_with_schedule(&delays, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("not yet".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "not yet");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicUsize::new(0);
        let delays = [Duration::from_millis(1), Duration::from_millis(1)];
        let result: Result<usize, String> = retry_with_schedule(&delays, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Ok(attempt)
                } else {
                    Err(format!("attempt {attempt}"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_schedule_runs_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = tokio_test::block_on(retry_with_schedule(&[], |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope".to_string()) }
        }));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
