use crate::utils::time::sleep_with_jitter;
use std::future::Future;
use tracing::warn;

pub async fn retry_with_backoff<T, F, Fut>(
    retries: u32,
    base_delay_ms: u64,
    operation: F,
) -> common::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    retry_with_backoff_if(retries, base_delay_ms, |_| true, operation).await
}

/// Like [`retry_with_backoff`], but gives up immediately on errors that
/// `should_retry` rejects.
pub async fn retry_with_backoff_if<T, F, Fut, P>(
    mut retries: u32,
    base_delay_ms: u64,
    should_retry: P,
    operation: F,
) -> common::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = common::Result<T>>,
    P: Fn(&common::Error) -> bool,
{
    let mut delay = base_delay_ms;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if retries == 0 || !should_retry(&e) {
                    return Err(e);
                }

                warn!(error = %e, retries_left = retries, delay_ms = delay, "Retrying after error");
                retries -= 1;
                sleep_with_jitter(delay, delay / 2).await;
                delay *= 2;
            }
        }
    }
}
