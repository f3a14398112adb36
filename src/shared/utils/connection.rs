/// Bounded Redis connection acquisition.
///
/// Applies the `max_retries_per_request` policy from `RedisConfig`:
/// producer-configured clients give up after a finite number of retries so
/// enqueue paths fail fast, consumer-configured clients keep retrying with
/// capped backoff and ride out broker restarts.
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::backoff;
use redis::Client;
use std::time::Duration;

const RETRY_BASE: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(2);

/// Open an async connection, retrying per `max_retries`: `Some(n)` allows up
/// to `n` retries after the first attempt, `None` retries until the broker
/// answers.
pub async fn connect_with_retries(
    client: &Client,
    max_retries: Option<u32>,
) -> AppResult<redis::aio::Connection> {
    let mut attempt: u32 = 0;
    loop {
        match client.get_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                attempt += 1;
                if let Some(max) = max_retries {
                    if attempt > max {
                        return Err(AppError::ConnectionError(format!(
                            "Redis connection failed after {} attempt(s): {}",
                            attempt, e
                        )));
                    }
                }
                tokio::time::sleep(backoff::delay_for_attempt(attempt, RETRY_BASE, RETRY_CAP))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finite_retries_fail_fast_against_unreachable_broker() {
        // Port 1 is closed; every attempt is refused immediately.
        let client = Client::open("redis://127.0.0.1:1").unwrap();

        let started = tokio::time::Instant::now();
        // `unwrap_err` needs `Connection: Debug`, which the redis crate doesn't provide.
        let err = match connect_with_retries(&client, Some(1)).await {
            Ok(_) => panic!("expected connection to fail"),
            Err(e) => e,
        };

        assert!(matches!(err, AppError::ConnectionError(_)));
        assert!(err.to_string().contains("after 2 attempt(s)"));
        // One backoff sleep between the two attempts, nowhere near unbounded.
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
