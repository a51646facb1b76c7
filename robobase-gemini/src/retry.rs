use crate::{JudgeError, RetryConfig};
use log::warn;
use std::thread::sleep;

/// Calls `f` until it succeeds, sleeping with exponential backoff between attempts.
///
/// Only transient errors are retried; others are returned at once. When all
/// `config.max_attempts` attempts fail, [`JudgeError::RetryExhausted`] holds the
/// last error.
pub fn retry_with_backoff<T, F>(config: &RetryConfig, what: &str, mut f: F) -> Result<T, JudgeError>
where
    F: FnMut() -> Result<T, JudgeError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempts >= max_attempts => {
                return Err(JudgeError::RetryExhausted {
                    what: what.to_string(),
                    attempts,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                let delay = config.delay(attempts);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what, attempts, max_attempts, delay, e
                );
                sleep(delay);
            }
        }
    }
}
