use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Why an operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was classified as not worth retrying.
    Fatal(E),
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }
}

/// Result of an operation run under a [`RetryPolicy`], with the number of re-attempts made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub retries: usize,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// `retry_limit` re-attempts after the first try.
    pub fn from_retry_limit(retry_limit: u32, base_delay: Duration) -> Self {
        Self::new(
            retry_limit as usize + 1,
            base_delay,
            base_delay.saturating_mul(64).min(Duration::from_secs(30)),
        )
    }

    /// Executes the operation, sleeping with exponential backoff between retryable failures.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        retries: attempt,
                    };
                }
                Err(err) => err,
            };

            let give_up = match classify(&err) {
                RetryDisposition::Stop => Some(RetryError::Fatal(err)),
                RetryDisposition::Retry if attempt + 1 >= self.max_attempts => {
                    Some(RetryError::AttemptsExceeded(err))
                }
                RetryDisposition::Retry => None,
            };

            if let Some(error) = give_up {
                return RetryOutcome {
                    result: Err(error),
                    retries: attempt,
                };
            }

            sleep(self.backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
