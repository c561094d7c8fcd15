//! Credential rotation retry
//!
//! A single policy shared by the search and completion call sites: run an
//! operation with a fresh credential, and on an error the caller classifies
//! as rotatable, try again with the next one, up to the pool size.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::credentials::{Credential, RotatingCredentials};

/// Outcome of a failed rotated call
#[derive(Debug)]
pub enum RotationError<E> {
    /// Non-rotatable error, returned on the attempt that produced it
    Fatal(E),
    /// Every attempt failed with a rotatable error
    Exhausted { attempts: usize, last: E },
}

impl<E> RotationError<E> {
    /// The underlying error, whichever way the call failed
    pub fn into_inner(self) -> E {
        match self {
            RotationError::Fatal(e) => e,
            RotationError::Exhausted { last, .. } => last,
        }
    }
}

/// Backoff between rotated attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Base delay for exponential backoff (zero disables sleeping)
    pub backoff_base: Duration,
    /// Maximum delay between attempts
    pub backoff_max: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::ZERO,
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl RotationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backoff base duration
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set maximum backoff duration
    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Delay before the retry following failed attempt `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        self.backoff_base.saturating_mul(multiplier).min(self.backoff_max)
    }

    /// Run `op` with rotated credentials.
    ///
    /// At most `credentials.len()` attempts are made. Under concurrent use
    /// the attempts draw from the shared cursor, so they are not guaranteed
    /// to hit distinct credentials.
    pub async fn run<T, E, C, F, Fut>(
        &self,
        credentials: &RotatingCredentials,
        operation: &str,
        is_rotatable: C,
        mut op: F,
    ) -> Result<T, RotationError<E>>
    where
        E: Display,
        C: Fn(&E) -> bool,
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = credentials.len();
        let mut failed = 0;

        loop {
            let credential = credentials.next();
            let key = credential.index + 1;

            match op(credential).await {
                Ok(value) => {
                    if failed > 0 {
                        debug!(operation, key, failed, "Succeeded after rotating credentials");
                    }
                    return Ok(value);
                }
                Err(e) if !is_rotatable(&e) => return Err(RotationError::Fatal(e)),
                Err(e) => {
                    failed += 1;
                    if failed >= attempts {
                        warn!(operation, attempts, error = %e, "All credentials exhausted");
                        return Err(RotationError::Exhausted { attempts, last: e });
                    }

                    warn!(operation, key, attempt = failed, error = %e, "Credential exhausted, rotating");
                    let delay = self.delay_for_attempt(failed - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Quota,
        Broken,
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn pool(n: usize) -> RotatingCredentials {
        RotatingCredentials::new("test", (0..n).map(|i| format!("k{}", i)).collect()).unwrap()
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let creds = pool(3);
        let calls = AtomicUsize::new(0);

        let result: Result<&str, RotationError<FakeError>> = RotationPolicy::default()
            .run(&creds, "test", |e: &FakeError| *e == FakeError::Quota, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotates_until_success() {
        let creds = pool(3);
        let seen = Mutex::new(Vec::new());

        let result = RotationPolicy::default()
            .run(&creds, "test", |e: &FakeError| *e == FakeError::Quota, |cred| {
                seen.lock().unwrap().push(cred.secret.clone());
                let outcome = if cred.index < 2 { Err(FakeError::Quota) } else { Ok(cred.index) };
                async move { outcome }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["k0", "k1", "k2"]);
    }

    #[tokio::test]
    async fn test_exhausted_after_pool_size_attempts() {
        let creds = pool(4);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = RotationPolicy::default()
            .run(&creds, "test", |e: &FakeError| *e == FakeError::Quota, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Quota) }
            })
            .await;

        assert!(matches!(
            result,
            Err(RotationError::Exhausted { attempts: 4, last: FakeError::Quota })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_rotatable_error_stops_immediately() {
        let creds = pool(4);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = RotationPolicy::default()
            .run(&creds, "test", |e: &FakeError| *e == FakeError::Quota, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Broken) }
            })
            .await;

        assert!(matches!(result, Err(RotationError::Fatal(FakeError::Broken))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_for_attempt_caps() {
        let policy = RotationPolicy::new()
            .with_backoff_base(Duration::from_millis(100))
            .with_backoff_max(Duration::from_millis(350));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
    }

    #[test]
    fn test_default_policy_never_sleeps() {
        assert!(RotationPolicy::default().delay_for_attempt(3).is_zero());
    }

    #[test]
    fn test_into_inner() {
        let fatal: RotationError<FakeError> = RotationError::Fatal(FakeError::Broken);
        assert_eq!(fatal.into_inner(), FakeError::Broken);

        let exhausted = RotationError::Exhausted { attempts: 2, last: FakeError::Quota };
        assert_eq!(exhausted.into_inner(), FakeError::Quota);
    }
}
