use std::time::Duration;

use tracing::debug;

use super::AnnotationSource;

/// Delay between two attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Annotation key to wait for and the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySpec {
    pub key: String,
    /// Number of checks; values below one still perform a single check
    pub max_attempts: u32,
}

impl RetrySpec {
    pub fn new(key: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            key: key.into(),
            max_attempts,
        }
    }
}

/// Bounded polling for the appearance of an annotation key.
///
/// Constant interval, no backoff. A source that fails to produce a snapshot
/// counts as "not present" for that attempt, so an absent object and an
/// absent key look the same once the budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationWaiter {
    interval: Duration,
}

impl Default for AnnotationWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL)
    }
}

impl AnnotationWaiter {
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns whether `spec.key` was found within `spec.max_attempts` checks.
    ///
    /// Sleeps only between attempts: the worst case is
    /// `(max_attempts - 1) * interval`.
    #[tracing::instrument(skip(self, source), fields(key = %spec.key, max_attempts = spec.max_attempts))]
    pub async fn wait<S: AnnotationSource>(&self, source: &S, spec: &RetrySpec) -> bool {
        let max_attempts = spec.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match source.annotations().await {
                Ok(annotations) if annotations.contains_key(&spec.key) => {
                    debug!(attempt, "Annotation present");
                    return true;
                }
                Ok(_) => debug!(attempt, "Annotation not present yet"),
                Err(e) => debug!(attempt, "Annotation snapshot unavailable: {e:?}"),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        debug!("Retry budget exhausted");
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use error_stack::Report;
    use similar_asserts::assert_eq;
    use test_log::test;
    use tokio::time::Instant;

    use super::*;
    use crate::annotation::AnnotationError;

    const KEY: &str = "example.com/ready";

    /// Reports the key from the `present_from`-th snapshot on.
    struct AppearingSource {
        snapshots: AtomicU32,
        present_from: u32,
    }

    impl AppearingSource {
        fn new(present_from: u32) -> Self {
            Self {
                snapshots: AtomicU32::new(0),
                present_from,
            }
        }

        fn snapshots(&self) -> u32 {
            self.snapshots.load(Ordering::SeqCst)
        }
    }

    impl AnnotationSource for AppearingSource {
        async fn annotations(&self) -> Result<BTreeMap<String, String>, Report<AnnotationError>> {
            let snapshot = self.snapshots.fetch_add(1, Ordering::SeqCst) + 1;
            let mut annotations = BTreeMap::new();
            if snapshot >= self.present_from {
                annotations.insert(KEY.to_string(), String::new());
            }
            Ok(annotations)
        }
    }

    struct FailingSource;

    impl AnnotationSource for FailingSource {
        async fn annotations(&self) -> Result<BTreeMap<String, String>, Report<AnnotationError>> {
            Err(Report::new(AnnotationError::Fetch {
                pod: "default/gone".to_string(),
            }))
        }
    }

    #[test(tokio::test(start_paused = true))]
    async fn present_on_first_check() {
        let source = AppearingSource::new(1);
        let start = Instant::now();

        assert!(AnnotationWaiter::default().wait(&source, &RetrySpec::new(KEY, 1)).await);

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(source.snapshots(), 1);
    }

    #[test(tokio::test(start_paused = true))]
    async fn single_attempt_does_not_sleep() {
        let source = BTreeMap::<String, String>::new();
        let start = Instant::now();

        assert!(!AnnotationWaiter::default().wait(&source, &RetrySpec::new(KEY, 1)).await);

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test(tokio::test(start_paused = true))]
    async fn found_after_one_retry() {
        let source = AppearingSource::new(2);
        let waiter = AnnotationWaiter::default();
        let start = Instant::now();

        assert!(waiter.wait(&source, &RetrySpec::new(KEY, 3)).await);

        let elapsed = start.elapsed();
        assert!(elapsed >= waiter.interval(), "elapsed {elapsed:?}");
        assert!(elapsed < waiter.interval() * 2, "elapsed {elapsed:?}");
        assert_eq!(source.snapshots(), 2);
    }

    #[test(tokio::test(start_paused = true))]
    async fn exhausted_budget_sleeps_between_attempts_only() {
        let source = AppearingSource::new(u32::MAX);
        let waiter = AnnotationWaiter::new(Duration::from_millis(250));
        let start = Instant::now();

        assert!(!waiter.wait(&source, &RetrySpec::new(KEY, 4)).await);

        assert_eq!(source.snapshots(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(750), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "elapsed {elapsed:?}");
    }

    #[test(tokio::test(start_paused = true))]
    async fn zero_attempts_still_checks_once() {
        let source = AppearingSource::new(1);

        assert!(AnnotationWaiter::default().wait(&source, &RetrySpec::new(KEY, 0)).await);
        assert_eq!(source.snapshots(), 1);
    }

    #[test(tokio::test(start_paused = true))]
    async fn snapshot_failures_count_as_absent() {
        assert!(
            !AnnotationWaiter::default()
                .wait(&FailingSource, &RetrySpec::new(KEY, 3))
                .await
        );
    }
}
