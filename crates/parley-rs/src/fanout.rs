//! Bounded concurrent execution with input-ordered results.
//!
//! [`FanOut`] runs one task per input with at most `k` admitted at a time.
//! Admission goes through a FIFO [`tokio::sync::Semaphore`], so tasks start
//! in input order, and results always come back in input order whatever
//! order the tasks finish in.
//!
//! Two failure policies:
//!
//! - [`FanOut::run`] is fail-fast. The first failure drops every task still
//!   running or waiting and is returned as [`Error::Item`] with its index.
//! - [`FanOut::run_isolated`] runs every task and returns one `Result` per
//!   input.
//!
//! Tasks run on the caller's task (no `spawn`), so they may borrow from the
//! caller. Dropping the returned future cancels everything.
//!
//! ```ignore
//! let fan = FanOut::new(5)?.with_timeout(Duration::from_secs(60));
//! let pages = fan
//!     .run(images, |i, image| agent.run(Prompt::new(format!("Page {i}")).with_image("image/jpeg", &image), &[]))
//!     .await?;
//! ```

use crate::Error;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Concurrency cap used by the demonstrations.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A shareable flag that stops further admissions once tripped.
///
/// Tasks already admitted run to completion; tasks still waiting fail with
/// [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FanOut {
    limit: usize,
    per_call_timeout: Option<Duration>,
    stop: Option<StopSignal>,
}

impl FanOut {
    /// A runner admitting at most `limit` tasks at once. `limit` must be at
    /// least 1.
    pub fn new(limit: usize) -> Result<Self, Error> {
        if limit == 0 {
            return Err(Error::config(
                "concurrency",
                "fan-out limit must be at least 1",
            ));
        }
        Ok(Self {
            limit,
            per_call_timeout: None,
            stop: None,
        })
    }

    /// Fail any single task that runs longer than `timeout` with
    /// [`Error::Timeout`]. Waiting for admission does not count.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = Some(timeout);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task(index, input)` for every input, fail-fast.
    ///
    /// On success the i-th output belongs to the i-th input. On failure the
    /// error of the first task to fail is returned wrapped in
    /// [`Error::Item`] (a stop signal yields bare [`Error::Cancelled`]).
    pub async fn run<I, T, F, Fut>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        task: F,
    ) -> Result<Vec<T>, Error>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let semaphore = Semaphore::new(self.limit);
        let start = Instant::now();
        let futures: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let semaphore = &semaphore;
                let task = &task;
                async move {
                    self.admit_and_run(semaphore, index, input, task)
                        .await
                        .map_err(|e| match e {
                            Error::Cancelled => Error::Cancelled,
                            source => Error::Item {
                                index,
                                source: Box::new(source),
                            },
                        })
                }
            })
            .collect();
        let total = futures.len();
        debug!("Fan-out: {total} task(s), limit {}", self.limit);

        let results = futures::future::try_join_all(futures).await;
        match &results {
            Ok(_) => debug!(
                "Fan-out: {total} task(s) done in {:.1}s",
                start.elapsed().as_secs_f64()
            ),
            Err(e) => debug!("Fan-out aborted: {e}"),
        }
        results
    }

    /// Run `task(index, input)` for every input and keep each outcome.
    pub async fn run_isolated<I, T, F, Fut>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        task: F,
    ) -> Vec<Result<T, Error>>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let semaphore = Semaphore::new(self.limit);
        let futures: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| self.admit_and_run(&semaphore, index, input, &task))
            .collect();
        debug!(
            "Fan-out (isolated): {} task(s), limit {}",
            futures.len(),
            self.limit
        );

        let results = futures::future::join_all(futures).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            debug!("Fan-out (isolated): {failed} of {} task(s) failed", results.len());
        }
        results
    }

    async fn admit_and_run<I, T, F, Fut>(
        &self,
        semaphore: &Semaphore,
        index: usize,
        input: I,
        task: &F,
    ) -> Result<T, Error>
    where
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let _permit = semaphore.acquire().await.map_err(|_| Error::Cancelled)?;
        if self.stop.as_ref().is_some_and(StopSignal::is_stopped) {
            return Err(Error::Cancelled);
        }
        match self.per_call_timeout {
            Some(limit) => tokio::time::timeout(limit, task(index, input))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => task(index, input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Tracks how many tasks are inside their body at once.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        async fn hold(&self, ms: u64) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let gauge = Gauge::default();
        let fan = FanOut::new(2).unwrap();
        let out = fan
            .run(0..6, |_, n| {
                let gauge = &gauge;
                async move {
                    gauge.hold(15).await;
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn results_follow_input_order_not_completion_order() {
        let fan = FanOut::new(4).unwrap();
        // Later inputs finish first.
        let out = fan
            .run(vec![40u64, 30, 20, 10], |i, ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(format!("{i}:{ms}"))
            })
            .await
            .unwrap();
        assert_eq!(out, vec!["0:40", "1:30", "2:20", "3:10"]);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch_with_its_index() {
        let fan = FanOut::new(3).unwrap();
        let err = fan
            .run(0..5, |i, _| async move {
                if i == 2 {
                    Err(Error::Http {
                        status: 500,
                        body: "boom".into(),
                    })
                } else {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(i)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Item { index: 2, .. }));
        assert!(matches!(err.root(), Error::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn isolated_policy_keeps_every_outcome() {
        let fan = FanOut::new(2).unwrap();
        let out = fan
            .run_isolated(0..4, |i, _| async move {
                if i % 2 == 1 {
                    Err(Error::Api(format!("bad {i}")))
                } else {
                    Ok(i * 10)
                }
            })
            .await;
        assert_eq!(out.len(), 4);
        assert_eq!(*out[0].as_ref().unwrap(), 0);
        assert!(out[1].is_err());
        assert_eq!(*out[2].as_ref().unwrap(), 20);
        assert!(out[3].is_err());
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let fan = FanOut::new(1)
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let out = fan
            .run_isolated([5u64, 500], |_, ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            })
            .await;
        assert_eq!(*out[0].as_ref().unwrap(), 5);
        assert!(matches!(out[1], Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn stop_signal_cancels_pending_admissions() {
        let stop = StopSignal::new();
        let fan = FanOut::new(1).unwrap().with_stop_signal(stop.clone());
        let out = fan
            .run_isolated(0..3, |i, _| {
                let stop = stop.clone();
                async move {
                    stop.stop();
                    Ok(i)
                }
            })
            .await;
        assert_eq!(*out[0].as_ref().unwrap(), 0);
        assert!(matches!(out[1], Err(Error::Cancelled)));
        assert!(matches!(out[2], Err(Error::Cancelled)));
    }

    #[test]
    fn zero_limit_is_config_error() {
        let err = FanOut::new(0).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let fan = FanOut::new(DEFAULT_CONCURRENCY).unwrap();
        let out: Vec<u8> = fan
            .run(Vec::<u8>::new(), |_, n| async move { Ok(n) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
