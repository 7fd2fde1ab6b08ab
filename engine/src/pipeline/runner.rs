//! Bounded worker pool
//!
//! A fixed number of workers drain a shared task queue. Each task runs with
//! its own timeout and retry budget; a task that still fails leaves `None` in
//! its result slot and never cancels its siblings. Results come back over a
//! channel and land in a slot vector sized to the input, so output order
//! always matches input order.
//!
//! Workers are plain futures polled together on the calling task, so tasks
//! may borrow from the caller.

use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry budget for a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Attempt `n` (1-based) waits `n * backoff` before retrying
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Errors the pool may retry
///
/// Errors that say a retry cannot help (bad credentials, a rejected request)
/// fail the task on the first attempt.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for String {}
impl Retryable for &str {}
impl Retryable for anyhow::Error {}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(5_000),
        }
    }
}

/// Outcome of one pool run
#[derive(Debug)]
pub struct PoolOutput<R> {
    /// One slot per input task, in input order
    pub results: Vec<Option<R>>,
    /// Tasks that exhausted their retries or timed out
    pub failed: usize,
    /// Tasks never started because the deadline had passed
    pub skipped: usize,
}

impl<R> PoolOutput<R> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    /// Successful results in input order
    pub fn into_successes(self) -> impl Iterator<Item = R> {
        self.results.into_iter().flatten()
    }
}

enum SlotResult<R> {
    Done(R),
    Failed,
    Skipped,
}

/// Executes independent async tasks with at most `concurrency` in flight
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    retry: RetryPolicy,
    task_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl WorkerPool {
    /// Create a pool; a concurrency of 0 is treated as 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry: RetryPolicy::default(),
            task_timeout: None,
            deadline: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Abandon any single attempt that runs longer than `timeout`
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Stop starting new tasks (and new retries) once `deadline` has passed
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `task` over every item.
    ///
    /// The returned slot vector has exactly `items.len()` entries.
    pub async fn run<T, R, E, F, Fut>(&self, items: Vec<T>, task: F) -> PoolOutput<R>
    where
        T: Clone,
        E: Retryable,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let total = items.len();
        let queue: Mutex<VecDeque<(usize, T)>> =
            Mutex::new(items.into_iter().enumerate().collect());
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, SlotResult<R>)>();

        let workers = self.concurrency.min(total);
        debug!("Worker pool starting {} tasks on {} workers", total, workers);

        let worker_futures = (0..workers).map(|worker_id| {
            let tx = tx.clone();
            let queue = &queue;
            let task = &task;
            async move {
                loop {
                    let next = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some((idx, item)) = next else { break };

                    let outcome = self.run_one(worker_id, idx, item, task).await;
                    // Receiver outlives every worker; a send error cannot happen
                    let _ = tx.send((idx, outcome));
                }
            }
        });

        join_all(worker_futures).await;
        drop(tx);

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut failed = 0;
        let mut skipped = 0;
        while let Ok((idx, outcome)) = rx.try_recv() {
            match outcome {
                SlotResult::Done(r) => results[idx] = Some(r),
                SlotResult::Failed => failed += 1,
                SlotResult::Skipped => skipped += 1,
            }
        }

        PoolOutput {
            results,
            failed,
            skipped,
        }
    }

    async fn run_one<T, R, E, F, Fut>(
        &self,
        worker_id: usize,
        idx: usize,
        item: T,
        task: &F,
    ) -> SlotResult<R>
    where
        T: Clone,
        E: Retryable,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.past_deadline() {
                debug!("Task {} skipped: invocation deadline passed", idx);
                return SlotResult::Skipped;
            }

            let fut = task(item.clone());
            let result = match self.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(r) => r.map_err(|e| (e.is_retryable(), e.to_string())),
                    Err(_) => Err((true, format!("timed out after {:?}", limit))),
                },
                None => fut.await.map_err(|e| (e.is_retryable(), e.to_string())),
            };

            match result {
                Ok(r) => return SlotResult::Done(r),
                Err((retryable, e)) => {
                    attempt += 1;
                    if !retryable || attempt > self.retry.max_retries {
                        warn!(
                            "Task {} failed after {} attempt(s) on worker {}: {}",
                            idx, attempt, worker_id, e
                        );
                        return SlotResult::Failed;
                    }
                    let delay = self.retry.delay(attempt);
                    debug!(
                        "Task {} attempt {} failed ({}), retrying in {:?}",
                        idx, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Run every probe and return the first success in input order.
    ///
    /// All probes run in parallel (bounded by the pool); a later probe that
    /// finishes first does not win over an earlier successful one.
    pub async fn first_success<T, R, E, F, Fut>(&self, items: Vec<T>, task: F) -> Option<R>
    where
        T: Clone,
        E: Retryable,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.run(items, task).await.into_successes().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let pool = WorkerPool::new(3).with_retry(RetryPolicy::none());
        let output = pool
            .run((0..10u64).collect(), |n| async move {
                // Later items finish first
                tokio::time::sleep(Duration::from_millis(20 - n * 2)).await;
                Ok::<_, String>(n * 10)
            })
            .await;

        let values: Vec<_> = output.results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..10u64).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_task_leaves_empty_slot() {
        let pool = WorkerPool::new(2).with_retry(RetryPolicy::none());
        let output = pool
            .run(vec![1, 2, 3], |n| async move {
                if n == 2 {
                    Err("boom".to_string())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(output.results, vec![Some(1), None, Some(3)]);
        assert_eq!(output.failed, 1);
        assert_eq!(output.succeeded(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff() {
        let calls = AtomicUsize::new(0);
        let pool = WorkerPool::new(1).with_retry(RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_secs(5),
        });

        let started = Instant::now();
        let output = pool
            .run(vec![()], |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("flaky")
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(output.results, vec![Some("done")]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5s after the first failure, 10s after the second
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[derive(Debug)]
    struct Permanent;

    impl std::fmt::Display for Permanent {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "rejected")
        }
    }

    impl Retryable for Permanent {
        fn is_retryable(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let pool = WorkerPool::new(1).with_retry(RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_secs(5),
        });

        let output = pool
            .run(vec![()], |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Permanent) }
            })
            .await;

        assert_eq!(output.failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout_does_not_cancel_siblings() {
        let pool = WorkerPool::new(4)
            .with_retry(RetryPolicy::none())
            .with_task_timeout(Duration::from_secs(1));

        let output = pool
            .run(vec![0u64, 5, 0, 0], |secs| async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok::<_, String>(secs)
            })
            .await;

        assert_eq!(output.results, vec![Some(0), None, Some(0), Some(0)]);
        assert_eq!(output.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_skips_unstarted_tasks() {
        let pool = WorkerPool::new(1)
            .with_retry(RetryPolicy::none())
            .with_deadline(Instant::now() + Duration::from_secs(3));

        let output = pool
            .run(vec![2u64, 2, 2], |secs| async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok::<_, String>(secs)
            })
            .await;

        assert_eq!(output.results.len(), 3);
        assert_eq!(output.succeeded(), 2);
        assert_eq!(output.skipped, 1);
    }

    #[tokio::test]
    async fn test_first_success_prefers_input_order() {
        let pool = WorkerPool::new(3).with_retry(RetryPolicy::none());
        let probes = vec![("a", 30u64, false), ("b", 20, true), ("c", 1, true)];
        let winner = pool
            .first_success(probes, |(name, ms, ok)| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                if ok {
                    Ok(name)
                } else {
                    Err("404")
                }
            })
            .await;

        assert_eq!(winner, Some("b"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pool = WorkerPool::new(5);
        let output = pool.run(Vec::<u8>::new(), |n| async move { Ok::<_, String>(n) }).await;
        assert!(output.results.is_empty());
    }
}
