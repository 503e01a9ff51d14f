//! Periodic password-expiry scan feeding a bounded notification worker pool.
//!
//! One scheduler loop drives fixed-interval ticks. Each tick fetches the due
//! users and pushes one job per user onto a rendezvous channel shared by a
//! fixed set of worker tasks; the dispatcher then blocks until every pushed
//! job has been attempted, so at most one batch is ever in flight. On
//! cancellation the job channel is closed and all workers are joined before
//! [`PassExpiryWorker::run`] returns — in-flight jobs finish, nothing is
//! abandoned and no task leaks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::NotifyStore;
use crate::error::AppError;

/// Upper bound on a single `mark_notified` call. Deliberately decoupled from
/// the cancellation token: a job in flight during shutdown still runs to this
/// deadline, and a slow store call can never stall the pool past it.
const JOB_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminal status of [`PassExpiryWorker::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancellation observed; every worker drained and joined.
    Stopped,
}

/// One unit of work: notify a single user. The per-batch completion sender
/// travels with the job; each worker reports on it exactly once per job,
/// success or failure, and the dispatcher sees the batch drain once every
/// sender clone is gone.
struct Job {
    user_id: Uuid,
    done: mpsc::UnboundedSender<()>,
}

enum TickStatus {
    /// Full batch attempted.
    Completed { attempted: usize },
    /// Cancellation observed mid-batch; already-pushed jobs were drained.
    Cancelled,
}

/// Scans for users with expired passwords on a fixed interval and fans the
/// notification work out to `worker_count` tasks.
pub struct PassExpiryWorker {
    store: Arc<dyn NotifyStore>,
    tick_interval: Duration,
    worker_count: usize,
}

impl PassExpiryWorker {
    /// `worker_count` must be >= 1: with zero workers the dispatcher would
    /// block forever on the first push. `tick_interval` must be non-zero or
    /// the interval timer panics. `Config::from_env` rejects both.
    pub fn new(store: Arc<dyn NotifyStore>, tick_interval: Duration, worker_count: usize) -> Self {
        Self {
            store,
            tick_interval,
            worker_count,
        }
    }

    /// Run until `cancel` fires, then drain and return [`RunOutcome::Stopped`].
    ///
    /// The first tick fires one interval after the call. A failed scan is
    /// logged and the loop moves on to the next tick; only cancellation
    /// terminates the loop. Holds no cross-run state: calling `run` again
    /// after it returns behaves identically.
    pub async fn run(&self, cancel: CancellationToken) -> RunOutcome {
        // Rendezvous channel: a push completes only when a worker takes the
        // job, so dispatch rate is throttled to worker throughput and a
        // closed channel never strands queued jobs.
        let (jobs_tx, jobs_rx) = flume::bounded::<Job>(0);
        let workers: Vec<_> = (1..=self.worker_count)
            .map(|n| tokio::spawn(worker_loop(n, Arc::clone(&self.store), jobs_rx.clone())))
            .collect();
        drop(jobs_rx);

        let mut ticker = time::interval_at(
            Instant::now() + self.tick_interval,
            self.tick_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break RunOutcome::Stopped,
                _ = ticker.tick() => match self.dispatch(&cancel, &jobs_tx).await {
                    Ok(TickStatus::Completed { attempted }) if attempted > 0 => {
                        info!(attempted, "expiry notification batch complete");
                    }
                    Ok(TickStatus::Completed { .. }) => {}
                    Ok(TickStatus::Cancelled) => break RunOutcome::Stopped,
                    Err(e) => warn!(error = %e, "password expiry scan failed"),
                },
            }
        };

        // Closing the channel is the stop signal for the workers: they exit
        // once it is drained.
        drop(jobs_tx);
        join_all(workers).await;
        info!("password expiry worker stopped");
        outcome
    }

    /// One dispatch cycle: fetch the due users, push one job per user, then
    /// block (no spinning) until every pushed job has been attempted.
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        jobs: &flume::Sender<Job>,
    ) -> Result<TickStatus, AppError> {
        // No jobs exist yet, so abandoning the fetch on cancellation is safe;
        // once pushing starts, cancellation waits for the pushed jobs instead.
        let due = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TickStatus::Cancelled),
            due = self.store.expired_unnotified() => due?,
        };
        if due.is_empty() {
            return Ok(TickStatus::Completed { attempted: 0 });
        }

        let total = due.len();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut cancelled = false;
        let mut pushed = 0usize;
        for user_id in due {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let job = Job {
                user_id,
                done: done_tx.clone(),
            };
            if jobs.send_async(job).await.is_err() {
                // All workers gone; only possible on shutdown.
                cancelled = true;
                break;
            }
            pushed += 1;
        }
        drop(done_tx);

        // The channel closes once the last job's sender is dropped, which
        // happens after that job has been attempted.
        let mut attempted = 0usize;
        while done_rx.recv().await.is_some() {
            attempted += 1;
        }
        debug_assert_eq!(attempted, pushed);

        if cancelled {
            info!(attempted, total, "notification batch cut short by shutdown");
            Ok(TickStatus::Cancelled)
        } else {
            Ok(TickStatus::Completed { attempted })
        }
    }
}

/// Worker task: take jobs until the channel is closed and drained. A job
/// counts as done once attempted; failures are logged, never retried.
async fn worker_loop(n: usize, store: Arc<dyn NotifyStore>, jobs: flume::Receiver<Job>) {
    debug!(worker = n, "notification worker started");
    while let Ok(job) = jobs.recv_async().await {
        match time::timeout(JOB_TIMEOUT, store.mark_notified(job.user_id)).await {
            Ok(Ok(())) => debug!(worker = n, user = %job.user_id, "notification sent"),
            Ok(Err(e)) => {
                warn!(worker = n, user = %job.user_id, error = %e, "notification update failed");
            }
            Err(_) => warn!(worker = n, user = %job.user_id, "notification update timed out"),
        }
        let _ = job.done.send(());
    }
    debug!(worker = n, "notification worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store with scripted fetch results. Once the script runs out,
    /// fetches return an empty batch.
    struct MockStore {
        batches: Mutex<VecDeque<Result<Vec<Uuid>, String>>>,
        marked: Mutex<Vec<Uuid>>,
        fetch_calls: AtomicUsize,
        fetch_delay: Duration,
        fail_mark_for: Option<Uuid>,
        mark_delay: Duration,
        cancel_on_mark: Option<CancellationToken>,
    }

    impl MockStore {
        fn scripted(batches: Vec<Result<Vec<Uuid>, String>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                marked: Mutex::new(Vec::new()),
                fetch_calls: AtomicUsize::new(0),
                fetch_delay: Duration::ZERO,
                fail_mark_for: None,
                mark_delay: Duration::ZERO,
                cancel_on_mark: None,
            }
        }

        fn marked(&self) -> Vec<Uuid> {
            self.marked.lock().unwrap().clone()
        }

        fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotifyStore for MockStore {
        async fn expired_unnotified(&self) -> AppResult<Vec<Uuid>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                time::sleep(self.fetch_delay).await;
            }
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(Ok(ids)) => Ok(ids),
                Some(Err(msg)) => Err(AppError::Internal(anyhow::anyhow!(msg))),
                None => Ok(Vec::new()),
            }
        }

        async fn mark_notified(&self, id: Uuid) -> AppResult<()> {
            if !self.mark_delay.is_zero() {
                time::sleep(self.mark_delay).await;
            }
            if let Some(token) = &self.cancel_on_mark {
                token.cancel();
            }
            self.marked.lock().unwrap().push(id);
            if self.fail_mark_for == Some(id) {
                return Err(AppError::Internal(anyhow::anyhow!("simulated update failure")));
            }
            Ok(())
        }
    }

    fn spawn_run(
        store: Arc<MockStore>,
        tick: Duration,
        workers: usize,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<RunOutcome> {
        let worker = PassExpiryWorker::new(store, tick, workers);
        tokio::spawn(async move { worker.run(cancel).await })
    }

    #[tokio::test]
    async fn dispatches_every_due_user_exactly_once() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let store = Arc::new(MockStore::scripted(vec![Ok(ids.clone())]));
        let cancel = CancellationToken::new();
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 2, cancel.clone());

        time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), RunOutcome::Stopped);

        let mut marked = store.marked();
        marked.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(marked, expected);
    }

    #[tokio::test]
    async fn batch_state_resets_between_ticks() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let store = Arc::new(MockStore::scripted(vec![Ok(vec![a]), Ok(vec![b])]));
        let cancel = CancellationToken::new();
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 2, cancel.clone());

        time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), RunOutcome::Stopped);

        // Both batches went through, so the first batch's completion state
        // did not bleed into the second.
        assert_eq!(store.marked(), vec![a, b]);
    }

    #[tokio::test]
    async fn cancel_before_first_tick_stops_without_fetching() {
        let store = Arc::new(MockStore::scripted(vec![Ok(vec![Uuid::new_v4()])]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = spawn_run(store.clone(), Duration::from_secs(3600), 2, cancel);

        let outcome = time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run should stop promptly")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(store.fetch_calls(), 0);
        assert!(store.marked().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_skips_tick_and_scan_continues() {
        let id = Uuid::new_v4();
        let store = Arc::new(MockStore::scripted(vec![
            Err("db unavailable".to_string()),
            Ok(vec![id]),
        ]));
        let cancel = CancellationToken::new();
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 2, cancel.clone());

        time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), RunOutcome::Stopped);

        assert!(store.fetch_calls() >= 2, "scan should survive a fetch error");
        assert_eq!(store.marked(), vec![id]);
    }

    #[tokio::test]
    async fn failed_update_still_counts_toward_batch_completion() {
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let after = Uuid::new_v4();
        let mut store = MockStore::scripted(vec![Ok(ids.clone()), Ok(vec![after])]);
        store.fail_mark_for = Some(ids[2]);
        let store = Arc::new(store);
        let cancel = CancellationToken::new();
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 1, cancel.clone());

        time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), RunOutcome::Stopped);

        // All five attempts were made despite the failure, and the scheduler
        // moved on to the next batch.
        let marked = store.marked();
        assert_eq!(marked.len(), 6);
        assert!(marked.contains(&ids[2]));
        assert_eq!(marked[5], after);
    }

    #[tokio::test]
    async fn cancel_mid_batch_drains_pushed_jobs_and_stops() {
        let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        let cancel = CancellationToken::new();
        let mut store = MockStore::scripted(vec![Ok(ids)]);
        store.mark_delay = Duration::from_millis(20);
        store.cancel_on_mark = Some(cancel.clone());
        let store = Arc::new(store);
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 1, cancel);

        let outcome = time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run should drain and stop")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);

        // The first attempt triggered cancellation: some jobs were never
        // pushed, but every pushed job was attempted before shutdown.
        let attempts = store.marked().len();
        assert!(attempts >= 1 && attempts < 10, "attempts = {}", attempts);
    }

    #[tokio::test]
    async fn hung_fetch_does_not_block_shutdown() {
        let mut store = MockStore::scripted(vec![Ok(vec![Uuid::new_v4()])]);
        store.fetch_delay = Duration::from_secs(3600);
        let store = Arc::new(store);
        let cancel = CancellationToken::new();
        let handle = spawn_run(store.clone(), Duration::from_millis(10), 2, cancel.clone());

        // Let the tick fire and the fetch stall, then cancel.
        time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let outcome = time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("shutdown should not wait on the stalled fetch")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(store.fetch_calls(), 1);
        assert!(store.marked().is_empty());
    }

    #[tokio::test]
    async fn run_twice_sequentially_behaves_identically() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let store = Arc::new(MockStore::scripted(vec![Ok(vec![a])]));
        let worker = Arc::new(PassExpiryWorker::new(
            store.clone(),
            Duration::from_millis(10),
            2,
        ));

        for (batch, expected) in [(None, vec![a]), (Some(vec![b]), vec![a, b])] {
            if let Some(ids) = batch {
                store.batches.lock().unwrap().push_back(Ok(ids));
            }
            let cancel = CancellationToken::new();
            let w = Arc::clone(&worker);
            let c = cancel.clone();
            let handle = tokio::spawn(async move { w.run(c).await });
            time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
            assert_eq!(handle.await.unwrap(), RunOutcome::Stopped);
            assert_eq!(store.marked(), expected);
        }
    }
}
