//! The single worker draining the queue.
//!
//! The dispatcher is one spawned task. It claims the oldest queued job, runs it to completion
//! through the [`JobRunner`], and immediately looks for the next one. When the queue is empty it
//! sleeps until an enqueue wakes it up, or until the poll interval elapses.
//!
//! Since only this task ever starts jobs, and it never starts one before the previous job has been
//! recorded as completed or failed, at most one job is running at any time. The store backs this
//! up by refusing to start a job while another one is running.
//!
//! The dispatcher owns the queue's dispatcher slot for as long as it runs. Once it stops, by
//! cancellation or because its handle was dropped, a new dispatcher can be spawned.
use std::{sync::Arc, time::Duration};

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    job::{runner::JobRunner, Job},
    notifier::{DispatcherGuard, Notifier},
    store::{JobStore, StoreError, Transition},
};

pub(crate) struct Dispatcher<S>
where
    S: JobStore,
{
    ready_jobs: ReadyJobStream<S>,
    runner: JobRunner<S>,
    slot: DispatcherGuard,
}

impl<S> Dispatcher<S>
where
    S: JobStore,
{
    pub(crate) fn new(
        store: S,
        runner: JobRunner<S>,
        slot: DispatcherGuard,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ready_jobs: ReadyJobStream {
                store,
                notifier: slot.notifier(),
                poll_interval,
            },
            runner,
            slot,
        }
    }

    pub(crate) fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancellation_token))
    }

    async fn run(self, cancellation_token: CancellationToken) {
        let Self {
            ready_jobs,
            runner,
            slot,
        } = self;
        let poll_interval = ready_jobs.poll_interval;
        let stream = ready_jobs.into_stream();
        tokio::pin!(stream);

        tracing::debug!("Fetch queue dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(job)) => runner.execute_job(job).await,
                    Some(Err(err)) => {
                        tracing::error!(?err, "Failed to claim the next job: {err}");
                        tokio::time::sleep(poll_interval).await;
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Shutting down fetch queue dispatcher");
        drop(slot);
    }
}

/// Yields queued jobs in FIFO order, each one already claimed as running.
struct ReadyJobStream<S>
where
    S: JobStore,
{
    store: S,
    notifier: Arc<Notifier>,
    poll_interval: Duration,
}

impl<S> ReadyJobStream<S>
where
    S: JobStore,
{
    async fn next(&mut self) -> Result<Job, StoreError> {
        loop {
            match self.claim_next().await {
                Ok(Some(job)) => return Ok(job),
                Ok(None) => {}
                Err(StoreError::AlreadyRunning(running)) => {
                    tracing::warn!(
                        %running,
                        "Job {running} is still running, waiting before claiming the next job"
                    );
                }
                Err(err) => return Err(err),
            }
            tokio::select! {
                _ = self.notifier.woken() => {},
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }
    }

    /// Claim the oldest queued job.
    ///
    /// Losing the claim to someone else, for example a cancel landing between reading and
    /// claiming, is not an error: the next queued job is tried instead.
    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        loop {
            let Some(job) = self.store.next_queued().await? else {
                return Ok(None);
            };
            match self.store.transition(job.id, Transition::Start).await {
                Ok(job) => {
                    tracing::debug!(job_id = %job.id, "Claimed job {}", job.id);
                    return Ok(Some(job));
                }
                Err(StoreError::InvalidTransition { id, from, .. }) => {
                    tracing::debug!(%id, %from, "Job {id} is no longer queued, retrying");
                }
                Err(StoreError::JobNotFound(id)) => {
                    tracing::debug!(%id, "Job {id} disappeared before it was claimed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn into_stream(mut self) -> impl Stream<Item = Result<Job, StoreError>> {
        stream! {
            loop {
                yield self.next().await;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        executor::ExecutionResult,
        job::{FetchRequest, JobStatus},
        store::memory::InMemoryStore,
    };

    use super::*;

    fn ready_jobs(store: InMemoryStore) -> (ReadyJobStream<InMemoryStore>, Arc<Notifier>) {
        let notifier = Arc::new(Notifier::default());
        (
            ReadyJobStream {
                store,
                notifier: notifier.clone(),
                poll_interval: Duration::from_secs(30),
            },
            notifier,
        )
    }

    #[tokio::test]
    async fn claims_oldest_queued_job() {
        let store = InMemoryStore::new();
        let first = store
            .insert(FetchRequest::new("D1", "prospect"))
            .await
            .unwrap();
        store.insert(FetchRequest::new("D2", "pkb")).await.unwrap();
        let (mut ready_jobs, _notifier) = ready_jobs(store.clone());

        let job = ready_jobs.next().await.unwrap();

        assert_eq!(job.id, first.id);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(
            store.get(first.id).await.unwrap().status,
            JobStatus::Running
        );
    }

    #[tokio::test]
    async fn skips_cancelled_jobs() {
        let store = InMemoryStore::new();
        let first = store
            .insert(FetchRequest::new("D1", "prospect"))
            .await
            .unwrap();
        let second = store.insert(FetchRequest::new("D2", "pkb")).await.unwrap();
        store.transition(first.id, Transition::Cancel).await.unwrap();
        let (mut ready_jobs, _notifier) = ready_jobs(store);

        let job = ready_jobs.next().await.unwrap();

        assert_eq!(job.id, second.id);
    }

    #[tokio::test]
    async fn enqueue_wakes_idle_stream() {
        let store = InMemoryStore::new();
        let (mut ready_jobs, notifier) = ready_jobs(store.clone());
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(Duration::from_secs(1), ready_jobs.next()).await {
                Ok(Ok(job)) => job,
                Ok(Err(err)) => panic!("Failed to claim job: {err}"),
                Err(_) => panic!("Didn't get woken by enqueue of new job"),
            }
        });
        tokio::task::yield_now().await;

        let inserted = store.insert(FetchRequest::new("D1", "pkb")).await.unwrap();
        notifier.wake();

        assert_eq!(handle.await.unwrap().id, inserted.id);
    }

    #[tokio::test]
    async fn waits_while_another_job_is_running() {
        let store = InMemoryStore::new();
        let first = store
            .insert(FetchRequest::new("D1", "prospect"))
            .await
            .unwrap();
        store.insert(FetchRequest::new("D2", "pkb")).await.unwrap();
        store.transition(first.id, Transition::Start).await.unwrap();
        let (mut ready_jobs, _notifier) = ready_jobs(store);

        let result = tokio::time::timeout(Duration::from_millis(50), ready_jobs.next()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_idle_dispatcher() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor = {
            let calls = calls.clone();
            move |_request: FetchRequest| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { ExecutionResult::Ok(serde_json::Value::Null) }
            }
        };
        let store = InMemoryStore::new();
        let notifier = Arc::new(Notifier::default());
        let slot = notifier.claim_dispatcher().unwrap();
        let runner = JobRunner::new(store.clone(), Arc::new(executor), None);
        let token = CancellationToken::new();
        let handle =
            Dispatcher::new(store, runner, slot, Duration::from_secs(30)).spawn(token.clone());
        assert!(notifier.claim_dispatcher().is_none());

        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Dispatcher did not shut down")
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(notifier.claim_dispatcher().is_some());
    }
}
