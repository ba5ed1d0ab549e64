//! A sequential queue for dealer data fetch jobs.
//!
//! Fetch jobs for a dealer write to a shared database, so they must never run at the same time.
//! [`FetchQueue`] accepts jobs from any number of callers, keeps them in FIFO order and hands them
//! one at a time to a single dispatcher task which runs them through a
//! [`FetchExecutor`](executor::FetchExecutor).
//!
//! At any instant at most one job is running. A job that fails, panics or times out is recorded
//! as failed and the dispatcher moves on to the next one. Jobs which have not started yet can be
//! cancelled.
//!
//! # Example
//!
//! ```
//! use fetch_queue::prelude::*;
//!
//! async fn fetch_dealer_data(request: FetchRequest) -> ExecutionResult {
//!     // Call out to the scraper here.
//!     Ok(serde_json::json!({ "dealer_id": request.dealer_id }))
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let queue = FetchQueue::new(InMemoryStore::new());
//! let dispatcher = queue.spawn_dispatcher(fetch_dealer_data).unwrap();
//!
//! let job_id = queue
//!     .enqueue(FetchRequest::new("D1", "prospect"))
//!     .await
//!     .unwrap();
//!
//! let status = queue.get_status(job_id).await.unwrap();
//! assert_eq!(status.request.dealer_id, "D1");
//!
//! dispatcher.graceful_shutdown().await.unwrap();
//! # });
//! ```
use std::sync::Arc;

pub mod api;
pub mod config;
mod dispatcher;
pub mod executor;
pub mod job;
mod notifier;
pub mod prelude;
pub mod pruner;
pub mod store;
pub mod testing;

use api::QueueStatus;
use config::QueueConfig;
use dispatcher::Dispatcher;
use executor::FetchExecutor;
use job::{
    query::{Query, Where},
    runner::JobRunner,
    FetchRequest, Job, JobId, JobStatus, JobView,
};
use notifier::Notifier;
use pruner::{runner::PrunerRunner, PrunerConfig};
use store::{JobStore, StoreError, Transition};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// The handle through which jobs are enqueued, inspected and cancelled.
///
/// Cloning is cheap and every clone talks to the same store and the same dispatcher, so a clone
/// can be handed to each request handler.
#[derive(Clone)]
pub struct FetchQueue<S: JobStore> {
    store: S,
    config: QueueConfig,
    notifier: Arc<Notifier>,
}

impl<S> Default for FetchQueue<S>
where
    S: JobStore + Default,
{
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<S> FetchQueue<S>
where
    S: JobStore,
{
    /// Create a queue over the given store with the default [`QueueConfig`].
    pub fn new(store: S) -> Self {
        Self::with_config(store, QueueConfig::default())
    }

    /// Create a queue over the given store.
    pub fn with_config(store: S, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            notifier: Default::default(),
        }
    }

    /// The store backing this queue.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Add a job to the back of the queue and wake the dispatcher.
    ///
    /// Returns [`FetchQueueError::InvalidRequest`] if the dealer id is blank.
    #[instrument(
        skip(self, request),
        fields(dealer_id = %request.dealer_id, fetch_type = %request.fetch_type)
    )]
    pub async fn enqueue(&self, request: FetchRequest) -> Result<JobId, FetchQueueError> {
        request.validate()?;
        let job = self.store.insert(request).await?;
        tracing::info!(job_id = %job.id, "Enqueued job {}", job.id);
        self.notifier.wake();
        Ok(job.id)
    }

    /// The current state of a job, including its position in the queue while it is queued.
    pub async fn get_status(&self, id: JobId) -> Result<JobView, FetchQueueError> {
        let jobs = self.store.list_all().await?;
        views(jobs, |job| job.id == id)
            .pop()
            .ok_or(FetchQueueError::JobNotFound(id))
    }

    /// An overview of the queue taken from a single snapshot of the store.
    pub async fn get_queue_status(&self) -> Result<QueueStatus, FetchQueueError> {
        let jobs = self.store.list_all().await?;
        let mut current_job = None;
        let mut queued_jobs = Vec::new();
        for view in views(jobs, |job| !job.status.is_terminal()) {
            match view.status {
                JobStatus::Running => current_job = Some(view),
                _ => queued_jobs.push(view),
            }
        }
        Ok(QueueStatus {
            queue_length: queued_jobs.len(),
            is_processing: current_job.is_some(),
            current_job,
            queued_jobs,
        })
    }

    /// Cancel a job which has not started yet.
    ///
    /// Running and finished jobs cannot be cancelled, this returns
    /// [`FetchQueueError::NotCancellable`] for them.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: JobId) -> Result<JobView, FetchQueueError> {
        let job = self
            .store
            .transition(id, Transition::Cancel)
            .await
            .map_err(|err| match err {
                StoreError::JobNotFound(id) => FetchQueueError::JobNotFound(id),
                StoreError::InvalidTransition { id, from, .. } => {
                    FetchQueueError::NotCancellable { id, status: from }
                }
                err => err.into(),
            })?;
        tracing::info!(job_id = %id, "Cancelled job {id}");
        Ok(job.into())
    }

    /// Remove every completed, failed and cancelled job, returning how many were removed.
    pub async fn clear_completed(&self) -> Result<usize, FetchQueueError> {
        let cleared = self.store.remove_terminal().await?;
        tracing::info!(cleared, "Cleared {cleared} finished jobs");
        Ok(cleared)
    }

    /// The jobs matching the query, in the order they were enqueued.
    ///
    /// Filtering is left to the store. Queued jobs carry their position in the queue.
    pub async fn query_jobs(&self, query: Where<'_>) -> Result<Vec<JobView>, FetchQueueError> {
        let jobs = self.store.query(query.0).await?;
        if jobs.iter().all(|job| job.status != JobStatus::Queued) {
            return Ok(jobs.into_iter().map(JobView::from).collect());
        }
        let queued = self
            .store
            .query(Query::StatusEqual(JobStatus::Queued))
            .await?;
        Ok(jobs
            .into_iter()
            .map(|job| {
                let position = queued.iter().position(|queued| queued.id == job.id);
                let view = JobView::from(job);
                match position {
                    Some(position) if view.status == JobStatus::Queued => {
                        view.with_queue_position(position + 1)
                    }
                    _ => view,
                }
            })
            .collect())
    }

    /// Start the dispatcher which runs queued jobs through `executor` one at a time.
    ///
    /// A queue has a single dispatcher: while one is running, calling this again returns
    /// [`FetchQueueError::DispatcherAlreadyRunning`]. Once it has stopped, after
    /// [`TaskHandle::graceful_shutdown`] or after its handle was dropped, a new one can be
    /// spawned and picks up the jobs still queued.
    #[must_use = "dropping the handle stops the dispatcher"]
    pub fn spawn_dispatcher<E>(&self, executor: E) -> Result<TaskHandle, FetchQueueError>
    where
        E: FetchExecutor + 'static,
    {
        let slot = self
            .notifier
            .claim_dispatcher()
            .ok_or(FetchQueueError::DispatcherAlreadyRunning)?;
        let runner = JobRunner::new(
            self.store.clone(),
            Arc::new(executor),
            self.config.execution_timeout,
        );
        let cancellation_token = CancellationToken::new();
        let handle = Dispatcher::new(
            self.store.clone(),
            runner,
            slot,
            self.config.poll_interval,
        )
        .spawn(cancellation_token.clone());
        Ok(TaskHandle::new(cancellation_token, handle))
    }

    /// Start a background task removing finished jobs, see [`pruner`].
    #[must_use = "dropping the handle stops the pruner"]
    pub fn spawn_pruner(&self, config: PrunerConfig) -> TaskHandle {
        let cancellation_token = CancellationToken::new();
        let handle =
            PrunerRunner::new(self.store.clone(), config).spawn(cancellation_token.clone());
        TaskHandle::new(cancellation_token, handle)
    }
}

/// Converts a snapshot of the store into views, numbering the queued jobs as it goes.
fn views(jobs: Vec<Job>, mut keep: impl FnMut(&Job) -> bool) -> Vec<JobView> {
    let mut position = 0;
    jobs.into_iter()
        .filter_map(|job| {
            let queued = job.status == JobStatus::Queued;
            if queued {
                position += 1;
            }
            if !keep(&job) {
                return None;
            }
            let view = JobView::from(job);
            Some(if queued {
                view.with_queue_position(position)
            } else {
                view
            })
        })
        .collect()
}

/// A handle to a background task started by a [`FetchQueue`].
///
/// Dropping the handle also stops the task at its next idle point.
#[derive(Debug)]
#[must_use = "dropping the handle stops the task"]
pub struct TaskHandle {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    fn new(cancellation_token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            cancellation_token,
            handle: Some(handle),
        }
    }

    /// Stop the task and wait for it to finish.
    ///
    /// A job which is already running is allowed to complete and have its outcome recorded.
    pub async fn graceful_shutdown(mut self) -> Result<(), FetchQueueError> {
        tracing::debug!("Shutting down fetch queue task");
        self.cancellation_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|_| FetchQueueError::GracefulShutdownFailed)?;
        }
        Ok(())
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// Errors returned by [`FetchQueue`].
#[derive(Debug, Error)]
pub enum FetchQueueError {
    /// No job with this id is known to the queue.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    /// The job has already started or finished.
    #[error("Job {id} cannot be cancelled, it is {status}")]
    NotCancellable {
        /// The job that was to be cancelled.
        id: JobId,
        /// Its status when the cancellation was attempted.
        status: JobStatus,
    },
    /// The request was rejected before being enqueued.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Another dispatcher is still running for this queue.
    #[error("A dispatcher is already running for this queue")]
    DispatcherAlreadyRunning,
    /// A background task panicked or was aborted.
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
    /// The store returned an error.
    #[error("Error communicating with the store")]
    StoreError(#[from] StoreError),
}
