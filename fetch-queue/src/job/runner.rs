use std::{sync::Arc, time::Duration};

use tokio::task::JoinError;
use tracing::{instrument, Instrument};

use crate::{
    executor::{ExecutionError, FetchExecutor},
    store::{JobStore, Transition},
};

use super::{Job, JobId};

const ERROR_TYPE_ERROR: &str = "error";
const ERROR_TYPE_PANIC: &str = "panic";
const ERROR_TYPE_TIMEOUT: &str = "timeout";

/// Why a job failed, before it is recorded on the job as its `error_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobFailure {
    pub(crate) error_type: &'static str,
    pub(crate) message: String,
}

/// Runs a single claimed job to completion and records the outcome.
pub(crate) struct JobRunner<S>
where
    S: JobStore,
{
    store: S,
    executor: Arc<dyn FetchExecutor>,
    timeout: Option<Duration>,
}

impl<S> JobRunner<S>
where
    S: JobStore,
{
    pub(crate) fn new(
        store: S,
        executor: Arc<dyn FetchExecutor>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            executor,
            timeout,
        }
    }

    /// Execute a job which has already been moved to running.
    ///
    /// Never returns an error: whatever the executor does, the job ends up either completed or
    /// failed so the dispatcher can move on to the next one.
    #[instrument(skip(self, job), fields(job_id, dealer_id, fetch_type))]
    pub(crate) async fn execute_job(&self, job: Job) {
        let job_id = job.id;
        let span = tracing::Span::current();
        span.record("job_id", &tracing::field::debug(&job_id));
        span.record("dealer_id", job.request.dealer_id.as_str());
        span.record("fetch_type", job.request.fetch_type.as_str());

        let executor = self.executor.clone();
        let timeout = self.timeout;
        let request = job.request;
        tracing::debug!(%job_id, "Executing job {job_id}");

        let result = tokio::spawn(
            async move {
                match timeout {
                    Some(timeout) => tokio::time::timeout(timeout, executor.execute(request))
                        .await
                        .map_err(|_| timeout),
                    None => Ok(executor.execute(request).await),
                }
            }
            .in_current_span(),
        )
        .await;

        match result {
            Ok(Ok(Ok(value))) => self.handle_job_complete(job_id, value).await,
            Ok(Ok(Err(error))) => self.handle_job_error(job_id, error).await,
            Ok(Err(timeout)) => self.handle_job_error(job_id, timeout).await,
            Err(error) => self.handle_job_error(job_id, error).await,
        }
    }

    async fn handle_job_complete(&self, job_id: JobId, result: serde_json::Value) {
        tracing::debug!(%job_id, "Job complete {job_id}");
        let _ = self
            .store
            .transition(job_id, Transition::Complete { result })
            .await
            .inspect_err(|err| {
                tracing::error!(
                    ?err,
                    %job_id,
                    "Failed to mark job {job_id} as complete, error: {err:?}",
                )
            });
    }

    async fn handle_job_error(&self, job_id: JobId, error: impl Into<JobFailure>) {
        let error = error.into();
        tracing::error!(
            %job_id,
            ?error,
            "Job {job_id} failed: error type: {}, message: {}",
            error.error_type,
            error.message
        );
        let _ = self
            .store
            .transition(
                job_id,
                Transition::Fail {
                    error_message: error.message,
                },
            )
            .await
            .inspect_err(|err| {
                tracing::error!(
                    ?err,
                    %job_id,
                    "Failed to mark job {job_id} as failed, error: {err:?}",
                )
            });
    }
}

impl From<JoinError> for JobFailure {
    fn from(value: JoinError) -> Self {
        let msg = value.to_string();
        let message = match value.try_into_panic() {
            Ok(panic) => panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or(msg),
            Err(_) => msg,
        };
        Self {
            error_type: ERROR_TYPE_PANIC,
            message,
        }
    }
}

impl From<ExecutionError> for JobFailure {
    fn from(value: ExecutionError) -> Self {
        let mut message = value.to_string();
        if message.is_empty() {
            message = "Executor returned an error without a message".to_owned();
        }
        Self {
            error_type: ERROR_TYPE_ERROR,
            message,
        }
    }
}

impl From<Duration> for JobFailure {
    fn from(value: Duration) -> Self {
        Self {
            error_type: ERROR_TYPE_TIMEOUT,
            message: format!("Job failed to complete within timeout: {value:?}"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        executor::{ExecutionResult, MockFetchExecutor},
        job::{FetchRequest, JobStatus},
        store::memory::InMemoryStore,
    };

    use super::*;

    async fn running_job(store: &InMemoryStore, request: FetchRequest) -> Job {
        let job = store.insert(request).await.unwrap();
        store.transition(job.id, Transition::Start).await.unwrap()
    }

    #[tokio::test]
    async fn successful_job_is_completed_with_result() {
        let store = InMemoryStore::new();
        let job = running_job(&store, FetchRequest::new("D1", "prospect")).await;
        let mut executor = MockFetchExecutor::new();
        executor
            .expect_execute()
            .withf(|request| request.dealer_id == "D1" && request.fetch_type == "prospect")
            .times(1)
            .returning(|_| Ok(serde_json::json!({ "rows": 10 })));
        let runner = JobRunner::new(store.clone(), Arc::new(executor), None);

        runner.execute_job(job.clone()).await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(serde_json::json!({ "rows": 10 })));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn executor_error_is_recorded() {
        let store = InMemoryStore::new();
        let job = running_job(&store, FetchRequest::new("D2", "pkb")).await;
        let mut executor = MockFetchExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_| Err("upstream returned 502".into()));
        let runner = JobRunner::new(store.clone(), Arc::new(executor), None);

        runner.execute_job(job.clone()).await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("upstream returned 502"));
        assert_eq!(job.result, None);
    }

    #[tokio::test]
    async fn panicking_executor_fails_the_job() {
        let store = InMemoryStore::new();
        let job = running_job(&store, FetchRequest::new("D1", "prospect")).await;
        let executor = |_request: FetchRequest| async move {
            if true {
                panic!("scraper crashed");
            }
            ExecutionResult::Ok(serde_json::Value::Null)
        };
        let runner = JobRunner::new(store.clone(), Arc::new(executor), None);

        runner.execute_job(job.clone()).await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("scraper crashed"));
    }

    #[tokio::test]
    async fn timeout_fails_the_job() {
        let store = InMemoryStore::new();
        let job = running_job(&store, FetchRequest::new("D1", "prospect")).await;
        let executor = |_request: FetchRequest| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ExecutionResult::Ok(serde_json::Value::Null)
        };
        let runner = JobRunner::new(
            store.clone(),
            Arc::new(executor),
            Some(Duration::from_millis(10)),
        );

        runner.execute_job(job.clone()).await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .starts_with("Job failed to complete within timeout"));
    }

    #[tokio::test]
    async fn job_removed_while_running_does_not_panic_the_runner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = InMemoryStore::new();
        let job = Job::new(99.into(), FetchRequest::new("D1", "prospect"));
        let executor = {
            let calls = calls.clone();
            move |_request: FetchRequest| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { ExecutionResult::Ok(serde_json::Value::Null) }
            }
        };
        let runner = JobRunner::new(store.clone(), Arc::new(executor), None);

        runner.execute_job(job).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[test]
    fn failure_from_empty_error_message() {
        let failure = JobFailure::from(ExecutionError::from(""));
        assert_eq!(failure.error_type, ERROR_TYPE_ERROR);
        assert!(!failure.message.is_empty());
    }
}
