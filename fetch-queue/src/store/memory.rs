//! Provides an in memory implementation of [`JobStore`].
//!
//! Jobs are kept in a single [`Vec`] in insertion order behind a [`RwLock`]. Every mutation,
//! including handing out the next id, happens while holding the write lock so that the
//! position of a job in the queue always matches the order of its id.
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::job::{FetchRequest, Job, JobId, JobStatus};

use super::{JobStore, StoreError, Transition};

/// An in memory implementation of [`JobStore`].
///
/// Cloning the store is cheap and every clone shares the same jobs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Jobs>>,
}

#[derive(Default)]
struct Jobs {
    jobs: Vec<Job>,
    next_id: u64,
}

impl InMemoryStore {
    /// Creates a new, empty, instance of [`InMemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Jobs) -> T) -> Result<T, StoreError> {
        Ok(f(&*self.inner.read().map_err(|_| StoreError::BadState)?))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Jobs) -> T) -> Result<T, StoreError> {
        Ok(f(&mut *self
            .inner
            .write()
            .map_err(|_| StoreError::BadState)?))
    }
}

impl Jobs {
    fn find_mut(&mut self, id: JobId) -> Result<&mut Job, StoreError> {
        self.jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(StoreError::JobNotFound(id))
    }

    fn running(&self) -> Option<JobId> {
        self.jobs
            .iter()
            .find(|job| job.status == JobStatus::Running)
            .map(|job| job.id)
    }

    fn apply(&mut self, id: JobId, transition: Transition) -> Result<Job, StoreError> {
        let running = self.running();
        let job = self.find_mut(id)?;
        let to = transition.target();
        if !job.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }
        if let Some(running) = running.filter(|_| to == JobStatus::Running) {
            return Err(StoreError::AlreadyRunning(running));
        }
        match transition {
            Transition::Start => job.mark_job_running(),
            Transition::Complete { result } => job.mark_job_complete(result),
            Transition::Fail { error_message } => job.mark_job_failed(error_message),
            Transition::Cancel => job.mark_job_cancelled(),
        }
        Ok(job.clone())
    }
}

impl Job {
    fn mark_job_running(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = JobStatus::Running;
    }

    fn mark_job_complete(&mut self, result: serde_json::Value) {
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.status = JobStatus::Completed;
    }

    fn mark_job_failed(&mut self, error_message: String) {
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message);
        self.status = JobStatus::Failed;
    }

    fn mark_job_cancelled(&mut self) {
        self.completed_at = Some(Utc::now());
        self.status = JobStatus::Cancelled;
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert(&self, request: FetchRequest) -> Result<Job, StoreError> {
        self.write(|inner| {
            let job = Job::new(inner.next_id.into(), request);
            inner.next_id += 1;
            inner.jobs.push(job.clone());
            job
        })
    }
    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.read(|inner| inner.jobs.iter().find(|job| job.id == id).cloned())?
            .ok_or(StoreError::JobNotFound(id))
    }
    async fn next_queued(&self) -> Result<Option<Job>, StoreError> {
        self.read(|inner| {
            inner
                .jobs
                .iter()
                .find(|job| job.status == JobStatus::Queued)
                .cloned()
        })
    }
    async fn transition(&self, id: JobId, transition: Transition) -> Result<Job, StoreError> {
        self.write(|inner| inner.apply(id, transition))?
    }
    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.read(|inner| inner.jobs.clone())
    }
    async fn remove_terminal(&self) -> Result<usize, StoreError> {
        self.write(|inner| {
            let before = inner.jobs.len();
            inner.jobs.retain(|job| !job.status.is_terminal());
            before - inner.jobs.len()
        })
    }
    async fn prune_terminal(&self, completed_before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.write(|inner| {
            let before = inner.jobs.len();
            inner.jobs.retain(|job| {
                !job.status.is_terminal()
                    || job
                        .completed_at
                        .is_some_and(|completed_at| completed_at >= completed_before)
            });
            before - inner.jobs.len()
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use crate::test_suite;
    use assert_matches::assert_matches;
    use futures::future::join_all;

    use super::*;

    test_suite!(for: InMemoryStore::new());

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_keep_id_order_and_uniqueness() {
        let store = InMemoryStore::new();

        join_all((0..50).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert(FetchRequest::new(format!("D{i}"), "prospect"))
                    .await
                    .unwrap()
            })
        }))
        .await;

        let ids = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|job| u64::from(job.id))
            .collect::<Vec<_>>();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_claims_only_one_wins() {
        let store = InMemoryStore::new();
        let job = store.insert(FetchRequest::new("D1", "pkb")).await.unwrap();

        let results = join_all((0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.transition(job.id, Transition::Start).await })
        }))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect::<Vec<_>>();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        for result in results.into_iter().filter(Result::is_err) {
            assert_matches!(
                result,
                Err(StoreError::InvalidTransition {
                    from: JobStatus::Running,
                    to: JobStatus::Running,
                    ..
                })
            );
        }
    }

    #[tokio::test]
    async fn badstate_errors() {
        let store = InMemoryStore::new();
        let job = store.insert(FetchRequest::new("D1", "pkb")).await.unwrap();

        tokio::task::spawn({
            let store = store.clone();
            async move {
                let _guard = store.inner.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(
            store.insert(FetchRequest::new("D1", "pkb")).await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.get(job.id).await, Err(StoreError::BadState));
        assert_matches!(store.next_queued().await, Err(StoreError::BadState));
        assert_matches!(
            store.transition(job.id, Transition::Start).await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.list_all().await, Err(StoreError::BadState));
        assert_matches!(store.remove_terminal().await, Err(StoreError::BadState));
        assert_matches!(
            store.prune_terminal(Utc::now()).await,
            Err(StoreError::BadState)
        );
    }
}
