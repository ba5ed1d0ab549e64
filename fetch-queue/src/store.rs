//! The storage layer for jobs.
//!
//! A [`JobStore`] owns every [`Job`] known to the queue together with their insertion order. The
//! dispatcher and the queue API only ever change jobs through [`JobStore::transition`], so a store
//! implementation is responsible for making each transition atomic and for rejecting the ones that
//! are not allowed (see [`JobStatus::can_transition_to`]).
//!
//! An in memory implementation is provided in [`memory::InMemoryStore`]. Alternative
//! implementations can be validated against the [`crate::test_suite`] macro.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{query::Query, FetchRequest, Job, JobId, JobStatus};

pub mod memory;
mod queryable;
#[doc(hidden)]
pub mod testing;

pub(crate) use queryable::Queryable;

#[async_trait]
pub trait JobStore: Clone + Send + Sync + 'static {
    /// Store a new job in the [`JobStatus::Queued`] state at the back of the queue.
    async fn insert(&self, request: FetchRequest) -> Result<Job, StoreError>;
    async fn get(&self, id: JobId) -> Result<Job, StoreError>;
    /// The oldest job still in the [`JobStatus::Queued`] state.
    ///
    /// This does not claim the job, see [`Transition::Start`].
    async fn next_queued(&self) -> Result<Option<Job>, StoreError>;
    /// Atomically move a job to its next status and record the associated fields.
    ///
    /// Returns the updated job.
    async fn transition(&self, id: JobId, transition: Transition) -> Result<Job, StoreError>;
    /// A snapshot of all jobs in insertion order.
    async fn list_all(&self) -> Result<Vec<Job>, StoreError>;
    /// Delete every job in a terminal status, returning how many were removed.
    async fn remove_terminal(&self) -> Result<usize, StoreError>;
    /// Delete the terminal jobs which completed before the given time.
    async fn prune_terminal(&self, completed_before: DateTime<Utc>) -> Result<usize, StoreError>;

    /// The jobs matching the query in insertion order.
    ///
    /// The default implementation filters [`JobStore::list_all`].
    async fn query<'a>(&self, query: Query<'a>) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|job| query.matches(job))
            .collect())
    }
}

/// A requested change to a job's status.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Claim a queued job for execution. Fails if any other job is running.
    Start,
    Complete { result: serde_json::Value },
    Fail { error_message: String },
    Cancel,
}

impl Transition {
    /// The status the job ends up in.
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Start => JobStatus::Running,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Fail { .. } => JobStatus::Failed,
            Self::Cancel => JobStatus::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Cannot start a job while {0} is running")]
    AlreadyRunning(JobId),
    #[error("System in bad state")]
    BadState,
}
