//! Jobs and their lifecycle.
//!
//! A [`Job`] is a single request to fetch data for a dealer. It is created by
//! [`crate::FetchQueue::enqueue`] in the [`JobStatus::Queued`] state and moves through the
//! lifecycle below, never backwards:
//!
//! ```text
//! Queued ──> Running ──> Completed
//!    │           └─────> Failed
//!    └─────> Cancelled
//! ```
use std::{fmt::Display, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FetchQueueError;

pub mod builder;
pub mod query;
pub(crate) mod runner;

/// The identifier of a job.
///
/// Ids are handed out by the [`crate::store::JobStore`] in insertion order and are never reused.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<JobId> for u64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl FromStr for JobId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// The state of a job.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for the dispatcher.
    Queued,
    /// Currently being executed. At most one job is ever in this state.
    Running,
    /// The executor returned successfully.
    Completed,
    /// The executor returned an error, panicked or timed out.
    Failed,
    /// Cancelled before it was started.
    Cancelled,
}

impl JobStatus {
    /// All the statuses in which a job can no longer change.
    pub const TERMINAL: [JobStatus; 3] = [Self::Completed, Self::Failed, Self::Cancelled];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Whether a job in this status may move to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to fetch.
///
/// The queue never interprets these values; they are handed as-is to the
/// [`crate::executor::FetchExecutor`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    pub dealer_id: String,
    pub fetch_type: String,
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    pub extra_param: Option<String>,
}

impl FetchRequest {
    pub fn new(dealer_id: impl Into<String>, fetch_type: impl Into<String>) -> Self {
        Self {
            dealer_id: dealer_id.into(),
            fetch_type: fetch_type.into(),
            from_time: None,
            to_time: None,
            extra_param: None,
        }
    }

    /// Start building a request, see [`builder::JobBuilder`].
    pub fn builder(
        dealer_id: impl Into<String>,
        fetch_type: impl Into<String>,
    ) -> builder::JobBuilder {
        builder::JobBuilder::new(dealer_id, fetch_type)
    }

    /// Reject requests the queue cannot accept.
    ///
    /// Only the dealer id is required. Every other field is handed to the executor untouched.
    pub fn validate(&self) -> Result<(), FetchQueueError> {
        if self.dealer_id.trim().is_empty() {
            return Err(FetchQueueError::InvalidRequest(
                "dealer_id must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A job as recorded by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    #[serde(flatten)]
    pub request: FetchRequest,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl Job {
    pub(crate) fn new(id: JobId, request: FetchRequest) -> Self {
        Self {
            id,
            request,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }
}

/// Read only projection of a [`Job`] returned by the queue API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    #[serde(rename = "job_id")]
    pub id: JobId,
    #[serde(flatten)]
    pub request: FetchRequest,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// 1-based position in the queue, only set for queued jobs.
    pub queue_position: Option<usize>,
    /// How long the executor ran for.
    pub duration_ms: Option<i64>,
}

impl JobView {
    pub(crate) fn with_queue_position(self, queue_position: usize) -> Self {
        Self {
            queue_position: Some(queue_position),
            ..self
        }
    }
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let duration_ms = job
            .started_at
            .zip(job.completed_at)
            .map(|(started_at, completed_at)| (completed_at - started_at).num_milliseconds());
        Self {
            id: job.id,
            request: job.request,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result,
            error_message: job.error_message,
            queue_position: None,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        let all = [Queued, Running, Completed, Failed, Cancelled];
        let legal = [
            (Queued, Running),
            (Queued, Cancelled),
            (Running, Completed),
            (Running, Failed),
        ];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_way_out() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        for status in JobStatus::TERMINAL {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(JobStatus::Running));
            assert!(!status.can_transition_to(JobStatus::Cancelled));
        }
    }

    #[test]
    fn blank_dealer_id_is_invalid() {
        assert!(FetchRequest::new("D1", "prospect").validate().is_ok());
        assert!(matches!(
            FetchRequest::new(" ", "prospect").validate(),
            Err(FetchQueueError::InvalidRequest(_))
        ));
    }

    #[test]
    fn job_id_parses_from_path_segment() {
        assert_eq!("42".parse::<JobId>(), Ok(JobId(42)));
        assert!("abc".parse::<JobId>().is_err());
        assert_eq!(JobId(7).to_string(), "JobId(7)");
    }

    #[test]
    fn view_serializes_flat_with_lowercase_status() {
        let mut job = Job::new(3.into(), FetchRequest::new("D1", "prospect"));
        let started_at = job.created_at;
        job.status = JobStatus::Completed;
        job.started_at = Some(started_at);
        job.completed_at = Some(started_at + TimeDelta::milliseconds(1500));

        let value = serde_json::to_value(JobView::from(job)).unwrap();

        assert_eq!(value["job_id"], 3);
        assert_eq!(value["dealer_id"], "D1");
        assert_eq!(value["fetch_type"], "prospect");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["duration_ms"], 1500);
        assert!(value["queue_position"].is_null());
    }
}
