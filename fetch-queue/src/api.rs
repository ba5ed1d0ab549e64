//! Request and response bodies for exposing a [`crate::FetchQueue`] over HTTP.
//!
//! The routes themselves belong to the web layer. This module only fixes the JSON shapes and how
//! [`FetchQueueError`] maps to a status code:
//!
//! | Route                          | Body                | Response                     |
//! |--------------------------------|---------------------|------------------------------|
//! | `POST /jobs/queue`             | [`EnqueueRequest`]  | [`EnqueueResponse`]          |
//! | `GET /jobs/queue`              |                     | [`QueueStatus`]              |
//! | `GET /jobs/queue/{id}`         |                     | [`JobView`] or 404           |
//! | `DELETE /jobs/queue/{id}`      |                     | [`JobView`], 404 or 409      |
//! | `DELETE /jobs/queue/completed` |                     | [`ClearCompletedResponse`]   |
//!
//! The same table is available as [`Route`]. `completed` never parses as a [`JobId`], so the two
//! `DELETE` routes cannot shadow each other.
use serde::{Deserialize, Serialize};

use crate::{
    job::{FetchRequest, JobId, JobView},
    store::StoreError,
    FetchQueueError,
};

/// A route of the HTTP surface and the [`crate::FetchQueue`] operation behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// [`crate::FetchQueue::enqueue`]
    Enqueue,
    /// [`crate::FetchQueue::get_queue_status`]
    QueueStatus,
    /// [`crate::FetchQueue::get_status`]
    JobStatus,
    /// [`crate::FetchQueue::cancel`]
    Cancel,
    /// [`crate::FetchQueue::clear_completed`]
    ClearCompleted,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Self::Enqueue,
        Self::QueueStatus,
        Self::JobStatus,
        Self::Cancel,
        Self::ClearCompleted,
    ];

    pub fn method(self) -> &'static str {
        match self {
            Self::Enqueue => "POST",
            Self::QueueStatus | Self::JobStatus => "GET",
            Self::Cancel | Self::ClearCompleted => "DELETE",
        }
    }

    /// The path, with `{id}` standing for the job id.
    pub fn path(self) -> &'static str {
        match self {
            Self::Enqueue | Self::QueueStatus => "/jobs/queue",
            Self::JobStatus | Self::Cancel => "/jobs/queue/{id}",
            Self::ClearCompleted => "/jobs/queue/completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub dealer_id: String,
    pub fetch_type: String,
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    #[serde(alias = "no_po")]
    pub extra_param: Option<String>,
}

impl From<EnqueueRequest> for FetchRequest {
    fn from(value: EnqueueRequest) -> Self {
        Self {
            dealer_id: value.dealer_id,
            fetch_type: value.fetch_type,
            from_time: value.from_time,
            to_time: value.to_time,
            extra_param: value.extra_param,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
}

/// Overview of the queue returned by [`crate::FetchQueue::get_queue_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    /// Number of queued jobs.
    pub queue_length: usize,
    /// Whether a job is running right now.
    pub is_processing: bool,
    pub current_job: Option<JobView>,
    /// The queued jobs in the order they will run.
    pub queued_jobs: Vec<JobView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCompletedResponse {
    pub cleared_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&FetchQueueError> for ErrorResponse {
    fn from(value: &FetchQueueError) -> Self {
        Self {
            error: value.to_string(),
        }
    }
}

impl FetchQueueError {
    /// Whether the job the request referred to does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound(_) | Self::StoreError(StoreError::JobNotFound(_))
        )
    }

    /// Whether the request conflicts with the current state of the job.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NotCancellable { .. }
                | Self::StoreError(StoreError::InvalidTransition { .. })
                | Self::StoreError(StoreError::AlreadyRunning(_))
        )
    }

    /// The HTTP status code to answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            _ if self.is_not_found() => 404,
            _ if self.is_conflict() => 409,
            Self::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::job::JobStatus;

    use super::*;

    #[test]
    fn enqueue_request_accepts_no_po() {
        let request: EnqueueRequest = serde_json::from_value(serde_json::json!({
            "dealer_id": "D1",
            "fetch_type": "parts_inbound",
            "from_time": "2024-01-01 00:00:00",
            "no_po": "PO-1234",
        }))
        .unwrap();

        let request = FetchRequest::from(request);
        assert_eq!(request.dealer_id, "D1");
        assert_eq!(request.from_time.as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(request.to_time, None);
        assert_eq!(request.extra_param.as_deref(), Some("PO-1234"));
    }

    #[test]
    fn responses_serialize() {
        assert_eq!(
            serde_json::to_value(EnqueueResponse {
                job_id: JobId::from(7)
            })
            .unwrap(),
            serde_json::json!({ "job_id": 7 })
        );
        assert_eq!(
            serde_json::to_value(ClearCompletedResponse { cleared_count: 3 }).unwrap(),
            serde_json::json!({ "cleared_count": 3 })
        );
    }

    #[test]
    fn cancel_is_a_delete_on_the_job() {
        assert_eq!(Route::Cancel.method(), "DELETE");
        assert_eq!(Route::Cancel.path(), "/jobs/queue/{id}");
        assert!("completed".parse::<JobId>().is_err());

        let mut routes = Route::ALL
            .iter()
            .map(|route| (route.method(), route.path()))
            .collect::<Vec<_>>();
        routes.sort();
        routes.dedup();
        assert_eq!(routes.len(), Route::ALL.len());
    }

    #[test]
    fn error_status_codes() {
        let id = JobId::from(1);
        let not_found = FetchQueueError::JobNotFound(id);
        let conflict = FetchQueueError::NotCancellable {
            id,
            status: JobStatus::Running,
        };

        assert!(not_found.is_not_found());
        assert_eq!(not_found.status_code(), 404);
        assert!(conflict.is_conflict());
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(
            FetchQueueError::InvalidRequest("dealer_id must not be empty".to_owned())
                .status_code(),
            400
        );
        assert_eq!(
            FetchQueueError::StoreError(StoreError::BadState).status_code(),
            500
        );
        assert_eq!(
            ErrorResponse::from(&conflict).error,
            "Job JobId(1) cannot be cancelled, it is running"
        );
    }
}
