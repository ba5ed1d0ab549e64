//! The fetch executor: the unit of work a job delegates to.
//!
//! The queue treats the executor as opaque. It is handed the [`FetchRequest`] of the job that is
//! being run and either returns a JSON payload which is stored as the job's result, or an error
//! whose message is stored as the job's `error_message`.
//!
//! Any `async fn` (or closure returning a future) taking a [`FetchRequest`] can be used as an
//! executor:
//!
//! ```
//! # use fetch_queue::prelude::*;
//! async fn fetch_dealer_data(request: FetchRequest) -> ExecutionResult {
//!     if request.fetch_type == "pkb" {
//!         return Err("pkb endpoint unavailable".into());
//!     }
//!     Ok(serde_json::json!({ "dealer_id": request.dealer_id }))
//! }
//! # fn assert_executor(_: impl FetchExecutor) {}
//! assert_executor(fetch_dealer_data);
//! ```
use std::future::Future;

use async_trait::async_trait;

use crate::job::FetchRequest;

/// The error type returned by a [`FetchExecutor`].
///
/// Only its [`Display`](std::fmt::Display) output is kept once the job has failed.
pub type ExecutionError = Box<dyn std::error::Error + Send + Sync>;

pub type ExecutionResult = Result<serde_json::Value, ExecutionError>;

/// Performs the actual data fetch for a job.
///
/// The executor is invoked at most once per job and never for two jobs at the same time. There is
/// no retry: if the executor fails, the job is marked as failed and the caller can enqueue it again.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FetchExecutor: Send + Sync {
    async fn execute(&self, request: FetchRequest) -> ExecutionResult;
}

#[async_trait]
impl<F, Fut> FetchExecutor for F
where
    F: Fn(FetchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = ExecutionResult> + Send,
{
    async fn execute(&self, request: FetchRequest) -> ExecutionResult {
        (self)(request).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn fetch(request: FetchRequest) -> ExecutionResult {
        match request.dealer_id.as_str() {
            "D2" => Err("dealer offline".into()),
            _ => Ok(serde_json::json!({ "fetched": request.fetch_type })),
        }
    }

    #[tokio::test]
    async fn functions_are_executors() {
        let executor = fetch;

        let result = executor
            .execute(FetchRequest::new("D1", "prospect"))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({ "fetched": "prospect" }));

        let error = executor
            .execute(FetchRequest::new("D2", "pkb"))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "dealer offline");
    }

    #[tokio::test]
    async fn mocked_executor() {
        let mut executor = MockFetchExecutor::new();
        executor
            .expect_execute()
            .withf(|request| request.dealer_id == "D1")
            .times(1)
            .returning(|_| Ok(serde_json::Value::Null));

        assert!(executor
            .execute(FetchRequest::new("D1", "prospect"))
            .await
            .is_ok());
    }
}
