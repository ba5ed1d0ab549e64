//! Helpers for testing.
//!
//! [`ScriptedExecutor`] stands in for the real fetch operations: it records every request it is
//! handed, can be told to fail for specific dealers, and can hold jobs in flight until the test
//! releases them. The `wait_for_*` functions poll a [`FetchQueue`] until it reaches the expected
//! state and panic if it does not get there in time.
//!
//! ```
//! # use fetch_queue::prelude::*;
//! # use fetch_queue::testing::{wait_until_idle, ScriptedExecutor};
//! # use std::time::Duration;
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let queue = FetchQueue::new(InMemoryStore::new());
//! let executor = ScriptedExecutor::new().failing_for("D2");
//! let _dispatcher = queue.spawn_dispatcher(executor.clone()).unwrap();
//!
//! queue.enqueue(FetchRequest::new("D1", "prospect")).await.unwrap();
//! queue.enqueue(FetchRequest::new("D2", "pkb")).await.unwrap();
//! wait_until_idle(&queue, Duration::from_secs(1)).await;
//!
//! assert_eq!(executor.calls().len(), 2);
//! assert_eq!(executor.max_in_flight(), 1);
//! # });
//! ```
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::{
    executor::{ExecutionResult, FetchExecutor},
    job::{FetchRequest, JobId, JobStatus, JobView},
    store::JobStore,
    FetchQueue,
};

const POLL_EVERY: Duration = Duration::from_millis(5);

/// A [`FetchExecutor`] with scripted behaviour.
///
/// Clones share their state, so a test can keep one clone to make assertions while the other is
/// owned by the dispatcher.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    calls: Arc<Mutex<Vec<FetchRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    failing_dealers: Arc<Vec<String>>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an error for every request made for the given dealer.
    pub fn failing_for(self, dealer_id: impl Into<String>) -> Self {
        let mut failing_dealers = self.failing_dealers.as_ref().clone();
        failing_dealers.push(dealer_id.into());
        Self {
            failing_dealers: Arc::new(failing_dealers),
            ..self
        }
    }

    /// Sleep for the given duration before returning.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    /// Hold every job in flight until [`ScriptedExecutor::release`] is called.
    pub fn gated(self) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..self
        }
    }

    /// Let `jobs` gated jobs finish.
    pub fn release(&self, jobs: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(jobs);
        }
    }

    /// Every request handed to the executor so far, in call order.
    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The largest number of requests that were ever being executed at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchExecutor for ScriptedExecutor {
    async fn execute(&self, request: FetchRequest) -> ExecutionResult {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_dealers.contains(&request.dealer_id) {
            return Err(format!(
                "Failed to fetch {} data for dealer {}",
                request.fetch_type, request.dealer_id
            )
            .into());
        }
        Ok(serde_json::json!({
            "dealer_id": request.dealer_id,
            "fetch_type": request.fetch_type,
        }))
    }
}

/// Wait for the job to reach `status`.
///
/// # Panics
///
/// If the job does not reach the status within `timeout`.
pub async fn wait_for_status<S: JobStore>(
    queue: &FetchQueue<S>,
    id: JobId,
    status: JobStatus,
    timeout: Duration,
) -> JobView {
    let wait = async {
        loop {
            match queue.get_status(id).await {
                Ok(view) if view.status == status => return view,
                _ => tokio::time::sleep(POLL_EVERY).await,
            }
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(view) => view,
        Err(_) => panic!(
            "Job {id} did not reach {status} within {timeout:?}, last seen: {:?}",
            queue.get_status(id).await
        ),
    }
}

/// Wait until no job is queued or running.
///
/// # Panics
///
/// If the queue is still busy after `timeout`.
pub async fn wait_until_idle<S: JobStore>(queue: &FetchQueue<S>, timeout: Duration) {
    let wait = async {
        loop {
            match queue.get_queue_status().await {
                Ok(status) if status.queue_length == 0 && !status.is_processing => return,
                _ => tokio::time::sleep(POLL_EVERY).await,
            }
        }
    };
    if tokio::time::timeout(timeout, wait).await.is_err() {
        panic!(
            "Queue did not become idle within {timeout:?}, last seen: {:?}",
            queue.get_queue_status().await
        );
    }
}
