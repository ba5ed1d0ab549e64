//! Test suite for ensuring a correct implementation of a [`JobStore`].
use std::ops::{Add, Sub};

use chrono::{TimeDelta, Utc};

use crate::job::{query::Query, FetchRequest, JobId, JobStatus};

use super::*;

/// Create test suite for a [`JobStore`] implementation.
///
/// For store implementors, it is useful to include this as part of your test suites.
///
/// # Example
///
/// ```
/// use fetch_queue::test_suite;
/// use fetch_queue::store::memory::InMemoryStore;
/// test_suite!(for: InMemoryStore::new());
/// ```
///
/// If you are using a different async test attribute you can configure the macro to use that
/// instead:
///
/// ```ignore
/// use fetch_queue::test_suite;
/// test_suite!(
///     attr: sqlx::test,
///     args: (pool: PgPool),
///     store: StoreImplementation::from_pool(pool).await.unwrap()
/// );
/// ```
#[macro_export]
macro_rules! test_suite {
    (for: $store:expr) => {
        $crate::test_suite!(attr: tokio::test, args: (), store: $store);
    };
    (attr: $attr:meta, args: $args:tt, store: $store:expr) => {
        #[$attr]
        async fn insert $args {
          let store = $store;
          $crate::store::testing::insert(store).await;
        }
        #[$attr]
        async fn insert_hands_out_increasing_ids $args {
          let store = $store;
          $crate::store::testing::insert_hands_out_increasing_ids(store).await;
        }
        #[$attr]
        async fn get_not_found $args {
          let store = $store;
          $crate::store::testing::get_not_found(store).await;
        }
        #[$attr]
        async fn next_queued_is_oldest_queued $args {
          let store = $store;
          $crate::store::testing::next_queued_is_oldest_queued(store).await;
        }
        #[$attr]
        async fn next_queued_empty $args {
          let store = $store;
          $crate::store::testing::next_queued_empty(store).await;
        }
        #[$attr]
        async fn next_queued_does_not_claim $args {
          let store = $store;
          $crate::store::testing::next_queued_does_not_claim(store).await;
        }
        #[$attr]
        async fn transition_start $args {
          let store = $store;
          $crate::store::testing::transition_start(store).await;
        }
        #[$attr]
        async fn transition_start_while_running $args {
          let store = $store;
          $crate::store::testing::transition_start_while_running(store).await;
        }
        #[$attr]
        async fn transition_complete $args {
          let store = $store;
          $crate::store::testing::transition_complete(store).await;
        }
        #[$attr]
        async fn transition_fail $args {
          let store = $store;
          $crate::store::testing::transition_fail(store).await;
        }
        #[$attr]
        async fn transition_cancel $args {
          let store = $store;
          $crate::store::testing::transition_cancel(store).await;
        }
        #[$attr]
        async fn transition_cancel_running $args {
          let store = $store;
          $crate::store::testing::transition_cancel_running(store).await;
        }
        #[$attr]
        async fn transition_from_terminal $args {
          let store = $store;
          $crate::store::testing::transition_from_terminal(store).await;
        }
        #[$attr]
        async fn transition_complete_queued $args {
          let store = $store;
          $crate::store::testing::transition_complete_queued(store).await;
        }
        #[$attr]
        async fn transition_not_found $args {
          let store = $store;
          $crate::store::testing::transition_not_found(store).await;
        }
        #[$attr]
        async fn list_all_in_insertion_order $args {
          let store = $store;
          $crate::store::testing::list_all_in_insertion_order(store).await;
        }
        #[$attr]
        async fn remove_terminal $args {
          let store = $store;
          $crate::store::testing::remove_terminal(store).await;
        }
        #[$attr]
        async fn remove_terminal_twice $args {
          let store = $store;
          $crate::store::testing::remove_terminal_twice(store).await;
        }
        #[$attr]
        async fn ids_not_reused_after_remove $args {
          let store = $store;
          $crate::store::testing::ids_not_reused_after_remove(store).await;
        }
        #[$attr]
        async fn prune_terminal $args {
          let store = $store;
          $crate::store::testing::prune_terminal(store).await;
        }
        #[$attr]
        async fn query $args {
          let store = $store;
          $crate::store::testing::query(store).await;
        }
    };
}

pub use test_suite;

impl FetchRequest {
    pub(crate) fn mock_request() -> Self {
        Self::new("dealer", "prospect")
    }

    pub(crate) fn with_dealer(self, dealer_id: impl ToString) -> Self {
        Self {
            dealer_id: dealer_id.to_string(),
            ..self
        }
    }
}

async fn insert_jobs<S: JobStore>(store: &S, count: usize) -> Vec<JobId> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let job = store
            .insert(FetchRequest::mock_request().with_dealer(format!("D{i}")))
            .await
            .unwrap();
        ids.push(job.id);
    }
    ids
}

async fn run_to<S: JobStore>(store: &S, id: JobId, status: JobStatus) {
    match status {
        JobStatus::Queued => {}
        JobStatus::Cancelled => {
            store.transition(id, Transition::Cancel).await.unwrap();
        }
        JobStatus::Running => {
            store.transition(id, Transition::Start).await.unwrap();
        }
        JobStatus::Completed => {
            store.transition(id, Transition::Start).await.unwrap();
            store
                .transition(
                    id,
                    Transition::Complete {
                        result: serde_json::json!({ "rows": 1 }),
                    },
                )
                .await
                .unwrap();
        }
        JobStatus::Failed => {
            store.transition(id, Transition::Start).await.unwrap();
            store
                .transition(
                    id,
                    Transition::Fail {
                        error_message: "boom".to_owned(),
                    },
                )
                .await
                .unwrap();
        }
    }
}

#[doc(hidden)]
pub async fn insert(store: impl JobStore) {
    let request = FetchRequest {
        from_time: Some("2024-01-01 00:00:00".to_owned()),
        to_time: Some("2024-01-31 23:59:59".to_owned()),
        extra_param: Some("PO-1".to_owned()),
        ..FetchRequest::mock_request()
    };
    let before = Utc::now();

    let job = store.insert(request.clone()).await.unwrap();

    assert_eq!(job.request, request);
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.created_at >= before);
    assert_eq!(job.started_at, None);
    assert_eq!(job.completed_at, None);
    assert_eq!(job.result, None);
    assert_eq!(job.error_message, None);
    assert_eq!(store.get(job.id).await.unwrap(), job);
}

#[doc(hidden)]
pub async fn insert_hands_out_increasing_ids(store: impl JobStore) {
    let ids = insert_jobs(&store, 3).await;

    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[doc(hidden)]
pub async fn get_not_found(store: impl JobStore) {
    let id = JobId::from(1000);

    assert!(matches!(
        store.get(id).await,
        Err(StoreError::JobNotFound(not_found)) if not_found == id
    ));
}

#[doc(hidden)]
pub async fn next_queued_is_oldest_queued(store: impl JobStore) {
    let ids = insert_jobs(&store, 4).await;
    run_to(&store, ids[0], JobStatus::Completed).await;
    run_to(&store, ids[1], JobStatus::Cancelled).await;

    let next = store.next_queued().await.unwrap().unwrap();

    assert_eq!(next.id, ids[2]);
}

#[doc(hidden)]
pub async fn next_queued_empty(store: impl JobStore) {
    assert_eq!(store.next_queued().await.unwrap(), None);

    let ids = insert_jobs(&store, 1).await;
    run_to(&store, ids[0], JobStatus::Running).await;

    assert_eq!(store.next_queued().await.unwrap(), None);
}

#[doc(hidden)]
pub async fn next_queued_does_not_claim(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;

    let first = store.next_queued().await.unwrap().unwrap();
    let second = store.next_queued().await.unwrap().unwrap();

    assert_eq!(first.id, ids[0]);
    assert_eq!(first, second);
    assert_eq!(second.status, JobStatus::Queued);
}

#[doc(hidden)]
pub async fn transition_start(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;

    let job = store.transition(ids[0], Transition::Start).await.unwrap();

    assert_eq!(job.status, JobStatus::Running);
    assert!(job.started_at.is_some());
    assert_eq!(job.completed_at, None);
    assert_eq!(store.get(ids[0]).await.unwrap(), job);
}

#[doc(hidden)]
pub async fn transition_start_while_running(store: impl JobStore) {
    let ids = insert_jobs(&store, 2).await;
    run_to(&store, ids[0], JobStatus::Running).await;

    assert!(matches!(
        store.transition(ids[1], Transition::Start).await,
        Err(StoreError::AlreadyRunning(running)) if running == ids[0]
    ));
    assert_eq!(
        store.get(ids[1]).await.unwrap().status,
        JobStatus::Queued
    );
}

#[doc(hidden)]
pub async fn transition_complete(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;
    run_to(&store, ids[0], JobStatus::Running).await;
    let result = serde_json::json!({ "inserted": 12 });

    let job = store
        .transition(
            ids[0],
            Transition::Complete {
                result: result.clone(),
            },
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(result));
    assert_eq!(job.error_message, None);
    assert!(job.completed_at >= job.started_at);
}

#[doc(hidden)]
pub async fn transition_fail(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;
    run_to(&store, ids[0], JobStatus::Running).await;

    let job = store
        .transition(
            ids[0],
            Transition::Fail {
                error_message: "connection reset".to_owned(),
            },
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("connection reset"));
    assert_eq!(job.result, None);
    assert!(job.completed_at.is_some());
}

#[doc(hidden)]
pub async fn transition_cancel(store: impl JobStore) {
    let ids = insert_jobs(&store, 2).await;

    let job = store.transition(ids[0], Transition::Cancel).await.unwrap();

    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.started_at, None);
    assert!(job.completed_at.is_some());
    assert_eq!(store.next_queued().await.unwrap().unwrap().id, ids[1]);
}

#[doc(hidden)]
pub async fn transition_cancel_running(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;
    run_to(&store, ids[0], JobStatus::Running).await;

    assert!(matches!(
        store.transition(ids[0], Transition::Cancel).await,
        Err(StoreError::InvalidTransition {
            from: JobStatus::Running,
            to: JobStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(
        store.get(ids[0]).await.unwrap().status,
        JobStatus::Running
    );
}

#[doc(hidden)]
pub async fn transition_from_terminal(store: impl JobStore) {
    let ids = insert_jobs(&store, 3).await;
    run_to(&store, ids[0], JobStatus::Completed).await;
    run_to(&store, ids[1], JobStatus::Failed).await;
    run_to(&store, ids[2], JobStatus::Cancelled).await;

    for id in ids {
        let before = store.get(id).await.unwrap();
        for transition in [
            Transition::Start,
            Transition::Cancel,
            Transition::Complete {
                result: serde_json::Value::Null,
            },
            Transition::Fail {
                error_message: "late".to_owned(),
            },
        ] {
            assert!(matches!(
                store.transition(id, transition).await,
                Err(StoreError::InvalidTransition { from, .. }) if from == before.status
            ));
        }
        assert_eq!(store.get(id).await.unwrap(), before);
    }
}

#[doc(hidden)]
pub async fn transition_complete_queued(store: impl JobStore) {
    let ids = insert_jobs(&store, 1).await;

    assert!(matches!(
        store
            .transition(
                ids[0],
                Transition::Complete {
                    result: serde_json::Value::Null
                }
            )
            .await,
        Err(StoreError::InvalidTransition {
            from: JobStatus::Queued,
            to: JobStatus::Completed,
            ..
        })
    ));
}

#[doc(hidden)]
pub async fn transition_not_found(store: impl JobStore) {
    let id = JobId::from(1000);

    assert!(matches!(
        store.transition(id, Transition::Cancel).await,
        Err(StoreError::JobNotFound(not_found)) if not_found == id
    ));
}

#[doc(hidden)]
pub async fn list_all_in_insertion_order(store: impl JobStore) {
    let ids = insert_jobs(&store, 5).await;
    run_to(&store, ids[3], JobStatus::Cancelled).await;
    run_to(&store, ids[1], JobStatus::Completed).await;

    let listed = store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect::<Vec<_>>();

    assert_eq!(listed, ids);
}

#[doc(hidden)]
pub async fn remove_terminal(store: impl JobStore) {
    let ids = insert_jobs(&store, 5).await;
    run_to(&store, ids[0], JobStatus::Completed).await;
    run_to(&store, ids[1], JobStatus::Failed).await;
    run_to(&store, ids[2], JobStatus::Cancelled).await;
    run_to(&store, ids[3], JobStatus::Running).await;

    let removed = store.remove_terminal().await.unwrap();

    assert_eq!(removed, 3);
    let remaining = store.list_all().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].id, ids[3]);
    assert_eq!(remaining[0].status, JobStatus::Running);
    assert_eq!(remaining[1].id, ids[4]);
    assert_eq!(remaining[1].status, JobStatus::Queued);
}

#[doc(hidden)]
pub async fn remove_terminal_twice(store: impl JobStore) {
    let ids = insert_jobs(&store, 2).await;
    run_to(&store, ids[0], JobStatus::Completed).await;

    assert_eq!(store.remove_terminal().await.unwrap(), 1);
    assert_eq!(store.remove_terminal().await.unwrap(), 0);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[doc(hidden)]
pub async fn ids_not_reused_after_remove(store: impl JobStore) {
    let ids = insert_jobs(&store, 2).await;
    run_to(&store, ids[0], JobStatus::Completed).await;
    run_to(&store, ids[1], JobStatus::Cancelled).await;
    store.remove_terminal().await.unwrap();

    let job = store.insert(FetchRequest::mock_request()).await.unwrap();

    assert!(!ids.contains(&job.id));
    assert!(job.id > ids[1]);
}

#[doc(hidden)]
pub async fn prune_terminal(store: impl JobStore) {
    let ids = insert_jobs(&store, 3).await;
    run_to(&store, ids[0], JobStatus::Completed).await;
    run_to(&store, ids[1], JobStatus::Cancelled).await;

    let removed = store
        .prune_terminal(Utc::now().sub(TimeDelta::hours(1)))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let removed = store
        .prune_terminal(Utc::now().add(TimeDelta::seconds(1)))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    let remaining = store.list_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ids[2]);
}

#[doc(hidden)]
pub async fn query(store: impl JobStore) {
    let d1 = store
        .insert(FetchRequest::new("D1", "prospect"))
        .await
        .unwrap();
    let d2 = store.insert(FetchRequest::new("D2", "pkb")).await.unwrap();
    let d1_parts = store
        .insert(FetchRequest::new("D1", "parts_inbound"))
        .await
        .unwrap();
    run_to(&store, d2.id, JobStatus::Failed).await;

    let ids = |jobs: Vec<Job>| jobs.into_iter().map(|job| job.id).collect::<Vec<_>>();

    assert_eq!(
        ids(store.query(Query::DealerEquals("D1")).await.unwrap()),
        vec![d1.id, d1_parts.id]
    );
    assert_eq!(
        ids(store
            .query(Query::StatusEqual(JobStatus::Failed))
            .await
            .unwrap()),
        vec![d2.id]
    );
    assert_eq!(
        ids(store
            .query(Query::And(vec![
                Query::DealerEquals("D1"),
                Query::FetchTypeEqual("parts_inbound"),
            ]))
            .await
            .unwrap()),
        vec![d1_parts.id]
    );
    assert!(store
        .query(Query::DealerEquals("D3"))
        .await
        .unwrap()
        .is_empty());
}
