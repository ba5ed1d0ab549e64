use std::{str::FromStr, time::Duration};

use chrono::TimeDelta;
use fetch_queue::{api::ClearCompletedResponse, prelude::*};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: &str = "FETCH_QUEUE_POLL_INTERVAL_MS";

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let poll_interval = std::env::var(POLL_INTERVAL)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(QueueConfig::DEFAULT_POLL_INTERVAL);
    let queue = FetchQueue::with_config(
        InMemoryStore::new(),
        QueueConfig::default().with_poll_interval(poll_interval),
    );

    let dispatcher = queue.spawn_dispatcher(simulate_fetch).unwrap();
    let pruner = queue.spawn_pruner(
        PrunerConfig::new(cron::Schedule::from_str("0 * * * * *").unwrap())
            .with_max_age(TimeDelta::minutes(10)),
    );

    let d1 = queue
        .enqueue(FetchRequest::new("D1", "prospect"))
        .await
        .unwrap();
    let d2 = FetchRequest::builder("D2", "pkb")
        .with_window("2024-01-01 00:00:00", "2024-01-31 23:59:59")
        .enqueue_to(&queue)
        .await
        .unwrap();
    let d3 = FetchRequest::builder("D3", "parts_inbound")
        .with_extra_param("PO-1234")
        .enqueue_to(&queue)
        .await
        .unwrap();
    println!("Enqueued {d1}, {d2} and {d3}");

    let cancelled = queue.cancel(d3).await.unwrap();
    println!("Cancelled {}: {}", cancelled.id, cancelled.status);

    let status = queue.get_queue_status().await.unwrap();
    println!("{}", serde_json::to_string_pretty(&status).unwrap());

    loop {
        let status = queue.get_queue_status().await.unwrap();
        if status.queue_length == 0 && !status.is_processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    for id in [d1, d2, d3] {
        let job = queue.get_status(id).await.unwrap();
        println!("{}", serde_json::to_string_pretty(&job).unwrap());
    }

    let cleared = ClearCompletedResponse {
        cleared_count: queue.clear_completed().await.unwrap(),
    };
    println!("{}", serde_json::to_string(&cleared).unwrap());

    dispatcher.graceful_shutdown().await.unwrap();
    pruner.graceful_shutdown().await.unwrap();
}

async fn simulate_fetch(request: FetchRequest) -> ExecutionResult {
    println!(
        "Fetching {} data for dealer {}",
        request.fetch_type, request.dealer_id
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    if request.dealer_id == "D2" {
        return Err("Dealer portal returned 502".into());
    }
    Ok(serde_json::json!({
        "dealer_id": request.dealer_id,
        "fetch_type": request.fetch_type,
        "rows": 42,
    }))
}
