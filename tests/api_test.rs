//! HTTP surface tests: the router served on an ephemeral port, driven with reqwest

mod fixtures;
mod helpers;

use fixtures::uris;
use helpers::*;
use listing_autofill::app_state::AppState;
use listing_autofill::models::pipeline::{
    BatchView, GenerationResponse, RequeueResponse, StartResponse,
};
use listing_autofill::models::work_item::ItemStatus;
use listing_autofill::routes;
use listing_autofill::services::scheduler::RunOptions;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

async fn spawn_app(fake: Arc<FakeVision>) -> String {
    let state = AppState::new(fake, RunOptions::default());
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server error");
    });
    format!("http://{}", addr)
}

async fn get_batch(client: &reqwest::Client, base_url: &str) -> BatchView {
    client
        .get(format!("{}/api/v1/batch", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll the batch view until the run is no longer running.
async fn wait_for_batch(client: &reqwest::Client, base_url: &str) -> BatchView {
    for _ in 0..500 {
        let view = get_batch(client, base_url).await;
        if !view.running {
            return view;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Batch did not finish in time");
}

async fn wait_for_stage(
    client: &reqwest::Client,
    base_url: &str,
    stage: &str,
) -> serde_json::Value {
    for _ in 0..500 {
        let view: serde_json::Value = client
            .get(format!("{}/api/v1/single", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if view["stage"] == stage {
            return view;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Single run never reached stage {stage}");
}

#[tokio::test]
async fn test_health_check() {
    let base_url = spawn_app(FakeVision::new().into_arc()).await;
    let response = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["batch"]["running"], false);
}

#[tokio::test]
async fn test_batch_configure_start_and_requeue() {
    let base_url = spawn_app(FakeVision::new().into_arc()).await;
    let client = reqwest::Client::new();
    let inputs = uris(3);

    let configured: BatchView = client
        .post(format!("{}/api/v1/batch", base_url))
        .json(&json!({ "inputs": inputs, "concurrency": 2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(statuses(&configured.items), vec![ItemStatus::Pending; 3]);
    assert_eq!(configured.progress.percent, 0);

    let start: StartResponse = client
        .post(format!("{}/api/v1/batch/start", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(start.started);

    let view = wait_for_batch(&client, &base_url).await;
    assert_eq!(statuses(&view.items), vec![ItemStatus::Done; 3]);
    assert_eq!(view.progress.percent, 100);

    let requeued: RequeueResponse = client
        .post(format!("{}/api/v1/batch/requeue", base_url))
        .json(&json!({ "uri": inputs[0] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requeued.requeued, 1);

    let requeued: RequeueResponse = client
        .post(format!("{}/api/v1/batch/requeue", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requeued.requeued, 2);

    let view = get_batch(&client, &base_url).await;
    assert!(!view.running);
    assert_eq!(statuses(&view.items), vec![ItemStatus::Pending; 3]);
}

#[tokio::test]
async fn test_batch_cancel() {
    let gate = Gate::new();
    let base_url = spawn_app(FakeVision::new().gate_all(&gate).into_arc()).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/v1/batch", base_url))
        .json(&json!({ "inputs": uris(4) }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/api/v1/batch/start", base_url))
        .send()
        .await
        .unwrap();

    let cancelled: serde_json::Value = client
        .post(format!("{}/api/v1/batch/cancel", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cancelled["cancelled"], true);
    gate.open();
    sleep(Duration::from_millis(20)).await;

    let view = get_batch(&client, &base_url).await;
    assert!(!view.running);
    assert_eq!(statuses(&view.items), vec![ItemStatus::Pending; 4]);
}

#[tokio::test]
async fn test_batch_configure_validation() {
    let base_url = spawn_app(FakeVision::new().into_arc()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/batch", base_url))
        .json(&json!({ "inputs": uris(2), "concurrency": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .post(format!("{}/api/v1/batch", base_url))
        .json(&json!({ "inputs": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .post(format!("{}/api/v1/batch", base_url))
        .json(&json!({ "inputs": [""] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_single_run_flow() {
    let base_url = spawn_app(FakeVision::new().into_arc()).await;
    let client = reqwest::Client::new();
    let uri = uris(1).remove(0);

    let response = client
        .post(format!("{}/api/v1/single/run", base_url))
        .json(&json!({ "input": uri }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: GenerationResponse = response.json().await.unwrap();
    assert_eq!(accepted.generation, 1);

    let view = wait_for_stage(&client, &base_url, "done").await;
    assert_eq!(view["classification"]["category"], category_for(&uri));
    assert_eq!(view["generation"], 1);

    let response = client
        .post(format!("{}/api/v1/single/describe", base_url))
        .json(&json!({ "category": "Chairs", "labels": ["oak"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let view = wait_for_stage(&client, &base_url, "done").await;
    assert_eq!(view["description"]["blurb"], "blurb for Chairs");
}

#[tokio::test]
async fn test_single_run_rejections() {
    let base_url = spawn_app(FakeVision::new().into_arc()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/single/regenerate", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/api/v1/single/describe", base_url))
        .json(&json!({ "category": "", "labels": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .post(format!("{}/api/v1/single/run", base_url))
        .json(&json!({ "input": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
