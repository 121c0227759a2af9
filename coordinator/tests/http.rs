use std::{net::SocketAddr, sync::Arc};

use comms::{
    WeightVector,
    msg::{
        Ack, CLIENT_UPDATE_PATH, ErrorKind, ErrorResponse, GLOBAL_MODEL_PATH,
        GlobalModelResponse, REGISTER_PATH, STATUS_PATH, Status, StatusResponse, UpdateResponse,
    },
};
use coordinator::{RoundCoordinator, RoundPolicy, service};
use ndarray::arr1;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;

async fn spawn_coordinator(initial: WeightVector) -> SocketAddr {
    let coordinator = Arc::new(RoundCoordinator::new(initial, RoundPolicy::default()));
    let app = service::router(coordinator, 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

#[tokio::test(flavor = "multi_thread")]
async fn full_round_over_http() {
    let addr = spawn_coordinator(WeightVector::new(vec![arr1(&[0.]).into_dyn()])).await;
    let http = Client::new();

    for client_id in [1, 2] {
        let ack: Ack = http
            .post(url(addr, REGISTER_PATH))
            .json(&json!({ "client_id": client_id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack.status, Status::Success);
    }

    let global: GlobalModelResponse = http
        .get(url(addr, GLOBAL_MODEL_PATH))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(global.round, 0);
    assert_eq!(global.weights.layers()[0].as_slice().unwrap(), &[0.]);

    let first: UpdateResponse = http
        .post(url(addr, CLIENT_UPDATE_PATH))
        .json(&json!({
            "client_id": 1,
            "weights": [[1.0]],
            "metrics": {"loss": [0.9, 0.5], "mae": [0.4]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!first.aggregated);

    let second: UpdateResponse = http
        .post(url(addr, CLIENT_UPDATE_PATH))
        .json(&json!({ "client_id": 2, "weights": [[3.0]] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(second.aggregated);
    assert_eq!(second.round, 0);

    let global: GlobalModelResponse = http
        .get(url(addr, GLOBAL_MODEL_PATH))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(global.round, 1);
    assert_eq!(global.weights.layers()[0].as_slice().unwrap(), &[2.]);

    let status: StatusResponse = http
        .get(url(addr, STATUS_PATH))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status.round, 1);
    assert_eq!(status.registered, [1, 2]);
    let last = status.last_completed.unwrap();
    assert_eq!(last.participants, [1, 2]);
    assert_eq!(last.mean_metrics.get("loss"), Some(0.5));
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_update_is_not_found() {
    let addr = spawn_coordinator(WeightVector::new(vec![arr1(&[0.]).into_dyn()])).await;

    let res = Client::new()
        .post(url(addr, CLIENT_UPDATE_PATH))
        .json(&json!({ "client_id": 42, "weights": [[1.0]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body: ErrorResponse = res.json().await.unwrap();
    assert_eq!(body.status, Status::Error);
    assert_eq!(body.kind, ErrorKind::UnregisteredClient);
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_shape_is_unprocessable() {
    let addr = spawn_coordinator(WeightVector::new(vec![arr1(&[0., 0.]).into_dyn()])).await;
    let http = Client::new();

    http.post(url(addr, REGISTER_PATH))
        .json(&json!({ "client_id": 1 }))
        .send()
        .await
        .unwrap();

    let res = http
        .post(url(addr, CLIENT_UPDATE_PATH))
        .json(&json!({ "client_id": 1, "weights": [[1.0, 2.0, 3.0]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: ErrorResponse = res.json().await.unwrap();
    assert_eq!(body.kind, ErrorKind::ShapeMismatch);
}
