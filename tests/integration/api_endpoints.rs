//! HTTP and WebSocket surface

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use easygrow_relay::{
    api::{ApiConfig, ApiState, router, spawn_api_server, types::HealthResponse},
    config::ActuatorNotifyPolicy,
    events::RawMessage,
    hub::BroadcastHub,
    storage::{MemoryGateway, PersistenceGateway},
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use crate::helpers::*;

fn state(hub: &BroadcastHub, gateway: Arc<dyn PersistenceGateway>) -> ApiState {
    ApiState::new(
        hub.clone(),
        gateway,
        vec!["datos_sensores".to_string(), "eventos_bomba".to_string()],
    )
}

async fn start(state: ApiState) -> SocketAddr {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    spawn_api_server(config, state).await.unwrap()
}

async fn wait_for_viewers(hub: &BroadcastHub, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer did not subscribe");
}

#[tokio::test]
async fn test_health_endpoint() {
    let hub = BroadcastHub::new(16);
    let addr = start(state(&hub, Arc::new(MemoryGateway::new()))).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "easygrow-relay");
    assert_eq!(health.queues, vec!["datos_sensores", "eventos_bomba"]);
    assert_eq!(health.viewers, 0);
    assert_eq!(health.storage, "ok");
}

#[tokio::test]
async fn test_health_reports_degraded_storage() {
    let hub = BroadcastHub::new(16);
    let addr = start(state(&hub, Arc::new(FailingGateway::with_owner(None)))).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "degraded");
    assert!(health.storage.contains("disk full"));
}

#[tokio::test]
async fn test_readings_history() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Never,
    );
    for valor in [20.0, 21.0, 22.0] {
        pipeline
            .handle(RawMessage::new(
                "datos_sensores",
                reading_payload("sensor de temperatura", valor),
            ))
            .await;
    }
    let addr = start(state(&hub, gateway)).await;

    let body: serde_json::Value =
        reqwest::get(format!("http://{addr}/api/v1/devices/{DEVICE}/readings?limit=2"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

    assert_eq!(body["device_id"], DEVICE);
    assert_eq!(body["count"], 2);
    assert_eq!(body["readings"][0]["value"], 22.0);
    assert_eq!(body["readings"][0]["severity"], "normal");
}

#[tokio::test]
async fn test_alerts_history() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, None).await;
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Never,
    );
    pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 40.0),
        ))
        .await;
    let addr = start(state(&hub, gateway)).await;

    let body: serde_json::Value =
        reqwest::get(format!("http://{addr}/api/v1/devices/{DEVICE}/alerts"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

    assert_eq!(body["count"], 1);
    assert_eq!(body["alerts"][0]["severity"], "critical");
    assert_eq!(body["alerts"][0]["sensor"], "sensor de temperatura");
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let hub = BroadcastHub::new(16);
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
    };
    let app = router(&config, state(&hub, Arc::new(MemoryGateway::new())));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/devices/{DEVICE}/readings?limit=0"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_error_is_500() {
    let hub = BroadcastHub::new(16);
    let addr = start(state(&hub, Arc::new(FailingGateway::with_owner(None)))).await;

    let response = reqwest::get(format!("http://{addr}/api/v1/devices/{DEVICE}/readings"))
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_websocket_receives_relayed_payloads() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Never,
    );
    let addr = start(state(&hub, gateway)).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    wait_for_viewers(&hub, 1).await;

    let reading = reading_payload("sensor de temperatura", 22.0);
    let garbage = Bytes::from_static(&[0xff, 0xfe, 0x00]);
    pipeline
        .handle(RawMessage::new("datos_sensores", reading.clone()))
        .await;
    pipeline
        .handle(RawMessage::new("datos_sensores", garbage.clone()))
        .await;

    let first = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        first,
        Message::Text(String::from_utf8(reading.to_vec()).unwrap())
    );

    let second = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second, Message::Binary(garbage.to_vec()));
}

#[tokio::test]
async fn test_websocket_disconnect_unsubscribes() {
    let hub = BroadcastHub::new(16);
    let addr = start(state(&hub, Arc::new(MemoryGateway::new()))).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    wait_for_viewers(&hub, 1).await;

    socket.close(None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer was not removed");
}
