//! Concurrent consumers and viewers

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use easygrow_relay::{
    actors::consumer::ConsumerHandle, config::ActuatorNotifyPolicy, hub::BroadcastHub,
    source::ChannelSource, storage::MemoryGateway,
};
use futures::future::join_all;

use crate::helpers::*;

#[tokio::test]
async fn test_two_queues_share_one_pipeline() {
    let hub = BroadcastHub::new(256);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let pipeline = Arc::new(pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Never,
    ));

    let (sensor_tx, sensor_source) = ChannelSource::new("datos_sensores", 64);
    let (actuator_tx, actuator_source) = ChannelSource::new("eventos_bomba", 64);
    let sensors = ConsumerHandle::spawn(sensor_source, pipeline.clone());
    let actuators = ConsumerHandle::spawn(actuator_source, pipeline);

    let sensor_feed = tokio::spawn(async move {
        for i in 0..50 {
            let payload = reading_payload("sensor de temperatura", 20.0 + f64::from(i % 5));
            sensor_tx.send(Ok(payload)).await.unwrap();
        }
    });
    let actuator_feed = tokio::spawn(async move {
        for i in 0..50 {
            let label = if i % 2 == 0 { "Bomba activada" } else { "Bomba desactivada" };
            actuator_tx.send(Ok(actuator_payload(label))).await.unwrap();
        }
    });
    sensor_feed.await.unwrap();
    actuator_feed.await.unwrap();

    // the feeds dropped their senders, so both consumers drain and stop
    let sensor_stats = tokio::time::timeout(Duration::from_secs(5), sensors.wait())
        .await
        .expect("sensor consumer did not stop")
        .unwrap();
    let actuator_stats = tokio::time::timeout(Duration::from_secs(5), actuators.wait())
        .await
        .expect("actuator consumer did not stop")
        .unwrap();

    assert_eq!(sensor_stats.readings, 50);
    assert_eq!(actuator_stats.actuator_events, 50);
    assert_eq!(gateway.reading_count().await, 50);
    assert_eq!(gateway.actuator_events().await.len(), 50);

    let mut relayed = 0;
    while viewer.try_recv().is_some() {
        relayed += 1;
    }
    assert_eq!(relayed, 100);
}

#[tokio::test]
async fn test_many_viewers_see_the_same_stream() {
    let hub = BroadcastHub::new(64);
    let viewers: Vec<_> = (0..20).map(|_| hub.subscribe()).collect();

    let payloads: Vec<Bytes> = (0..10)
        .map(|i| reading_payload("sensor de humedad", 50.0 + f64::from(i)))
        .collect();
    for payload in &payloads {
        assert_eq!(hub.publish(payload.clone()), 20);
    }

    let received = join_all(viewers.into_iter().map(|mut viewer| async move {
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(viewer.recv().await.unwrap());
        }
        seen
    }))
    .await;

    for seen in received {
        assert_eq!(seen, payloads);
    }
}

#[tokio::test]
async fn test_viewers_come_and_go_during_publishing() {
    let hub = BroadcastHub::new(1024);

    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                hub.publish(Bytes::from(format!("{{\"n\":{i}}}")));
                tokio::task::yield_now().await;
            }
        })
    };

    let churn = (0..10).map(|_| {
        let hub = hub.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                let subscription = hub.subscribe();
                tokio::task::yield_now().await;
                drop(subscription);
            }
        })
    });

    for task in join_all(churn).await {
        task.unwrap();
    }
    publisher.await.unwrap();

    assert_eq!(hub.subscriber_count(), 0);
}
