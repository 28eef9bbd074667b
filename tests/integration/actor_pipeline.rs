//! End-to-end tests: queue consumer → pipeline → hub, storage and alerts

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use easygrow_relay::{
    actors::consumer::ConsumerHandle,
    classifier::SeverityTier,
    config::ActuatorNotifyPolicy,
    events::RawMessage,
    hub::BroadcastHub,
    notify::{Channel, Destination, dispatcher::ChannelStatus},
    pipeline::{AlertStatus, MessageOutcome},
    source::ChannelSource,
    storage::MemoryGateway,
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_critical_temperature_alerts_every_channel() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let payload = reading_payload("sensor de temperatura", 40.0);
    let outcome = pipeline
        .handle(RawMessage::new("datos_sensores", payload.clone()))
        .await;

    assert_eq!(viewer.try_recv(), Some(payload));

    let MessageOutcome::Reading {
        severity,
        alert: AlertStatus::Dispatched(task),
    } = outcome
    else {
        panic!("expected a dispatched alert, got {outcome:?}");
    };
    assert_eq!(severity, SeverityTier::Critical);

    let report = task.await.unwrap();
    assert_eq!(report.device_id, DEVICE);
    assert_eq!(report.delivered().len(), 4);
    assert!(report.exhausted().is_empty());

    let mut providers = called(&log);
    providers.sort();
    assert_eq!(providers, vec!["chat", "mail", "sms", "voice"]);

    let alerts = gateway.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].sensor, "sensor de temperatura");
    assert_eq!(alerts[0].severity, SeverityTier::Critical);
    assert_eq!(gateway.reading_count().await, 1);
}

#[tokio::test]
async fn test_normal_reading_is_stored_without_alert() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 22.0),
        ))
        .await;

    assert_matches!(
        outcome,
        MessageOutcome::Reading {
            severity: SeverityTier::Normal,
            alert: AlertStatus::NotRaised
        }
    );
    assert_eq!(gateway.reading_count().await, 1);
    assert!(gateway.alerts().await.is_empty());
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_warning_reading_does_not_alert() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 32.0),
        ))
        .await;

    assert_matches!(
        outcome,
        MessageOutcome::Reading {
            severity: SeverityTier::Warning,
            alert: AlertStatus::NotRaised
        }
    );
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_still_relayed() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let payload = Bytes::from_static(b"{not json");
    let outcome = pipeline
        .handle(RawMessage::new("datos_sensores", payload.clone()))
        .await;

    assert_matches!(outcome, MessageOutcome::Undecodable(_));
    assert_eq!(viewer.try_recv(), Some(payload));
    assert_eq!(gateway.reading_count().await, 0);
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_unrecognized_shape_is_relayed_and_dropped() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Always,
    );

    let payload = Bytes::from_static(br#"{"mac_address":"AA:BB","hola":1}"#);
    let outcome = pipeline
        .handle(RawMessage::new("datos_sensores", payload.clone()))
        .await;

    assert_matches!(outcome, MessageOutcome::Unrecognized);
    assert_eq!(viewer.try_recv(), Some(payload));
    assert_eq!(gateway.reading_count().await, 0);
}

#[tokio::test]
async fn test_actuator_event_notifies_chat_bot_only() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let payload = actuator_payload("Bomba activada");
    let outcome = pipeline
        .handle(RawMessage::new("eventos_bomba", payload.clone()))
        .await;

    assert_eq!(viewer.try_recv(), Some(payload));
    let MessageOutcome::Actuator { notice: Some(task) } = outcome else {
        panic!("expected an actuator notice, got {outcome:?}");
    };

    let report = task.await.unwrap();
    assert_eq!(report.channel, Channel::ChatBot);
    assert!(report.is_delivered());

    assert_eq!(called(&log), vec!["chat"]);
    let sent = log.lock().unwrap();
    assert_eq!(sent[0].1, Destination::Phone(OWNER_PHONE.to_string()));
    assert!(sent[0].2.body.contains("Bomba activada"));
    drop(sent);

    let events = gateway.actuator_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "Bomba activada");
}

#[tokio::test]
async fn test_actuator_notice_can_be_disabled() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Never,
    );

    let outcome = pipeline
        .handle(RawMessage::new("eventos_bomba", actuator_payload("Bomba activada")))
        .await;

    assert_matches!(outcome, MessageOutcome::Actuator { notice: None });
    assert_eq!(gateway.actuator_events().await.len(), 1);
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_critical_without_owner_is_persisted_only() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, None).await;
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 2.0),
        ))
        .await;

    assert_matches!(
        outcome,
        MessageOutcome::Reading {
            severity: SeverityTier::Critical,
            alert: AlertStatus::NoOwner
        }
    );
    assert_eq!(gateway.alerts().await.len(), 1);
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_consumer_relays_in_queue_order() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = Arc::new(pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    ));

    let (tx, source) = ChannelSource::new("datos_sensores", 16);
    let consumer = ConsumerHandle::spawn(source, pipeline);

    let payloads: Vec<Bytes> = [21.0, 22.0, 23.0]
        .into_iter()
        .map(|valor| reading_payload("sensor de temperatura", valor))
        .collect();
    for payload in &payloads {
        tx.send(Ok(payload.clone())).await.unwrap();
    }

    for expected in &payloads {
        let received = tokio::time::timeout(Duration::from_secs(1), viewer.recv())
            .await
            .expect("viewer timed out")
            .unwrap();
        assert_eq!(&received, expected);
    }

    let stats = consumer.stats().await.unwrap();
    assert_eq!(stats.queue, "datos_sensores");
    assert_eq!(stats.received, 3);
    assert_eq!(stats.readings, 3);
    assert_eq!(stats.alerts_dispatched, 0);

    consumer.shutdown().await;
    let stats = consumer.wait().await.unwrap();
    assert_eq!(stats.received, 3);
}

#[tokio::test]
async fn test_consumer_counts_outcomes() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let log = new_log();
    let pipeline = Arc::new(pipeline(
        &hub,
        gateway.clone(),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    ));

    let (tx, source) = ChannelSource::new("eventos_bomba", 16);
    let consumer = ConsumerHandle::spawn(source, pipeline);

    tx.send(Ok(reading_payload("sensor de temperatura", 40.0)))
        .await
        .unwrap();
    tx.send(Ok(actuator_payload("Bomba desactivada"))).await.unwrap();
    tx.send(Ok(Bytes::from_static(b"garbage"))).await.unwrap();
    tx.send(Err(anyhow::anyhow!("channel reset"))).await.unwrap();
    drop(tx);

    // closing the source stops the actor
    let stats = tokio::time::timeout(Duration::from_secs(1), consumer.wait())
        .await
        .expect("consumer did not stop")
        .unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.readings, 1);
    assert_eq!(stats.alerts_dispatched, 1);
    assert_eq!(stats.actuator_events, 1);
    assert_eq!(stats.undecodable, 1);
    assert_eq!(stats.receive_errors, 1);
}

#[tokio::test]
async fn test_fanout_report_lists_every_channel() {
    let hub = BroadcastHub::new(16);
    let gateway = Arc::new(MemoryGateway::new());
    gateway.register_device(DEVICE, Some(full_owner())).await;
    let pipeline = pipeline(
        &hub,
        gateway,
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de luminosidad", 10.0),
        ))
        .await;

    let MessageOutcome::Reading {
        alert: AlertStatus::Dispatched(task),
        ..
    } = outcome
    else {
        panic!("expected a dispatched alert, got {outcome:?}");
    };
    let report = task.await.unwrap();

    for channel in Channel::ALL {
        let channel_report = report.channel(channel).unwrap();
        assert_matches!(channel_report.status, ChannelStatus::Delivered { .. });
        assert_eq!(channel_report.attempts.len(), 1);
    }
}
