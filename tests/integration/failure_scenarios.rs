//! Failure scenarios: broken storage, failing or hanging providers

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use easygrow_relay::{
    alerts::AlertFanout,
    classifier::SeverityTier,
    config::ActuatorNotifyPolicy,
    events::RawMessage,
    hub::BroadcastHub,
    notify::Channel,
    pipeline::{AlertStatus, MessageOutcome},
};

use crate::helpers::*;

#[tokio::test]
async fn test_storage_failure_still_broadcasts_and_alerts() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::with_owner(Some(full_owner()))),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let payload = reading_payload("sensor de temperatura", 40.0);
    let outcome = pipeline
        .handle(RawMessage::new("datos_sensores", payload.clone()))
        .await;

    assert_eq!(viewer.try_recv(), Some(payload));
    let MessageOutcome::Reading {
        severity: SeverityTier::Critical,
        alert: AlertStatus::Dispatched(task),
    } = outcome
    else {
        panic!("expected a dispatched alert, got {outcome:?}");
    };

    let report = task.await.unwrap();
    assert_eq!(report.delivered().len(), 4);
}

#[tokio::test]
async fn test_owner_lookup_failure_skips_alert() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::broken()),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 40.0),
        ))
        .await;

    assert!(viewer.try_recv().is_some());
    assert_matches!(
        outcome,
        MessageOutcome::Reading {
            severity: SeverityTier::Critical,
            alert: AlertStatus::ResolutionFailed
        }
    );
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_actuator_storage_failure_still_notifies() {
    let hub = BroadcastHub::new(16);
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::with_owner(Some(full_owner()))),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new("eventos_bomba", actuator_payload("Bomba activada")))
        .await;

    let MessageOutcome::Actuator { notice: Some(task) } = outcome else {
        panic!("expected an actuator notice, got {outcome:?}");
    };
    assert!(task.await.unwrap().is_delivered());
}

#[tokio::test]
async fn test_hanging_provider_does_not_block_the_pipeline() {
    let hub = BroadcastHub::new(16);
    let mut viewer = hub.subscribe();
    let log = new_log();
    let fanout = Arc::new(AlertFanout::new(vec![
        dispatcher(
            Channel::Email,
            vec![RecordingProvider::new("stuck", Behaviour::Hang, &log)],
        ),
        dispatcher(
            Channel::ChatBot,
            vec![RecordingProvider::new("chat", Behaviour::Succeed, &log)],
        ),
    ]));
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::with_owner(Some(full_owner()))),
        fanout,
        ActuatorNotifyPolicy::Always,
    );

    // the alert is dispatched on its own task, so the next message is
    // handled while the stuck provider is still waiting
    let first = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de temperatura", 40.0),
        )),
    )
    .await
    .expect("critical reading blocked the pipeline");
    let second = reading_payload("sensor de temperatura", 21.0);
    tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.handle(RawMessage::new("datos_sensores", second.clone())),
    )
    .await
    .expect("next reading blocked the pipeline");

    viewer.try_recv().unwrap();
    assert_eq!(viewer.try_recv(), Some(second));

    let MessageOutcome::Reading {
        alert: AlertStatus::Dispatched(task),
        ..
    } = first
    else {
        panic!("expected a dispatched alert, got {first:?}");
    };
    let report = task.await.unwrap();
    assert_eq!(report.exhausted(), vec![Channel::Email]);
    assert_eq!(report.delivered(), vec![Channel::ChatBot]);
}

#[tokio::test]
async fn test_unregistered_device_gets_no_alert() {
    let hub = BroadcastHub::new(16);
    let log = new_log();
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::with_owner(None)),
        all_channels_fanout(&log),
        ActuatorNotifyPolicy::Always,
    );

    let outcome = pipeline
        .handle(RawMessage::new(
            "datos_sensores",
            reading_payload("sensor de humedad del suelo", 95.0),
        ))
        .await;

    assert_matches!(
        outcome,
        MessageOutcome::Reading {
            severity: SeverityTier::Critical,
            alert: AlertStatus::NoOwner
        }
    );
    assert!(called(&log).is_empty());
}

#[tokio::test]
async fn test_slow_viewer_is_evicted_without_blocking() {
    let hub = BroadcastHub::new(2);
    let mut fast = hub.subscribe();
    let _slow = hub.subscribe();
    let pipeline = pipeline(
        &hub,
        Arc::new(FailingGateway::with_owner(None)),
        all_channels_fanout(&new_log()),
        ActuatorNotifyPolicy::Never,
    );

    for valor in 0..5 {
        pipeline
            .handle(RawMessage::new(
                "datos_sensores",
                reading_payload("sensor de temperatura", 20.0 + f64::from(valor)),
            ))
            .await;
        assert!(fast.try_recv().is_some());
    }

    assert_eq!(hub.subscriber_count(), 1);
}
