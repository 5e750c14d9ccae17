mod common;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use common::{RecordingSink, assert_nothing_saved, next_saved};
use env_telemetry::{
    error::{PersistError, SinkError},
    listener::{PersistenceListeners, listen_changes_in_date, persist_current},
    push::{PushEvent, PushHub},
    router::TopicRouter,
    store::{MemoryStore, RealtimeStore},
    telemetry::SensorIdentity,
    writer::{format_date, update_temperature},
};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(1);

fn identity() -> SensorIdentity {
    SensorIdentity::new("dev1", "mod2", "3")
}

async fn seed(store: &dyn RealtimeStore, id: &SensorIdentity, record: serde_json::Value) {
    store.set(&id.path(), record).await.unwrap();
}

fn date(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn listener_saves_once_per_confirmed_date_change() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    seed(
        &*store,
        &identity(),
        json!({ "aq": 42.5, "h2s": 0.3, "humidity": 61.0 }),
    )
    .await;

    let _listener =
        listen_changes_in_date(Arc::clone(&store), Arc::new(sink), identity(), TIMEOUT)
            .await
            .unwrap();
    // Attach-time event sees an incomplete record.
    assert_nothing_saved(&mut saved).await;

    let at = date("2026-10-19T08:00:00Z");
    update_temperature(&store, &identity(), 21.3, at)
        .wait()
        .await
        .unwrap();

    let (sensor_id, record) = next_saved(&mut saved).await;
    assert_eq!(sensor_id, 3.0);
    assert_eq!(record.date, format_date(at));
    assert_eq!(record.aq, 42.5);
    assert_eq!(record.h2s, 0.3);
    assert_eq!(record.humidity, 61.0);
    assert_eq!(record.temperature, 21.3);
    assert_nothing_saved(&mut saved).await;

    update_temperature(&store, &identity(), 22.0, date("2026-10-19T08:01:00Z"))
        .wait()
        .await
        .unwrap();
    let (_, record) = next_saved(&mut saved).await;
    assert_eq!(record.temperature, 22.0);
    assert_nothing_saved(&mut saved).await;
}

#[tokio::test]
async fn listener_fires_on_attach_for_complete_record() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    seed(
        &*store,
        &identity(),
        json!({
            "date": "2026-10-19T07:59:00.000Z",
            "aq": 1.0, "h2s": 2.0, "humidity": 3.0, "temperature": 4.0,
        }),
    )
    .await;

    let _listener =
        listen_changes_in_date(Arc::clone(&store), Arc::new(sink), identity(), TIMEOUT)
            .await
            .unwrap();

    let (sensor_id, record) = next_saved(&mut saved).await;
    assert_eq!(sensor_id, 3.0);
    assert_eq!(record.temperature, 4.0);
}

#[tokio::test]
async fn listener_skips_record_missing_a_field() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    seed(&*store, &identity(), json!({ "aq": 42.5, "h2s": 0.3 })).await;

    let _listener =
        listen_changes_in_date(Arc::clone(&store), Arc::new(sink), identity(), TIMEOUT)
            .await
            .unwrap();

    update_temperature(&store, &identity(), 21.3, Utc::now())
        .wait()
        .await
        .unwrap();

    assert_nothing_saved(&mut saved).await;
}

#[tokio::test]
async fn listener_skips_non_numeric_sensor_id() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    let id = SensorIdentity::new("dev1", "mod2", "sensorA");
    seed(
        &*store,
        &id,
        json!({ "aq": 1.0, "h2s": 2.0, "humidity": 3.0 }),
    )
    .await;

    let _listener = listen_changes_in_date(Arc::clone(&store), Arc::new(sink), id.clone(), TIMEOUT)
        .await
        .unwrap();
    update_temperature(&store, &id, 21.3, Utc::now())
        .wait()
        .await
        .unwrap();

    assert_nothing_saved(&mut saved).await;
}

#[tokio::test]
async fn cancelled_listener_stops_saving() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    seed(
        &*store,
        &identity(),
        json!({ "aq": 1.0, "h2s": 2.0, "humidity": 3.0 }),
    )
    .await;

    let listener =
        listen_changes_in_date(Arc::clone(&store), Arc::new(sink), identity(), TIMEOUT)
            .await
            .unwrap();
    listener.cancel();
    tokio::task::yield_now().await;

    update_temperature(&store, &identity(), 21.3, Utc::now())
        .wait()
        .await
        .unwrap();

    assert_nothing_saved(&mut saved).await;
}

#[tokio::test]
async fn slow_sink_times_out() {
    let store = MemoryStore::new();
    let (sink, _saved) = RecordingSink::slow(Duration::from_millis(500));
    seed(
        &store,
        &identity(),
        json!({
            "date": "2026-10-19T08:00:00.000Z",
            "aq": 1.0, "h2s": 2.0, "humidity": 3.0, "temperature": 4.0,
        }),
    )
    .await;

    let result = persist_current(&store, &sink, &identity(), Duration::from_millis(20)).await;

    assert!(matches!(
        result,
        Err(PersistError::Sink(SinkError::Timeout(_)))
    ));
}

#[tokio::test]
async fn aq_message_updates_store_and_pushes_ph() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let hub = PushHub::new();
    let mut pushed = hub.listen();
    let router = TopicRouter::new("telemetry", Arc::clone(&store), Arc::new(hub.connect()));

    let write = router
        .handle_message("telemetry/aq", b"dev1/mod2/3/42.5")
        .await
        .unwrap();

    assert_eq!(
        pushed.recv().await.unwrap(),
        PushEvent {
            name: "3/pH".to_string(),
            value: 42.5,
        }
    );

    write.wait().await.unwrap();
    assert_eq!(
        store.get("/ids/dev1/mod2/3/aq").await.unwrap(),
        Some(json!(42.5))
    );
}

#[tokio::test]
async fn temperature_message_reaches_the_sink() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let (sink, mut saved) = RecordingSink::new();
    let hub = PushHub::new();
    let mut pushed = hub.listen();
    let listeners = Arc::new(PersistenceListeners::new(
        Arc::clone(&store),
        Arc::new(sink),
        TIMEOUT,
    ));
    let router = TopicRouter::new("telemetry", Arc::clone(&store), Arc::new(hub.connect()))
        .with_listeners(Arc::clone(&listeners));

    seed(
        &*store,
        &identity(),
        json!({
            "date": "2026-10-19T07:00:00.000Z",
            "aq": 42.5, "h2s": 0.3, "humidity": 61.0,
        }),
    )
    .await;

    router
        .handle_message("telemetry/temperature", b"dev1/mod2/3/21.3")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let (sensor_id, record) = next_saved(&mut saved).await;
    assert_eq!(sensor_id, 3.0);
    assert_eq!(record.temperature, 21.3);
    assert_eq!(record.aq, 42.5);
    assert_ne!(record.date, "2026-10-19T07:00:00.000Z");
    assert_nothing_saved(&mut saved).await;

    assert_eq!(pushed.recv().await.unwrap().name, "3/temperature");

    router
        .handle_message("telemetry/humidity", b"dev1/mod2/3/60")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(listeners.len().await, 1);
    // Humidity does not advance the date, so nothing is persisted.
    assert_nothing_saved(&mut saved).await;
}

#[tokio::test]
async fn malformed_message_changes_nothing() {
    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let hub = PushHub::new();
    let mut pushed = hub.listen();
    let router = TopicRouter::new("telemetry", Arc::clone(&store), Arc::new(hub.connect()));

    assert!(
        router
            .handle_message("telemetry/aq", b"dev1/mod2/3/not-a-number")
            .await
            .is_none()
    );

    assert_eq!(store.get("/ids").await.unwrap(), None);
    assert!(pushed.try_recv().is_err());
}
