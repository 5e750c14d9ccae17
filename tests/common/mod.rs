#![allow(dead_code)]

use std::{sync::Mutex, time::Duration};

use env_telemetry::{
    db::PersistenceSink,
    error::{SinkError, StoreError},
    store::{BoxFuture, MemoryStore, RealtimeStore, Subscription},
    telemetry::SensorRecord,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Memory store that records successful writes and fails writes to paths
/// ending in `fail_suffix`.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_suffix: Option<&'static str>,
    writes: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_suffix: None,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(suffix: &'static str) -> Self {
        Self {
            fail_suffix: Some(suffix),
            ..Self::new()
        }
    }

    pub fn writes_to(&self, suffix: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.ends_with(suffix))
            .count()
    }
}

impl RealtimeStore for FlakyStore {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        self.inner.get(path)
    }

    fn set<'a>(&'a self, path: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(suffix) = self.fail_suffix
                && path.ends_with(suffix)
            {
                return Err(StoreError::Write {
                    path: path.to_string(),
                    reason: "permission denied".to_string(),
                });
            }

            self.inner.set(path, value).await?;
            self.writes.lock().unwrap().push(path.to_string());
            Ok(())
        })
    }

    fn observe<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Subscription, StoreError>> {
        self.inner.observe(path)
    }
}

/// Sink that forwards every saved record to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<(f64, SensorRecord)>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(f64, SensorRecord)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, delay: None }, rx)
    }

    pub fn slow(delay: Duration) -> (Self, mpsc::UnboundedReceiver<(f64, SensorRecord)>) {
        let (sink, rx) = Self::new();
        (
            Self {
                delay: Some(delay),
                ..sink
            },
            rx,
        )
    }
}

impl PersistenceSink for RecordingSink {
    fn save<'a>(
        &'a self,
        sensor_id: f64,
        record: &'a SensorRecord,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.tx
                .send((sensor_id, record.clone()))
                .map_err(|e| SinkError::Rejected(e.to_string()))
        })
    }
}

/// Waits for the next saved record.
pub async fn next_saved(
    rx: &mut mpsc::UnboundedReceiver<(f64, SensorRecord)>,
) -> (f64, SensorRecord) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for the sink")
        .expect("sink channel closed")
}

/// Asserts nothing else reaches the sink within a short grace period.
pub async fn assert_nothing_saved(rx: &mut mpsc::UnboundedReceiver<(f64, SensorRecord)>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "unexpected record reached the sink");
}
