use tokio::sync::broadcast;
use tracing::trace;

use crate::telemetry::Metric;

const DEFAULT_CAPACITY: usize = 256;

/// Live update channel. Emitting never blocks and never reports delivery.
pub trait PushChannel: Send + Sync {
    fn emit(&self, event: &str, value: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub value: f64,
}

/// `"<sensorId>/<suffix>"`, e.g. `"3/pH"` for an air-quality reading.
pub fn event_name(sensor_id: &str, metric: Metric) -> String {
    format!("{sensor_id}/{}", metric.event_suffix())
}

#[derive(Debug, Clone)]
pub struct PushHub {
    tx: broadcast::Sender<PushEvent>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn connect(&self) -> PushHandle {
        PushHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn listen(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: broadcast::Sender<PushEvent>,
}

impl PushChannel for PushHandle {
    fn emit(&self, event: &str, value: f64) {
        let event = PushEvent {
            name: event.to_string(),
            value,
        };

        // No listeners is fine: events are not retained.
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!(event = %event.name, "push event dropped, no listeners");
        }
    }
}
