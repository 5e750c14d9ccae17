use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::{
    error::PayloadError,
    listener::PersistenceListeners,
    push::{PushChannel, event_name},
    store::RealtimeStore,
    telemetry::{Metric, SensorIdentity},
    writer::{PendingWrite, update_aq, update_h2s, update_humidity, update_temperature},
};

pub const DEFAULT_MAIN_TOPIC: &str = "telemetry";

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub identity: SensorIdentity,
    pub value: f64,
}

/// Parses `deviceId/moduleId/sensorId/value`.
pub fn parse_payload(payload: &str) -> Result<Reading, PayloadError> {
    let fields: Vec<&str> = payload.trim().split('/').collect();
    let &[device_id, module_id, sensor_id, value] = fields.as_slice() else {
        return Err(PayloadError::WrongArity(fields.len()));
    };

    for (name, fragment) in [
        ("device id", device_id),
        ("module id", module_id),
        ("sensor id", sensor_id),
    ] {
        if fragment.is_empty() {
            return Err(PayloadError::EmptyFragment(name));
        }
    }

    let value = value.trim();
    let parsed: f64 = value.parse().map_err(|source| PayloadError::InvalidValue {
        value: value.to_string(),
        source,
    })?;
    if !parsed.is_finite() {
        return Err(PayloadError::NonFinite(value.to_string()));
    }

    Ok(Reading {
        identity: SensorIdentity::new(device_id, module_id, sensor_id),
        value: parsed,
    })
}

pub struct TopicRouter {
    main_topic: String,
    store: Arc<dyn RealtimeStore>,
    push: Arc<dyn PushChannel>,
    listeners: Option<Arc<PersistenceListeners>>,
}

impl TopicRouter {
    pub fn new(
        main_topic: impl Into<String>,
        store: Arc<dyn RealtimeStore>,
        push: Arc<dyn PushChannel>,
    ) -> Self {
        Self {
            main_topic: main_topic.into(),
            store,
            push,
            listeners: None,
        }
    }

    pub fn with_listeners(mut self, listeners: Arc<PersistenceListeners>) -> Self {
        self.listeners = Some(listeners);
        self
    }

    pub fn topic(&self, metric: Metric) -> String {
        format!("{}/{}", self.main_topic, metric.topic_suffix())
    }

    pub fn topics(&self) -> Vec<String> {
        Metric::ALL.iter().map(|m| self.topic(*m)).collect()
    }

    pub fn route(&self, topic: &str) -> Option<Metric> {
        topic
            .strip_prefix(self.main_topic.as_str())?
            .strip_prefix('/')?
            .parse()
            .ok()
    }

    /// Handles one inbound message. Returns the spawned store write, or
    /// `None` when the topic is not routed or the payload is malformed.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Option<PendingWrite> {
        let metric = self.route(topic)?;

        let reading = match std::str::from_utf8(payload)
            .map_err(|_| PayloadError::NotUtf8)
            .and_then(parse_payload)
        {
            Ok(r) => r,
            Err(e) => {
                warn!(topic, payload = %String::from_utf8_lossy(payload), error = %e, "dropping malformed message");
                return None;
            }
        };
        let Reading { identity, value } = reading;
        debug!(topic, sensor = %identity, value, "message received");

        if let Some(listeners) = &self.listeners
            && let Err(e) = listeners.ensure(&identity).await
        {
            error!(sensor = %identity, error = %e, "failed to attach persistence listener");
        }

        let write = match metric {
            Metric::Aq => update_aq(&self.store, &identity, value),
            Metric::H2s => update_h2s(&self.store, &identity, value),
            Metric::Humidity => update_humidity(&self.store, &identity, value),
            Metric::Temperature => update_temperature(&self.store, &identity, value, Utc::now()),
        };

        self.push.emit(&event_name(&identity.sensor_id, metric), value);

        Some(write)
    }
}
