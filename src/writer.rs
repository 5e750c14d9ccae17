use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{
    error::StoreError,
    store::RealtimeStore,
    telemetry::{Field, SensorIdentity},
};

#[derive(Debug)]
#[must_use = "drop the handle explicitly to detach the write"]
pub struct PendingWrite {
    task: JoinHandle<Result<(), StoreError>>,
}

impl PendingWrite {
    pub async fn wait(self) -> Result<(), StoreError> {
        self.task
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

pub fn update_aq(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    value: f64,
) -> PendingWrite {
    spawn_set(store, identity, Field::Aq, Value::from(value))
}

pub fn update_h2s(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    value: f64,
) -> PendingWrite {
    spawn_set(store, identity, Field::H2s, Value::from(value))
}

pub fn update_humidity(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    value: f64,
) -> PendingWrite {
    spawn_set(store, identity, Field::Humidity, Value::from(value))
}

pub fn update_date(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    date: DateTime<Utc>,
) -> PendingWrite {
    spawn_set(store, identity, Field::Date, Value::from(format_date(date)))
}

/// Writes `temperature`, then runs [`update_date`] once that write is
/// confirmed. A failed temperature write leaves `date` untouched.
pub fn update_temperature(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    value: f64,
    date: DateTime<Utc>,
) -> PendingWrite {
    let store = Arc::clone(store);
    let identity = identity.clone();

    let task = tokio::spawn(async move {
        if let Err(e) = set_field(&*store, &identity, Field::Temperature, Value::from(value)).await
        {
            error!(sensor = %identity, error = %e, "failed to update temperature");
            return Err(e);
        }

        update_date(&store, &identity, date).wait().await
    });

    PendingWrite { task }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn spawn_set(
    store: &Arc<dyn RealtimeStore>,
    identity: &SensorIdentity,
    field: Field,
    value: Value,
) -> PendingWrite {
    let store = Arc::clone(store);
    let identity = identity.clone();

    let task = tokio::spawn(async move {
        set_field(&*store, &identity, field, value)
            .await
            .inspect_err(|e| error!(sensor = %identity, %field, error = %e, "failed to update field"))
    });

    PendingWrite { task }
}

async fn set_field(
    store: &dyn RealtimeStore,
    identity: &SensorIdentity,
    field: Field,
    value: Value,
) -> Result<(), StoreError> {
    let path = identity.field_path(field);
    store.set(&path, value).await?;
    debug!(%path, "field updated");

    Ok(())
}
