use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_stream::StreamExt as _;
use tracing::{debug, error, info, warn};

use crate::{
    db::PersistenceSink,
    error::{PersistError, SinkError, StoreError},
    store::RealtimeStore,
    telemetry::{Field, SensorIdentity, SensorRecord, coerce_sensor_id},
};

pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Attaches to the `date` leaf of `identity`. Returns once the observer is
/// registered, so no later write can be missed.
pub async fn listen_changes_in_date(
    store: Arc<dyn RealtimeStore>,
    sink: Arc<dyn PersistenceSink>,
    identity: SensorIdentity,
    sink_timeout: Duration,
) -> Result<ListenerHandle, StoreError> {
    let mut changes = store.observe(&identity.field_path(Field::Date)).await?;
    debug!(sensor = %identity, "listening for date changes");

    let task = tokio::spawn(async move {
        while changes.next().await.is_some() {
            match persist_current(&*store, &*sink, &identity, sink_timeout).await {
                Ok(sensor_id) => debug!(sensor = %identity, sensor_id, "sensor record saved"),
                Err(PersistError::Schema(e)) => {
                    warn!(sensor = %identity, error = %e, "skipping incomplete sensor record")
                }
                Err(e) => error!(sensor = %identity, error = %e, "failed to persist sensor record"),
            }
        }

        debug!(sensor = %identity, "date subscription closed");
    });

    Ok(ListenerHandle { task })
}

/// Reads, validates and saves the current record of `identity`, returning the
/// numeric sensor id it was saved under.
pub async fn persist_current(
    store: &dyn RealtimeStore,
    sink: &dyn PersistenceSink,
    identity: &SensorIdentity,
    sink_timeout: Duration,
) -> Result<f64, PersistError> {
    let value = store.get(&identity.path()).await?;
    let record = SensorRecord::from_value(value.as_ref())?;
    let sensor_id = coerce_sensor_id(&identity.sensor_id)?;

    tokio::time::timeout(sink_timeout, sink.save(sensor_id, &record))
        .await
        .map_err(|_| SinkError::Timeout(sink_timeout))??;

    Ok(sensor_id)
}

pub struct PersistenceListeners {
    store: Arc<dyn RealtimeStore>,
    sink: Arc<dyn PersistenceSink>,
    sink_timeout: Duration,
    listeners: Mutex<HashMap<SensorIdentity, ListenerHandle>>,
}

impl PersistenceListeners {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        sink: Arc<dyn PersistenceSink>,
        sink_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            sink_timeout,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a listener for `identity` unless a live one exists.
    pub async fn ensure(&self, identity: &SensorIdentity) -> Result<(), StoreError> {
        let mut listeners = self.listeners.lock().await;

        if let Some(handle) = listeners.get(identity)
            && !handle.is_finished()
        {
            return Ok(());
        }

        let handle = listen_changes_in_date(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            identity.clone(),
            self.sink_timeout,
        )
        .await?;
        listeners.insert(identity.clone(), handle);
        info!(sensor = %identity, total = listeners.len(), "persistence listener attached");

        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.listeners.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.lock().await.is_empty()
    }
}
