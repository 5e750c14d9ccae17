use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{error::SinkError, store::BoxFuture, telemetry::SensorRecord};

pub trait PersistenceSink: Send + Sync {
    fn save<'a>(
        &'a self,
        sensor_id: f64,
        record: &'a SensorRecord,
    ) -> BoxFuture<'a, Result<(), SinkError>>;
}

pub async fn new_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .connect(database_url)
        .await
        .context("failed to connect to database")
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")
}

pub async fn insert_sensor_record(
    pool: &PgPool,
    sensor_id: f64,
    record: &SensorRecord,
) -> Result<(), SinkError> {
    let measured_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&record.date)
        .map_err(|source| SinkError::InvalidDate {
            date: record.date.clone(),
            source,
        })?
        .with_timezone(&Utc);

    sqlx::query(
        r#"
        INSERT INTO sensor_records (sensor_id, measured_at, aq, h2s, humidity, temperature)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (sensor_id, measured_at) DO NOTHING
        "#,
    )
    .bind(sensor_id)
    .bind(measured_at)
    .bind(record.aq)
    .bind(record.h2s)
    .bind(record.humidity)
    .bind(record.temperature)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PersistenceSink for PgSink {
    fn save<'a>(
        &'a self,
        sensor_id: f64,
        record: &'a SensorRecord,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(insert_sensor_record(&self.pool, sensor_id, record))
    }
}
