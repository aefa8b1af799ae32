use crate::db::models::NewReading;
use crate::telemetry::alert;
use crate::telemetry::model::TelemetrySample;
use crate::telemetry::notify::NotificationDispatcher;
use crate::telemetry::store::{StoreError, TelemetryStore};
use chrono::Utc;
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub id: i32,
    pub alert_scheduled: bool,
}

/// Store-then-notify for every incoming sample.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: TelemetryStore,
    dispatcher: NotificationDispatcher,
}

impl IngestionPipeline {
    pub fn new(store: TelemetryStore, dispatcher: NotificationDispatcher) -> Self {
        IngestionPipeline { store, dispatcher }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub async fn ingest(&self, sample: TelemetrySample) -> Result<IngestReceipt, IngestError> {
        sample.validate().map_err(IngestError::Invalid)?;

        // The device clock is never trusted.
        let now = Utc::now();
        let legacy = sample.legacy();
        let new_reading = NewReading {
            device_id: sample.device_id,
            timestamp: now.timestamp(),
            temperature: sample.temperature,
            smoke_value: sample.smoke_value,
            fire_value: sample.fire_value,
            temp_alert: sample.temp_alert,
            smoke_alert: sample.smoke_alert,
            fire_alert: sample.fire_alert,
            smoke_connected: legacy.smoke_connected,
            mq2_preheated: legacy.mq2_preheated,
            fire_detected: legacy.fire_detected,
            alert_active: legacy.alert_active,
            created_at: now.naive_utc(),
        };

        let reading = self.store.append(&new_reading).await?;
        info!(
            "Stored reading {} from {} (temp {:.1}, smoke {}, fire {})",
            reading.id, reading.device_id, reading.temperature, reading.smoke_value, reading.fire_value
        );

        let alert_scheduled = match alert::evaluate(&reading) {
            Some(alert) => self.dispatcher.dispatch(&reading.device_id, alert.message),
            None => false,
        };

        Ok(IngestReceipt {
            id: reading.id,
            alert_scheduled,
        })
    }
}
