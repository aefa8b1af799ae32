use crate::db::models::{LegacyAlertState, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_DEVICE_ID_LEN: usize = 64;

/// One sample as pushed by a device.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySample {
    pub device_id: String,
    pub temperature: f64,
    pub smoke_value: i32,
    pub fire_value: i32,
    #[serde(default)]
    pub temp_alert: bool,
    #[serde(default)]
    pub smoke_alert: bool,
    #[serde(default)]
    pub fire_alert: bool,
    /// Device clock; accepted for compatibility and never stored.
    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(default)]
    pub smoke_connected: Option<bool>,
    #[serde(default)]
    pub mq2_preheated: Option<bool>,
    #[serde(default)]
    pub fire_detected: Option<bool>,
    #[serde(default)]
    pub alert_active: Option<bool>,
}

impl TelemetrySample {
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id.trim().is_empty() {
            return Err("device_id cannot be empty".to_string());
        }
        if self.device_id.chars().count() > MAX_DEVICE_ID_LEN {
            return Err(format!("device_id too long (max {MAX_DEVICE_ID_LEN})"));
        }
        if !self.temperature.is_finite() {
            return Err("temperature must be a finite number".to_string());
        }
        Ok(())
    }

    pub fn legacy(&self) -> LegacyAlertState {
        LegacyAlertState {
            smoke_connected: self.smoke_connected,
            mq2_preheated: self.mq2_preheated,
            fire_detected: self.fire_detected,
            alert_active: self.alert_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub id: i32,
    pub status: String,
}

impl IngestResponse {
    pub fn ok(id: i32) -> Self {
        IngestResponse {
            id,
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingOut {
    pub id: i32,
    pub device_id: String,
    pub timestamp: i64,
    pub temperature: f64,
    pub smoke_value: i32,
    pub fire_value: i32,
    pub temp_alert: bool,
    pub smoke_alert: bool,
    pub fire_alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mq2_preheated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_active: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl From<Reading> for ReadingOut {
    fn from(r: Reading) -> Self {
        ReadingOut {
            id: r.id,
            device_id: r.device_id,
            timestamp: r.timestamp,
            temperature: r.temperature,
            smoke_value: r.smoke_value,
            fire_value: r.fire_value,
            temp_alert: r.temp_alert,
            smoke_alert: r.smoke_alert,
            fire_alert: r.fire_alert,
            smoke_connected: r.smoke_connected,
            mq2_preheated: r.mq2_preheated,
            fire_detected: r.fire_detected,
            alert_active: r.alert_active,
            created_at: r.created_at.and_utc(),
        }
    }
}
