use chrono::NaiveDateTime;
use diesel::prelude::*;

// -----------------------------
// Models
// -----------------------------

/// Fields of the older device protocol, kept nullable so both variants fit
/// in one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyAlertState {
    pub smoke_connected: Option<bool>,
    pub mq2_preheated: Option<bool>,
    pub fire_detected: Option<bool>,
    pub alert_active: Option<bool>,
}

// readings
#[derive(Debug, Clone, PartialEq, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::db::schema::readings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Reading {
    pub id: i32,
    pub device_id: String,
    /// Server time at ingestion, seconds since epoch.
    pub timestamp: i64,
    pub temperature: f64,
    pub smoke_value: i32,
    pub fire_value: i32,
    pub temp_alert: bool,
    pub smoke_alert: bool,
    pub fire_alert: bool,
    pub smoke_connected: Option<bool>,
    pub mq2_preheated: Option<bool>,
    pub fire_detected: Option<bool>,
    pub alert_active: Option<bool>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::db::schema::readings)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: i64,
    pub temperature: f64,
    pub smoke_value: i32,
    pub fire_value: i32,
    pub temp_alert: bool,
    pub smoke_alert: bool,
    pub fire_alert: bool,
    pub smoke_connected: Option<bool>,
    pub mq2_preheated: Option<bool>,
    pub fire_detected: Option<bool>,
    pub alert_active: Option<bool>,
    pub created_at: NaiveDateTime,
}
