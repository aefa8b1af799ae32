//! Turns a stored reading into an alert decision and a chat message.
//!
//! Threshold decisions are made on the device; this module only looks at the
//! flags it reported.

use crate::db::models::Reading;
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Alerts are rendered in the installation's local time, a fixed UTC+7.
pub const LOCAL_UTC_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggeredModule {
    Temperature,
    Smoke,
    Fire,
}

impl fmt::Display for TriggeredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TriggeredModule::Temperature => "TEMPERATURE",
            TriggeredModule::Smoke => "SMOKE",
            TriggeredModule::Fire => "FIRE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub modules: Vec<TriggeredModule>,
    pub message: String,
}

pub fn triggered_modules(reading: &Reading) -> Vec<TriggeredModule> {
    let mut modules = Vec::with_capacity(3);
    if reading.temp_alert {
        modules.push(TriggeredModule::Temperature);
    }
    if reading.smoke_alert {
        modules.push(TriggeredModule::Smoke);
    }
    if reading.fire_alert {
        modules.push(TriggeredModule::Fire);
    }
    modules
}

/// `None` when nothing was flagged. The legacy `alert_active` flag still
/// raises an alert, with no module attributed.
pub fn evaluate(reading: &Reading) -> Option<Alert> {
    let modules = triggered_modules(reading);
    if modules.is_empty() && reading.alert_active != Some(true) {
        return None;
    }
    Some(Alert {
        message: format_alert_message(reading, reading.timestamp),
        modules,
    })
}

pub fn format_local_time(timestamp: i64) -> String {
    let Some(offset) = FixedOffset::east_opt(LOCAL_UTC_OFFSET_SECS) else {
        return format!("invalid ({timestamp})");
    };
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("invalid ({timestamp})"),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Message body sent to the chat endpoint (HTML parse mode).
pub fn format_alert_message(reading: &Reading, server_timestamp: i64) -> String {
    let modules = triggered_modules(reading);
    let modules = if modules.is_empty() {
        "NONE".to_string()
    } else {
        modules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    [
        "<b>ALERT</b> from device".to_string(),
        format!("Device: <code>{}</code>", escape_html(&reading.device_id)),
        format!("Time (UTC+7): {}", format_local_time(server_timestamp)),
        format!("Temperature: <b>{:.1} C</b>", reading.temperature),
        format!("Smoke (MQ-135): <b>{}</b>", reading.smoke_value),
        format!("Fire (KY-026, 10-bit): <b>{}</b>", reading.fire_value),
        format!("Modules: {modules}"),
    ]
    .join("\n")
}
