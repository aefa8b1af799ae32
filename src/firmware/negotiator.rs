use crate::firmware::registry::FirmwareRecord;
use crate::firmware::version::{ReportedVersion, is_newer};
use serde::{Deserialize, Serialize};

pub const UP_TO_DATE: &str = "Firmware is up to date";
pub const NO_FIRMWARE: &str = "No firmware info found";

/// Answer to a device's update check. Unused fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareCheckResponse {
    pub update_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_build: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FirmwareCheckResponse {
    /// Not-available answer for when the registry itself could not be read.
    pub fn failed(error: impl ToString) -> Self {
        FirmwareCheckResponse {
            update_available: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Decides whether the device reporting `current_version` should update.
pub fn negotiate(latest: Option<&FirmwareRecord>, current_version: &str) -> FirmwareCheckResponse {
    let Some(latest) = latest else {
        return FirmwareCheckResponse {
            update_available: false,
            message: Some(NO_FIRMWARE.to_string()),
            ..Default::default()
        };
    };

    let reported = ReportedVersion::parse(current_version);
    if is_newer(&latest.version, latest.build, &reported) {
        FirmwareCheckResponse {
            update_available: true,
            latest_version: Some(latest.version.clone()),
            latest_build: Some(latest.build),
            current_version: Some(current_version.to_string()),
            download_url: Some(latest.download_url.clone()),
            file_size: Some(latest.file_size),
            release_notes: Some(latest.release_notes.clone()),
            checksum: Some(latest.checksum.clone()),
            ..Default::default()
        }
    } else {
        FirmwareCheckResponse {
            update_available: false,
            message: Some(UP_TO_DATE.to_string()),
            current_version: Some(current_version.to_string()),
            latest_version: Some(latest.version.clone()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(version: &str, build: i64) -> FirmwareRecord {
        FirmwareRecord {
            version: version.to_string(),
            build,
            download_url: format!("/api/firmware/download/{version}"),
            file_size: 1024,
            release_notes: "fixes".to_string(),
            checksum: "deadbeef".to_string(),
            uploaded_at: Utc::now(),
            filename: format!("battery_monitor_v{version}.bin"),
        }
    }

    #[test]
    fn no_record_is_not_available() {
        let response = negotiate(None, "1.0.0");
        assert!(!response.update_available);
        assert_eq!(response.message.as_deref(), Some(NO_FIRMWARE));
        assert_eq!(response.error, None);
    }

    #[test]
    fn newer_registry_offers_full_metadata() {
        let latest = record("1.2.0", 3);
        let response = negotiate(Some(&latest), "1.1.0-build9");
        assert!(response.update_available);
        assert_eq!(response.latest_version.as_deref(), Some("1.2.0"));
        assert_eq!(response.latest_build, Some(3));
        assert_eq!(response.current_version.as_deref(), Some("1.1.0-build9"));
        assert_eq!(response.download_url.as_deref(), Some("/api/firmware/download/1.2.0"));
        assert_eq!(response.file_size, Some(1024));
        assert_eq!(response.release_notes.as_deref(), Some("fixes"));
        assert_eq!(response.checksum.as_deref(), Some("deadbeef"));
        assert_eq!(response.message, None);
    }

    #[test]
    fn same_version_and_build_is_up_to_date() {
        let latest = record("1.0.0", 5);
        let response = negotiate(Some(&latest), "1.0.0-build5");
        assert!(!response.update_available);
        assert_eq!(response.message.as_deref(), Some(UP_TO_DATE));
        assert_eq!(response.latest_version.as_deref(), Some("1.0.0"));
        assert_eq!(response.current_version.as_deref(), Some("1.0.0-build5"));
        assert_eq!(response.download_url, None);

        let latest = record("1.0.0", 6);
        assert!(negotiate(Some(&latest), "1.0.0-build5").update_available);
    }

    #[test]
    fn malformed_report_never_errors() {
        let latest = record("1.0.0", 1);
        let response = negotiate(Some(&latest), "abc");
        assert!(response.update_available);
        assert_eq!(response.error, None);

        let zero = record("0.0.0", 0);
        let response = negotiate(Some(&zero), "garbage-buildZ");
        assert!(!response.update_available);
    }

    #[test]
    fn wire_format_omits_unset_fields() {
        let json = serde_json::to_value(negotiate(None, "1.0.0")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "update_available": false,
                "message": "No firmware info found"
            })
        );

        let json = serde_json::to_value(FirmwareCheckResponse::failed("disk on fire")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "update_available": false, "error": "disk on fire" })
        );
    }
}
