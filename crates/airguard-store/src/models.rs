//! Data models for stored data.
//!
//! All models serialize with camelCase field names, which is the shape the
//! HTTP API returns and the device firmware and dashboards expect.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airguard_types::{AirQuality, OperationDuration, SummaryKind};

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDevice {
    /// Device identifier (UUID v4).
    pub id: String,
    /// Unique device name.
    pub name: String,
    /// Owning account.
    pub owner: String,
    /// Last commanded relay state.
    pub relay_state: bool,
    /// How long the relay holds the commanded state.
    pub operation_duration: OperationDuration,
    /// Free-text location.
    pub location: Option<String>,
    /// Whether this is the owner's active device.
    pub is_connected: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields for registering a new device.
///
/// A newly registered device is always the owner's connected device.
#[derive(Debug, Clone, Default)]
pub struct NewDevice {
    pub name: String,
    pub owner: String,
    pub relay_state: bool,
    pub operation_duration: OperationDuration,
    pub location: Option<String>,
}

/// A partial update to a device. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relay_state: Option<bool>,
    #[serde(default)]
    pub operation_duration: Option<OperationDuration>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_connected: Option<bool>,
}

impl DevicePatch {
    /// Apply this patch to a device in place.
    pub fn apply(&self, device: &mut StoredDevice) {
        if let Some(ref name) = self.name {
            device.name = name.clone();
        }
        if let Some(relay_state) = self.relay_state {
            device.relay_state = relay_state;
        }
        if let Some(duration) = self.operation_duration {
            device.operation_duration = duration;
        }
        if let Some(ref location) = self.location {
            device.location = Some(location.clone());
        }
        if let Some(is_connected) = self.is_connected {
            device.is_connected = is_connected;
        }
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &DevicePatch::default()
    }
}

/// Result of deleting a device.
#[derive(Debug, Clone)]
pub struct DeletedDevice {
    /// The device as it was before deletion.
    pub device: StoredDevice,
    /// Another device of the same owner that became connected, if any.
    pub promoted: Option<StoredDevice>,
}

/// A raw sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    /// Database row ID.
    pub id: i64,
    /// Device the reading belongs to.
    pub device_id: String,
    /// Temperature in Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Volatile organic compound index.
    pub tvoc: f64,
    /// Classification reported with the reading.
    #[serde(rename = "airQualityStatus")]
    pub air_quality: AirQuality,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields for inserting a reading.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub temperature: f64,
    pub humidity: f64,
    pub tvoc: f64,
    pub air_quality: AirQuality,
    /// Timestamp override; defaults to now.
    pub recorded_at: Option<OffsetDateTime>,
}

impl NewReading {
    /// A reading recorded now.
    pub fn new(temperature: f64, humidity: f64, tvoc: f64, air_quality: AirQuality) -> Self {
        Self {
            temperature,
            humidity,
            tvoc,
            air_quality,
            recorded_at: None,
        }
    }

    /// Set an explicit timestamp.
    pub fn at(mut self, recorded_at: OffsetDateTime) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }
}

/// An hourly or daily summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    pub id: i64,
    pub device_id: String,
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    #[serde(rename = "avgTVOC")]
    pub avg_tvoc: f64,
    #[serde(rename = "airQualityStatus")]
    pub air_quality: AirQuality,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields for inserting a summary.
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub kind: SummaryKind,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    pub avg_tvoc: f64,
    pub air_quality: AirQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> StoredDevice {
        let now = OffsetDateTime::UNIX_EPOCH;
        StoredDevice {
            id: "7d0f4a5e-1b8c-4a53-9a51-3c2f1e2d0a11".to_string(),
            name: "greenhouse".to_string(),
            owner: "alice".to_string(),
            relay_state: false,
            operation_duration: OperationDuration::TenMinutes,
            location: None,
            is_connected: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patch_apply_only_touches_present_fields() {
        let mut device = sample_device();
        let patch = DevicePatch {
            relay_state: Some(true),
            location: Some("shed".to_string()),
            ..Default::default()
        };

        patch.apply(&mut device);

        assert!(device.relay_state);
        assert_eq!(device.location.as_deref(), Some("shed"));
        assert_eq!(device.name, "greenhouse");
        assert_eq!(device.operation_duration, OperationDuration::TenMinutes);
        assert!(device.is_connected);
    }

    #[test]
    fn test_patch_deserializes_camel_case() {
        let patch: DevicePatch =
            serde_json::from_str(r#"{"relayState":true,"operationDuration":"30min"}"#).unwrap();
        assert_eq!(patch.relay_state, Some(true));
        assert_eq!(patch.operation_duration, Some(OperationDuration::ThirtyMinutes));
        assert!(patch.name.is_none());
        assert!(!patch.is_empty());
        assert!(DevicePatch::default().is_empty());
    }

    #[test]
    fn test_device_serializes_camel_case() {
        let json = serde_json::to_value(sample_device()).unwrap();
        assert_eq!(json["relayState"], false);
        assert_eq!(json["operationDuration"], "10min");
        assert_eq!(json["isConnected"], true);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_summary_serializes_type_and_status() {
        let summary = StoredSummary {
            id: 1,
            device_id: "d".to_string(),
            kind: SummaryKind::Daily,
            avg_temperature: 21.0,
            avg_humidity: 40.0,
            avg_tvoc: 3.0,
            air_quality: AirQuality::Good,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["type"], "daily");
        assert_eq!(json["airQualityStatus"], "Good");
        assert_eq!(json["avgTemperature"], 21.0);
        assert_eq!(json["avgTVOC"], 3.0);
    }
}
