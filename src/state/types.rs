use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Alarm state reported by `/api/dashboard`.
/// Anything outside the known set is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlarmState {
    #[default]
    Normal,
    Warning,
    Alarm,
    Other(String),
}

impl AlarmState {
    pub fn as_str(&self) -> &str {
        match self {
            AlarmState::Normal => "Normal",
            AlarmState::Warning => "Warning",
            AlarmState::Alarm => "Alarm",
            AlarmState::Other(raw) => raw,
        }
    }
}

impl From<String> for AlarmState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Normal" => AlarmState::Normal,
            "Warning" => AlarmState::Warning,
            "Alarm" => AlarmState::Alarm,
            _ => AlarmState::Other(raw),
        }
    }
}

impl From<AlarmState> for String {
    fn from(state: AlarmState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One read of `/api/dashboard`. Replaced wholesale on every successful poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub latest_image: Option<String>,
    #[serde(default)]
    pub previous_image: Option<String>,
    #[serde(default)]
    pub mask_overlay: Option<String>,
    #[serde(default)]
    pub detection_rate: f64,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub alarm_state: AlarmState,
    #[serde(default)]
    pub delay_warning: bool,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub latest_timestamp: Option<String>,
    #[serde(default)]
    pub previous_timestamp: Option<String>,
}

/// An archived image, newest first in the history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub path: String,
    #[serde(default)]
    pub mtime: Option<String>,
    #[serde(default)]
    pub is_overlay: bool,
}

impl HistoryEntry {
    /// Modification time, if the server sent one we can read.
    pub fn modified_at(&self) -> Option<DateTime<FixedOffset>> {
        self.mtime
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    }
}

/// Envelope returned by `/api/history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub images: Vec<HistoryEntry>,
}

/// Detection service settings as served by `/api/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub threshold: f64,
    pub consecutive_hits: i64,
    pub binary_threshold: i64,
    pub blur_kernel: i64,
    pub overlay_color: String,
    pub overlay_alpha: f64,
    pub delay_monitor_enabled: bool,
    pub delay_threshold_seconds: i64,
    pub alarm_enabled: bool,
    pub slack_webhook_url: String,
    pub slack_bot_token: String,
    pub slack_channel: String,
    /// true: detect only inside the white mask region. false: detect everywhere.
    pub mask_inclusive: bool,
    pub gpio_pin: Option<i64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            threshold: 0.15,
            consecutive_hits: 3,
            binary_threshold: 30,
            blur_kernel: 3,
            overlay_color: "#ff69b4".to_string(),
            overlay_alpha: 0.35,
            delay_monitor_enabled: true,
            delay_threshold_seconds: 300,
            alarm_enabled: true,
            slack_webhook_url: String::new(),
            slack_bot_token: String::new(),
            slack_channel: String::new(),
            mask_inclusive: true,
            gpio_pin: Some(17),
        }
    }
}

/// Envelope returned by `GET /api/config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResponse {
    pub settings: Configuration,
}

/// Partial settings body for `POST /api/config`. Absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_hits: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_kernel: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_monitor_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_threshold_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_inclusive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_pin: Option<i64>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    /// Apply every present field onto `config`, the way the server merges a write.
    pub fn apply_to(&self, config: &mut Configuration) {
        if let Some(v) = self.threshold {
            config.threshold = v;
        }
        if let Some(v) = self.consecutive_hits {
            config.consecutive_hits = v;
        }
        if let Some(v) = self.binary_threshold {
            config.binary_threshold = v;
        }
        if let Some(v) = self.blur_kernel {
            config.blur_kernel = v;
        }
        if let Some(v) = &self.overlay_color {
            config.overlay_color = v.clone();
        }
        if let Some(v) = self.overlay_alpha {
            config.overlay_alpha = v;
        }
        if let Some(v) = self.delay_monitor_enabled {
            config.delay_monitor_enabled = v;
        }
        if let Some(v) = self.delay_threshold_seconds {
            config.delay_threshold_seconds = v;
        }
        if let Some(v) = self.alarm_enabled {
            config.alarm_enabled = v;
        }
        if let Some(v) = &self.slack_webhook_url {
            config.slack_webhook_url = v.clone();
        }
        if let Some(v) = &self.slack_bot_token {
            config.slack_bot_token = v.clone();
        }
        if let Some(v) = &self.slack_channel {
            config.slack_channel = v.clone();
        }
        if let Some(v) = self.mask_inclusive {
            config.mask_inclusive = v;
        }
        if let Some(v) = self.gpio_pin {
            config.gpio_pin = Some(v);
        }
    }
}

/// Body for `POST /api/control`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_enabled: Option<bool>,
    #[serde(default)]
    pub reset_alarm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_monitor_enabled: Option<bool>,
}

/// Mask preview reference. Never versioned server-side, so the URL carries a cache token.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MaskAsset {
    #[default]
    Absent,
    Present { url: String },
}

impl MaskAsset {
    pub fn url(&self) -> Option<&str> {
        match self {
            MaskAsset::Absent => None,
            MaskAsset::Present { url } => Some(url),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, MaskAsset::Present { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayMonitorHealth {
    pub enabled: bool,
    pub threshold_seconds: i64,
    #[serde(default)]
    pub seconds_since_last_image: Option<f64>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageUsage,
    pub delay_monitor: DelayMonitorHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_state_passthrough() {
        let state: AlarmState = serde_json::from_str("\"Alarm\"").unwrap();
        assert_eq!(state, AlarmState::Alarm);

        let state: AlarmState = serde_json::from_str("\"Tripped\"").unwrap();
        assert_eq!(state, AlarmState::Other("Tripped".to_string()));
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"Tripped\"");
    }

    #[test]
    fn test_status_snapshot_from_dashboard_json() {
        let json = r#"{
            "latest_image": "/archive/2024/01/02/b.jpg",
            "previous_image": "/archive/2024/01/02/a.jpg",
            "mask_overlay": null,
            "detection_rate": 0.42,
            "threshold": 0.15,
            "alarm_state": "Alarm",
            "delay_warning": true,
            "logs": [],
            "latest_timestamp": "2024-01-02T03:04:05+00:00"
        }"#;
        let status: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(status.alarm_state, AlarmState::Alarm);
        assert!(status.delay_warning);
        assert_eq!(status.previous_timestamp, None);
        assert_eq!(status.mask_overlay, None);
    }

    #[test]
    fn test_configuration_defaults_fill_missing_fields() {
        let config: Configuration = serde_json::from_str(r#"{"threshold": 0.2}"#).unwrap();
        assert_eq!(config.threshold, 0.2);
        assert_eq!(config.consecutive_hits, 3);
        assert_eq!(config.overlay_color, "#ff69b4");
        assert_eq!(config.gpio_pin, Some(17));
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = ConfigPatch {
            mask_inclusive: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"mask_inclusive": false})
        );
        assert!(ConfigPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_patch_apply_to_leaves_absent_fields() {
        let mut config = Configuration::default();
        let patch = ConfigPatch {
            blur_kernel: Some(5),
            slack_channel: Some("#ops".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut config);
        assert_eq!(config.blur_kernel, 5);
        assert_eq!(config.slack_channel, "#ops");
        assert_eq!(config.threshold, 0.15);
    }

    #[test]
    fn test_history_entry_mtime_parsing() {
        let entry = HistoryEntry {
            path: "a.jpg".to_string(),
            mtime: Some("2024-05-01T10:00:00.123456+00:00".to_string()),
            is_overlay: false,
        };
        assert!(entry.modified_at().is_some());

        let entry = HistoryEntry {
            mtime: Some("yesterday".to_string()),
            ..entry
        };
        assert!(entry.modified_at().is_none());
    }

    #[test]
    fn test_control_request_body() {
        let req = ControlRequest {
            reset_alarm: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"reset_alarm": true})
        );
    }
}
