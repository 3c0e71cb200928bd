use std::fmt;
use std::str::FromStr;

use crate::error::DashboardError;

use super::types::{ConfigPatch, Configuration};

/// Addressable field of [`Configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigField {
    Threshold,
    ConsecutiveHits,
    BinaryThreshold,
    BlurKernel,
    OverlayColor,
    OverlayAlpha,
    DelayMonitorEnabled,
    DelayThresholdSeconds,
    AlarmEnabled,
    SlackWebhookUrl,
    SlackBotToken,
    SlackChannel,
    MaskInclusive,
    GpioPin,
}

/// The shape a field's value takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Int,
    OptionalInt,
    Text,
    Bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    OptionalInt(Option<i64>),
    Text(String),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::OptionalInt(Some(v)) => write!(f, "{}", v),
            FieldValue::OptionalInt(None) => f.write_str("-"),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl ConfigField {
    pub const ALL: [ConfigField; 14] = [
        ConfigField::Threshold,
        ConfigField::ConsecutiveHits,
        ConfigField::BinaryThreshold,
        ConfigField::BlurKernel,
        ConfigField::OverlayColor,
        ConfigField::OverlayAlpha,
        ConfigField::DelayMonitorEnabled,
        ConfigField::DelayThresholdSeconds,
        ConfigField::AlarmEnabled,
        ConfigField::SlackWebhookUrl,
        ConfigField::SlackBotToken,
        ConfigField::SlackChannel,
        ConfigField::MaskInclusive,
        ConfigField::GpioPin,
    ];

    /// Wire name, identical to the JSON key.
    pub fn name(self) -> &'static str {
        match self {
            ConfigField::Threshold => "threshold",
            ConfigField::ConsecutiveHits => "consecutive_hits",
            ConfigField::BinaryThreshold => "binary_threshold",
            ConfigField::BlurKernel => "blur_kernel",
            ConfigField::OverlayColor => "overlay_color",
            ConfigField::OverlayAlpha => "overlay_alpha",
            ConfigField::DelayMonitorEnabled => "delay_monitor_enabled",
            ConfigField::DelayThresholdSeconds => "delay_threshold_seconds",
            ConfigField::AlarmEnabled => "alarm_enabled",
            ConfigField::SlackWebhookUrl => "slack_webhook_url",
            ConfigField::SlackBotToken => "slack_bot_token",
            ConfigField::SlackChannel => "slack_channel",
            ConfigField::MaskInclusive => "mask_inclusive",
            ConfigField::GpioPin => "gpio_pin",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ConfigField::Threshold | ConfigField::OverlayAlpha => FieldKind::Float,
            ConfigField::ConsecutiveHits
            | ConfigField::BinaryThreshold
            | ConfigField::BlurKernel
            | ConfigField::DelayThresholdSeconds => FieldKind::Int,
            ConfigField::GpioPin => FieldKind::OptionalInt,
            ConfigField::OverlayColor
            | ConfigField::SlackWebhookUrl
            | ConfigField::SlackBotToken
            | ConfigField::SlackChannel => FieldKind::Text,
            ConfigField::DelayMonitorEnabled
            | ConfigField::AlarmEnabled
            | ConfigField::MaskInclusive => FieldKind::Bool,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self.kind(),
            FieldKind::Float | FieldKind::Int | FieldKind::OptionalInt
        )
    }
}

impl FromStr for ConfigField {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigField::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| DashboardError::Config(format!("Unknown config field: {}", s)))
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Configuration {
    pub fn get(&self, field: ConfigField) -> FieldValue {
        match field {
            ConfigField::Threshold => FieldValue::Float(self.threshold),
            ConfigField::ConsecutiveHits => FieldValue::Int(self.consecutive_hits),
            ConfigField::BinaryThreshold => FieldValue::Int(self.binary_threshold),
            ConfigField::BlurKernel => FieldValue::Int(self.blur_kernel),
            ConfigField::OverlayColor => FieldValue::Text(self.overlay_color.clone()),
            ConfigField::OverlayAlpha => FieldValue::Float(self.overlay_alpha),
            ConfigField::DelayMonitorEnabled => FieldValue::Bool(self.delay_monitor_enabled),
            ConfigField::DelayThresholdSeconds => FieldValue::Int(self.delay_threshold_seconds),
            ConfigField::AlarmEnabled => FieldValue::Bool(self.alarm_enabled),
            ConfigField::SlackWebhookUrl => FieldValue::Text(self.slack_webhook_url.clone()),
            ConfigField::SlackBotToken => FieldValue::Text(self.slack_bot_token.clone()),
            ConfigField::SlackChannel => FieldValue::Text(self.slack_channel.clone()),
            ConfigField::MaskInclusive => FieldValue::Bool(self.mask_inclusive),
            ConfigField::GpioPin => FieldValue::OptionalInt(self.gpio_pin),
        }
    }

    /// Set a field, rejecting a value of the wrong shape.
    pub fn set(&mut self, field: ConfigField, value: FieldValue) -> Result<(), DashboardError> {
        match (field, value) {
            (ConfigField::Threshold, FieldValue::Float(v)) => self.threshold = v,
            (ConfigField::ConsecutiveHits, FieldValue::Int(v)) => self.consecutive_hits = v,
            (ConfigField::BinaryThreshold, FieldValue::Int(v)) => self.binary_threshold = v,
            (ConfigField::BlurKernel, FieldValue::Int(v)) => self.blur_kernel = v,
            (ConfigField::OverlayColor, FieldValue::Text(v)) => self.overlay_color = v,
            (ConfigField::OverlayAlpha, FieldValue::Float(v)) => self.overlay_alpha = v,
            (ConfigField::DelayMonitorEnabled, FieldValue::Bool(v)) => {
                self.delay_monitor_enabled = v
            }
            (ConfigField::DelayThresholdSeconds, FieldValue::Int(v)) => {
                self.delay_threshold_seconds = v
            }
            (ConfigField::AlarmEnabled, FieldValue::Bool(v)) => self.alarm_enabled = v,
            (ConfigField::SlackWebhookUrl, FieldValue::Text(v)) => self.slack_webhook_url = v,
            (ConfigField::SlackBotToken, FieldValue::Text(v)) => self.slack_bot_token = v,
            (ConfigField::SlackChannel, FieldValue::Text(v)) => self.slack_channel = v,
            (ConfigField::MaskInclusive, FieldValue::Bool(v)) => self.mask_inclusive = v,
            (ConfigField::GpioPin, FieldValue::OptionalInt(v)) => self.gpio_pin = v,
            (ConfigField::GpioPin, FieldValue::Int(v)) => self.gpio_pin = Some(v),
            (field, value) => {
                return Err(DashboardError::Config(format!(
                    "Value {:?} does not fit field {}",
                    value, field
                )))
            }
        }
        Ok(())
    }

    /// Build a write payload carrying every field except `skip`.
    /// A cleared GPIO pin is left out, since the server ignores nulls.
    pub fn to_patch(&self, skip: &[ConfigField]) -> ConfigPatch {
        let keep = |field: ConfigField| !skip.contains(&field);
        ConfigPatch {
            threshold: keep(ConfigField::Threshold).then_some(self.threshold),
            consecutive_hits: keep(ConfigField::ConsecutiveHits).then_some(self.consecutive_hits),
            binary_threshold: keep(ConfigField::BinaryThreshold).then_some(self.binary_threshold),
            blur_kernel: keep(ConfigField::BlurKernel).then_some(self.blur_kernel),
            overlay_color: keep(ConfigField::OverlayColor).then(|| self.overlay_color.clone()),
            overlay_alpha: keep(ConfigField::OverlayAlpha).then_some(self.overlay_alpha),
            delay_monitor_enabled: keep(ConfigField::DelayMonitorEnabled)
                .then_some(self.delay_monitor_enabled),
            delay_threshold_seconds: keep(ConfigField::DelayThresholdSeconds)
                .then_some(self.delay_threshold_seconds),
            alarm_enabled: keep(ConfigField::AlarmEnabled).then_some(self.alarm_enabled),
            slack_webhook_url: keep(ConfigField::SlackWebhookUrl)
                .then(|| self.slack_webhook_url.clone()),
            slack_bot_token: keep(ConfigField::SlackBotToken).then(|| self.slack_bot_token.clone()),
            slack_channel: keep(ConfigField::SlackChannel).then(|| self.slack_channel.clone()),
            mask_inclusive: keep(ConfigField::MaskInclusive).then_some(self.mask_inclusive),
            gpio_pin: if keep(ConfigField::GpioPin) {
                self.gpio_pin
            } else {
                None
            },
        }
    }
}

impl ConfigPatch {
    /// Set one field of the patch.
    pub fn set(&mut self, field: ConfigField, value: FieldValue) -> Result<(), DashboardError> {
        match (field, value) {
            (ConfigField::Threshold, FieldValue::Float(v)) => self.threshold = Some(v),
            (ConfigField::ConsecutiveHits, FieldValue::Int(v)) => self.consecutive_hits = Some(v),
            (ConfigField::BinaryThreshold, FieldValue::Int(v)) => self.binary_threshold = Some(v),
            (ConfigField::BlurKernel, FieldValue::Int(v)) => self.blur_kernel = Some(v),
            (ConfigField::OverlayColor, FieldValue::Text(v)) => self.overlay_color = Some(v),
            (ConfigField::OverlayAlpha, FieldValue::Float(v)) => self.overlay_alpha = Some(v),
            (ConfigField::DelayMonitorEnabled, FieldValue::Bool(v)) => {
                self.delay_monitor_enabled = Some(v)
            }
            (ConfigField::DelayThresholdSeconds, FieldValue::Int(v)) => {
                self.delay_threshold_seconds = Some(v)
            }
            (ConfigField::AlarmEnabled, FieldValue::Bool(v)) => self.alarm_enabled = Some(v),
            (ConfigField::SlackWebhookUrl, FieldValue::Text(v)) => {
                self.slack_webhook_url = Some(v)
            }
            (ConfigField::SlackBotToken, FieldValue::Text(v)) => self.slack_bot_token = Some(v),
            (ConfigField::SlackChannel, FieldValue::Text(v)) => self.slack_channel = Some(v),
            (ConfigField::MaskInclusive, FieldValue::Bool(v)) => self.mask_inclusive = Some(v),
            (ConfigField::GpioPin, FieldValue::OptionalInt(v)) => self.gpio_pin = v,
            (ConfigField::GpioPin, FieldValue::Int(v)) => self.gpio_pin = Some(v),
            (field, value) => {
                return Err(DashboardError::Config(format!(
                    "Value {:?} does not fit field {}",
                    value, field
                )))
            }
        }
        Ok(())
    }
}
