//! Configuration export/import as a JSON document.
//!
//! Only the allow-listed detection parameters, delay threshold and Slack
//! settings travel. Overlay appearance, GPIO and switches stay on the device.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::DashboardError;
use crate::state::{ConfigField, ConfigPatch, Configuration, FieldKind, FieldValue};

pub const TRANSFER_FIELDS: [ConfigField; 8] = [
    ConfigField::Threshold,
    ConfigField::ConsecutiveHits,
    ConfigField::BinaryThreshold,
    ConfigField::BlurKernel,
    ConfigField::DelayThresholdSeconds,
    ConfigField::SlackWebhookUrl,
    ConfigField::SlackBotToken,
    ConfigField::SlackChannel,
];

/// Serialize the allow-listed fields of `config` as pretty-printed JSON.
pub fn export_config(config: &Configuration) -> Result<String, DashboardError> {
    let mut doc = Map::new();
    for field in TRANSFER_FIELDS {
        doc.insert(field.name().to_string(), to_json(config.get(field)));
    }
    serde_json::to_string_pretty(&Value::Object(doc))
        .map_err(|e| DashboardError::Import(format!("Failed to serialize config: {}", e)))
}

/// Build a write payload from an exported document.
///
/// Unknown keys are ignored. An allow-listed key with a value of the wrong
/// type is skipped. The document itself must be a JSON object.
pub fn import_config(raw: &str) -> Result<ConfigPatch, DashboardError> {
    let doc: Value = serde_json::from_str(raw)
        .map_err(|e| DashboardError::Import(format!("Invalid JSON: {}", e)))?;
    let Value::Object(map) = doc else {
        return Err(DashboardError::Import(
            "Expected a JSON object of settings".to_string(),
        ));
    };

    let mut patch = ConfigPatch::default();
    for field in TRANSFER_FIELDS {
        let Some(value) = map.get(field.name()) else {
            continue;
        };
        match from_json(field, value) {
            Some(v) => patch.set(field, v)?,
            None => warn!("Skipping {} in import: unexpected value {}", field, value),
        }
    }

    let ignored: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !TRANSFER_FIELDS.iter().any(|f| f.name() == *k))
        .collect();
    if !ignored.is_empty() {
        info!("Ignoring keys not carried by import: {}", ignored.join(", "));
    }

    Ok(patch)
}

fn to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Float(v) => Value::from(v),
        FieldValue::Int(v) => Value::from(v),
        FieldValue::OptionalInt(v) => v.map(Value::from).unwrap_or(Value::Null),
        FieldValue::Text(v) => Value::String(v),
        FieldValue::Bool(v) => Value::Bool(v),
    }
}

fn from_json(field: ConfigField, value: &Value) -> Option<FieldValue> {
    match field.kind() {
        FieldKind::Float => value.as_f64().map(FieldValue::Float),
        FieldKind::Int => value.as_i64().map(FieldValue::Int),
        FieldKind::OptionalInt => value.as_i64().map(|v| FieldValue::OptionalInt(Some(v))),
        FieldKind::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
        FieldKind::Bool => value.as_bool().map(FieldValue::Bool),
    }
}
