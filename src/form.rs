//! Raw operator input to typed field values.

use tracing::debug;

use crate::error::DashboardError;
use crate::state::{ConfigField, FieldKind, FieldValue};

/// Parse what the operator typed for `field`.
///
/// Numeric fields that are empty or do not parse yield
/// [`DashboardError::ValidationSkip`]; the caller drops the field from the save
/// rather than reporting an error. Text fields are taken as-is, secrets included.
pub fn parse_input(field: ConfigField, raw: &str) -> Result<FieldValue, DashboardError> {
    let trimmed = raw.trim();
    let skip = || {
        debug!("Skipping input {:?} for {}", raw, field);
        DashboardError::ValidationSkip {
            field: field.name(),
        }
    };

    match field.kind() {
        FieldKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(FieldValue::Float)
            .ok_or_else(skip),
        FieldKind::Int => trimmed
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| skip()),
        // An empty pin clears it; anything else has to be a number
        FieldKind::OptionalInt if trimmed.is_empty() => Ok(FieldValue::OptionalInt(None)),
        FieldKind::OptionalInt => trimmed
            .parse::<i64>()
            .map(|v| FieldValue::OptionalInt(Some(v)))
            .map_err(|_| skip()),
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Bool => parse_switch(trimmed).map(FieldValue::Bool).ok_or_else(|| {
            DashboardError::Config(format!("Expected on/off for {}, got '{}'", field, raw))
        }),
    }
}

/// Accepts the usual spellings of a switch.
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "enable" | "enabled" => Some(true),
        "off" | "false" | "no" | "0" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}
