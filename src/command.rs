use std::fmt;
use std::future::Future;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::DashboardError;
use crate::state::{
    lock, ConfigField, ConfigPatch, ControlRequest, FieldValue, NoticeKind, ResetCapture,
    StateStore,
};
use crate::transport::Backend;

/// A fire-and-forget control issued by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetAlarmEnabled(bool),
    SetDelayMonitorEnabled(bool),
    SetMaskInclusive(bool),
    ResetAlarm,
}

impl Command {
    /// The configuration field this command predicts, if any. Reset targets status instead.
    pub fn target(self) -> Option<(ConfigField, FieldValue)> {
        match self {
            Command::SetAlarmEnabled(v) => Some((ConfigField::AlarmEnabled, FieldValue::Bool(v))),
            Command::SetDelayMonitorEnabled(v) => {
                Some((ConfigField::DelayMonitorEnabled, FieldValue::Bool(v)))
            }
            Command::SetMaskInclusive(v) => Some((ConfigField::MaskInclusive, FieldValue::Bool(v))),
            Command::ResetAlarm => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetAlarmEnabled(true) => f.write_str("enable alarm"),
            Command::SetAlarmEnabled(false) => f.write_str("disable alarm"),
            Command::SetDelayMonitorEnabled(true) => f.write_str("enable delay monitor"),
            Command::SetDelayMonitorEnabled(false) => f.write_str("disable delay monitor"),
            Command::SetMaskInclusive(true) => f.write_str("switch to inclusive mask"),
            Command::SetMaskInclusive(false) => f.write_str("switch to exclusive mask"),
            Command::ResetAlarm => f.write_str("reset alarm"),
        }
    }
}

/// Sends one command to the server.
pub trait CommandWriter: Send + Sync {
    fn write(&self, command: Command) -> impl Future<Output = Result<(), DashboardError>> + Send;
}

impl<B: Backend> CommandWriter for B {
    async fn write(&self, command: Command) -> Result<(), DashboardError> {
        match command {
            Command::SetAlarmEnabled(v) => {
                self.send_control(&ControlRequest {
                    alarm_enabled: Some(v),
                    ..Default::default()
                })
                .await
            }
            Command::SetDelayMonitorEnabled(v) => {
                self.send_control(&ControlRequest {
                    delay_monitor_enabled: Some(v),
                    ..Default::default()
                })
                .await
            }
            // The control endpoint has no mask switch; it goes through a config write
            Command::SetMaskInclusive(v) => {
                self.write_config(&ConfigPatch {
                    mask_inclusive: Some(v),
                    ..Default::default()
                })
                .await
            }
            Command::ResetAlarm => {
                self.send_control(&ControlRequest {
                    reset_alarm: true,
                    ..Default::default()
                })
                .await
            }
        }
    }
}

/// What the store looked like before the prediction was applied.
#[derive(Debug, Clone, PartialEq)]
enum Capture {
    Field(ConfigField, FieldValue),
    Reset(ResetCapture),
}

/// Apply `command` optimistically, send it, and roll back if the write fails.
///
/// The store reflects the predicted value before the request goes out. On
/// failure the captured value is restored and a command notice is raised.
/// Reconciling with server truth afterward is the caller's job (see
/// `Dashboard::execute`, which always follows up with a forced resync).
pub async fn run_optimistic<W: CommandWriter>(
    store: &Mutex<StateStore>,
    command: Command,
    writer: &W,
) -> Result<(), DashboardError> {
    let capture = {
        let mut state = lock(store);
        match command.target() {
            Some((field, value)) => Capture::Field(field, state.apply_optimistic(field, value)?),
            None => Capture::Reset(state.apply_reset()),
        }
    };

    let result = writer.write(command).await;

    let mut state = lock(store);
    match &result {
        Ok(()) => {
            info!("Command succeeded: {}", command);
            state.clear_notice(NoticeKind::Command);
        }
        Err(e) => {
            warn!("Command failed, rolling back: {}: {}", command, e);
            match capture {
                Capture::Field(field, prior) => state.restore_field(field, prior)?,
                Capture::Reset(prior) => state.restore_reset(prior),
            }
            state.set_notice(NoticeKind::Command, format!("Could not {}: {}", command, e));
        }
    }
    result
}
