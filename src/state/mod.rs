pub mod field;
pub mod store;
pub mod types;

pub use field::{ConfigField, FieldKind, FieldValue};
pub use store::{
    lock, FastSnapshot, MergeOutcome, Notice, NoticeKind, ResetCapture, SharedStore, StateStore,
};
pub use types::{
    AlarmState, ConfigPatch, Configuration, ControlRequest, DelayMonitorHealth, HealthReport,
    HistoryEntry, MaskAsset, StatusSnapshot, StorageUsage,
};
