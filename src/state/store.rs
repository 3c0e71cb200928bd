use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::alarm::{Acknowledgment, AlarmGate};
use crate::error::DashboardError;

use super::field::{ConfigField, FieldValue};
use super::types::{AlarmState, ConfigPatch, Configuration, HistoryEntry, MaskAsset, StatusSnapshot};

/// The store as shared between poll tasks and command tasks.
pub type SharedStore = Arc<Mutex<StateStore>>;

/// Lock the store. Guards are held only for synchronous sections, never across an await.
/// A poisoned lock still holds consistent data: every mutation is a single assignment sequence.
pub fn lock(store: &Mutex<StateStore>) -> MutexGuard<'_, StateStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Result of the fast read path: everything except configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FastSnapshot {
    pub status: StatusSnapshot,
    pub history: Vec<HistoryEntry>,
    pub mask: MaskAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The buffer now equals the server copy.
    Applied,
    /// Buffer kept; the server copy is held as committed until reconciled.
    Deferred,
    /// The read started before one that already landed. Nothing was recorded.
    Stale,
}

/// Where a banner message came from. A later success of the same kind clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Poll,
    Command,
    Save,
    Mask,
    Transfer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Captured pre-command state of an alarm reset, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetCapture {
    alarm_state: Option<AlarmState>,
    acknowledgment: Acknowledgment,
    status_read: u64,
}

/// Last-known server state plus the local configuration edit buffer.
///
/// Status, history and mask are read-only to the client and are replaced on
/// every poll. Configuration has two copies: `committed` is the latest server
/// read, `buffer` is what the operator sees and edits. While `dirty` is set,
/// only a forced merge may overwrite the buffer.
///
/// Reads are numbered when they start (`begin_config_read`, `begin_fast_read`).
/// A result that lands after a later-started read has landed is dropped, so a
/// slow background poll can never undo a resync or a mask change.
#[derive(Debug, Default)]
pub struct StateStore {
    status: Option<StatusSnapshot>,
    reported_alarm: bool,
    history: Vec<HistoryEntry>,
    committed: Option<Configuration>,
    buffer: Option<Configuration>,
    dirty: bool,
    skipped: BTreeSet<ConfigField>,
    mask: MaskAsset,
    image_token: Option<i64>,
    gate: AlarmGate,
    in_flight: usize,
    notice: Option<Notice>,
    revision: u64,
    config_reads: u64,
    committed_read: u64,
    fast_reads: u64,
    fast_applied: u64,
    status_read: u64,
    mask_changed: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number a fast read (status, history, mask) before it is sent.
    pub fn begin_fast_read(&mut self) -> u64 {
        self.fast_reads += 1;
        self.fast_reads
    }

    /// Number a configuration read before it is sent.
    pub fn begin_config_read(&mut self) -> u64 {
        self.config_reads += 1;
        self.config_reads
    }

    /// Replace status, history and mask wholesale with a read taken now.
    pub fn apply_fast(&mut self, snapshot: FastSnapshot, image_token: i64) {
        let read = self.begin_fast_read();
        self.apply_fast_read(read, snapshot, image_token);
    }

    /// Replace status, history and mask with the result of fast read `read`.
    ///
    /// Returns false, changing nothing, when a later-started read was already
    /// applied. The mask is kept when it was set locally after `read` started.
    pub fn apply_fast_read(&mut self, read: u64, snapshot: FastSnapshot, image_token: i64) -> bool {
        if read < self.fast_applied {
            debug!("Dropping stale fast read {} (applied {})", read, self.fast_applied);
            return false;
        }
        self.fast_applied = read;
        self.status_read = read;
        self.reported_alarm = snapshot.status.alarm_state == AlarmState::Alarm;
        self.status = Some(snapshot.status);
        self.history = snapshot.history;
        if read > self.mask_changed {
            self.mask = snapshot.mask;
        } else {
            debug!("Keeping mask changed after fast read {} started", read);
        }
        self.image_token = Some(image_token);
        self.clear_notice(NoticeKind::Poll);
        self.observe_alarm();
        self.bump();
        true
    }

    /// Merge a configuration read taken now.
    pub fn merge_config(&mut self, server: Configuration, force: bool) -> MergeOutcome {
        let read = self.begin_config_read();
        self.merge_config_read(read, server, force)
    }

    /// Merge the result of configuration read `read`.
    ///
    /// A read older than one already landed is dropped as stale. Otherwise it is
    /// recorded as committed, and replaces the buffer only when `force` is set or
    /// when the buffer is clean and no command is in flight.
    pub fn merge_config_read(
        &mut self,
        read: u64,
        server: Configuration,
        force: bool,
    ) -> MergeOutcome {
        if read < self.committed_read {
            debug!("Dropping stale config read {} (landed {})", read, self.committed_read);
            return MergeOutcome::Stale;
        }
        self.committed_read = read;
        self.committed = Some(server.clone());
        let outcome = if force || (!self.dirty && self.in_flight == 0) {
            self.buffer = Some(server);
            self.dirty = false;
            self.skipped.clear();
            self.observe_alarm();
            MergeOutcome::Applied
        } else {
            debug!(
                "Deferring config merge (dirty: {}, in flight: {})",
                self.dirty, self.in_flight
            );
            MergeOutcome::Deferred
        };
        self.bump();
        outcome
    }

    /// Operator edit of one field. Marks the buffer dirty before returning.
    pub fn edit(&mut self, field: ConfigField, value: FieldValue) -> Result<(), DashboardError> {
        let buffer = self.buffer_mut()?;
        buffer.set(field, value)?;
        self.dirty = true;
        self.skipped.remove(&field);
        self.observe_alarm();
        self.bump();
        Ok(())
    }

    /// The operator typed something unusable into a numeric field.
    /// The field is left out of the next save, and the buffer counts as edited.
    pub fn mark_skipped(&mut self, field: ConfigField) -> Result<(), DashboardError> {
        self.buffer_mut()?;
        self.dirty = true;
        self.skipped.insert(field);
        self.bump();
        Ok(())
    }

    /// Payload for a save: the whole buffer minus skipped fields.
    pub fn save_payload(&self) -> Result<ConfigPatch, DashboardError> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| DashboardError::Config("Configuration not loaded yet".to_string()))?;
        let skip: Vec<ConfigField> = self.skipped.iter().copied().collect();
        Ok(buffer.to_patch(&skip))
    }

    /// Apply a predicted value without touching `dirty`. Returns the value it replaced.
    pub fn apply_optimistic(
        &mut self,
        field: ConfigField,
        value: FieldValue,
    ) -> Result<FieldValue, DashboardError> {
        let buffer = self.buffer_mut()?;
        let prior = buffer.get(field);
        buffer.set(field, value)?;
        self.observe_alarm();
        self.bump();
        Ok(prior)
    }

    pub fn restore_field(&mut self, field: ConfigField, prior: FieldValue) -> Result<(), DashboardError> {
        let buffer = self.buffer_mut()?;
        buffer.set(field, prior)?;
        self.observe_alarm();
        self.bump();
        Ok(())
    }

    /// Operator reset: acknowledge the episode and show `Normal` until the next poll.
    pub fn apply_reset(&mut self) -> ResetCapture {
        let capture = ResetCapture {
            alarm_state: self.status.as_ref().map(|s| s.alarm_state.clone()),
            acknowledgment: self.gate.acknowledgment(),
            status_read: self.status_read,
        };
        if let Some(status) = self.status.as_mut() {
            status.alarm_state = AlarmState::Normal;
        }
        self.gate.acknowledge();
        self.bump();
        capture
    }

    /// Undo a failed reset. A status polled since the reset is newer and stays.
    pub fn restore_reset(&mut self, capture: ResetCapture) {
        if self.status_read == capture.status_read {
            if let (Some(status), Some(state)) = (self.status.as_mut(), capture.alarm_state) {
                status.alarm_state = state;
            }
        }
        self.gate.restore(capture.acknowledgment);
        self.bump();
    }

    /// Local mask change after an upload or delete. Fast reads already in flight will not undo it.
    pub fn set_mask(&mut self, mask: MaskAsset, image_token: i64) {
        info!("Mask reference now {}", mask.url().unwrap_or("absent"));
        self.mask_changed = self.begin_fast_read();
        self.mask = mask;
        self.image_token = Some(image_token);
        self.bump();
    }

    pub fn set_image_token(&mut self, image_token: i64) {
        self.image_token = Some(image_token);
        self.bump();
    }

    pub fn begin_command(&mut self) {
        self.in_flight += 1;
    }

    pub fn end_command(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn set_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            message: message.into(),
        });
        self.bump();
    }

    pub fn clear_notice(&mut self, kind: NoticeKind) {
        if self.notice.as_ref().is_some_and(|n| n.kind == kind) {
            self.notice = None;
            self.bump();
        }
    }

    pub fn status(&self) -> Option<&StatusSnapshot> {
        self.status.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The configuration the operator sees.
    pub fn config(&self) -> Option<&Configuration> {
        self.buffer.as_ref()
    }

    /// The latest configuration read from the server.
    pub fn committed(&self) -> Option<&Configuration> {
        self.committed.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn skipped_fields(&self) -> impl Iterator<Item = ConfigField> + '_ {
        self.skipped.iter().copied()
    }

    pub fn mask(&self) -> &MaskAsset {
        &self.mask
    }

    pub fn image_token(&self) -> Option<i64> {
        self.image_token
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn acknowledgment(&self) -> Acknowledgment {
        self.gate.acknowledgment()
    }

    /// Alarm condition as currently displayed (reset override included).
    pub fn alarm_condition(&self) -> bool {
        let enabled = self.buffer.as_ref().is_some_and(|c| c.alarm_enabled);
        let alarming = self
            .status
            .as_ref()
            .is_some_and(|s| s.alarm_state == AlarmState::Alarm);
        enabled && alarming
    }

    pub fn banner_visible(&self) -> bool {
        self.gate.banner_visible(self.alarm_condition())
    }

    fn buffer_mut(&mut self) -> Result<&mut Configuration, DashboardError> {
        self.buffer
            .as_mut()
            .ok_or_else(|| DashboardError::Config("Configuration not loaded yet".to_string()))
    }

    // The gate sees what the server reported, not the local reset override.
    fn observe_alarm(&mut self) {
        let enabled = self.buffer.as_ref().is_some_and(|c| c.alarm_enabled);
        self.gate.observe(enabled && self.reported_alarm);
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: AlarmState) -> FastSnapshot {
        FastSnapshot {
            status: StatusSnapshot {
                alarm_state: state,
                detection_rate: 0.3,
                threshold: 0.15,
                ..Default::default()
            },
            history: vec![HistoryEntry {
                path: "/archive/a.jpg".to_string(),
                mtime: None,
                is_overlay: false,
            }],
            mask: MaskAsset::Absent,
        }
    }

    fn loaded_store() -> StateStore {
        let mut store = StateStore::new();
        store.merge_config(Configuration::default(), false);
        store
    }

    #[test]
    fn test_clean_merge_applies() {
        let mut store = loaded_store();
        let mut server = Configuration::default();
        server.threshold = 0.3;

        assert_eq!(store.merge_config(server.clone(), false), MergeOutcome::Applied);
        assert_eq!(store.config(), Some(&server));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_dirty_buffer_defers_background_merge() {
        let mut store = loaded_store();
        store
            .edit(ConfigField::Threshold, FieldValue::Float(0.5))
            .unwrap();
        assert!(store.is_dirty());

        let mut server = Configuration::default();
        server.threshold = 0.2;
        server.blur_kernel = 7;
        assert_eq!(store.merge_config(server.clone(), false), MergeOutcome::Deferred);

        let buffer = store.config().unwrap();
        assert_eq!(buffer.threshold, 0.5);
        assert_eq!(buffer.blur_kernel, 3);
        assert_eq!(store.committed(), Some(&server));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_forced_merge_overrides_dirty_buffer() {
        let mut store = loaded_store();
        store
            .edit(ConfigField::SlackChannel, FieldValue::Text("#alerts".to_string()))
            .unwrap();
        store.mark_skipped(ConfigField::BlurKernel).unwrap();

        let server = Configuration::default();
        assert_eq!(store.merge_config(server.clone(), true), MergeOutcome::Applied);
        assert_eq!(store.config(), Some(&server));
        assert!(!store.is_dirty());
        assert_eq!(store.skipped_fields().count(), 0);
    }

    #[test]
    fn test_in_flight_command_defers_background_merge() {
        let mut store = loaded_store();
        store.begin_command();
        assert_eq!(
            store.merge_config(Configuration::default(), false),
            MergeOutcome::Deferred
        );
        store.end_command();
        assert_eq!(
            store.merge_config(Configuration::default(), false),
            MergeOutcome::Applied
        );
    }

    #[test]
    fn test_edit_before_load_is_rejected() {
        let mut store = StateStore::new();
        let err = store
            .edit(ConfigField::Threshold, FieldValue::Float(0.1))
            .unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_apply_fast_replaces_everything_and_clears_poll_notice() {
        let mut store = loaded_store();
        store.edit(ConfigField::BlurKernel, FieldValue::Int(5)).unwrap();
        store.set_notice(NoticeKind::Poll, "status request failed");

        store.apply_fast(snapshot(AlarmState::Warning), 42);
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Warning);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.image_token(), Some(42));
        assert!(store.notice().is_none());
        // Dirty flag is a config-only concept
        assert!(store.is_dirty());
    }

    #[test]
    fn test_poll_success_keeps_command_notice() {
        let mut store = loaded_store();
        store.set_notice(NoticeKind::Command, "control request failed");
        store.apply_fast(snapshot(AlarmState::Normal), 1);
        assert_eq!(store.notice().unwrap().kind, NoticeKind::Command);
    }

    #[test]
    fn test_banner_follows_alarm_episode() {
        let mut store = loaded_store();
        store.apply_fast(snapshot(AlarmState::Alarm), 1);
        assert!(store.banner_visible());

        let _ = store.apply_reset();
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Normal);
        assert!(!store.banner_visible());

        // Same episode still reported by the server: stays acknowledged
        store.apply_fast(snapshot(AlarmState::Alarm), 2);
        assert!(!store.banner_visible());

        // Episode ends, a new one starts
        store.apply_fast(snapshot(AlarmState::Normal), 3);
        store.apply_fast(snapshot(AlarmState::Alarm), 4);
        assert!(store.banner_visible());
    }

    #[test]
    fn test_reset_survives_config_merge() {
        let mut store = loaded_store();
        store.apply_fast(snapshot(AlarmState::Alarm), 1);
        let _ = store.apply_reset();
        store.merge_config(Configuration::default(), true);
        store.apply_fast(snapshot(AlarmState::Alarm), 2);
        assert!(!store.banner_visible());
    }

    #[test]
    fn test_banner_hidden_when_alarm_disabled() {
        let mut store = StateStore::new();
        let mut server = Configuration::default();
        server.alarm_enabled = false;
        store.merge_config(server, false);
        store.apply_fast(snapshot(AlarmState::Alarm), 1);
        assert!(!store.banner_visible());
    }

    #[test]
    fn test_restore_reset_puts_back_state() {
        let mut store = loaded_store();
        store.apply_fast(snapshot(AlarmState::Alarm), 1);
        let capture = store.apply_reset();
        store.restore_reset(capture);
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Alarm);
        assert!(store.banner_visible());
    }

    #[test]
    fn test_optimistic_apply_and_restore() {
        let mut store = loaded_store();
        let prior = store
            .apply_optimistic(ConfigField::MaskInclusive, FieldValue::Bool(false))
            .unwrap();
        assert_eq!(prior, FieldValue::Bool(true));
        assert!(!store.config().unwrap().mask_inclusive);
        assert!(!store.is_dirty());

        store.restore_field(ConfigField::MaskInclusive, prior).unwrap();
        assert!(store.config().unwrap().mask_inclusive);
    }

    #[test]
    fn test_save_payload_excludes_skipped() {
        let mut store = loaded_store();
        store.mark_skipped(ConfigField::Threshold).unwrap();
        let patch = store.save_payload().unwrap();
        assert_eq!(patch.threshold, None);
        assert_eq!(patch.binary_threshold, Some(30));

        // A valid edit brings the field back
        store
            .edit(ConfigField::Threshold, FieldValue::Float(0.25))
            .unwrap();
        assert_eq!(store.save_payload().unwrap().threshold, Some(0.25));
    }

    #[test]
    fn test_config_read_older_than_resync_is_dropped() {
        let mut store = loaded_store();
        let background = store.begin_config_read();

        let mut server = Configuration::default();
        server.alarm_enabled = false;
        assert_eq!(store.merge_config(server.clone(), true), MergeOutcome::Applied);

        let outcome = store.merge_config_read(background, Configuration::default(), false);
        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(store.config(), Some(&server));
        assert_eq!(store.committed(), Some(&server));
    }

    #[test]
    fn test_overlapping_config_reads_newest_wins() {
        let mut store = loaded_store();
        let first = store.begin_config_read();
        let second = store.begin_config_read();

        let mut newer = Configuration::default();
        newer.blur_kernel = 9;
        assert_eq!(store.merge_config_read(second, newer.clone(), true), MergeOutcome::Applied);
        assert_eq!(
            store.merge_config_read(first, Configuration::default(), true),
            MergeOutcome::Stale
        );
        assert_eq!(store.config(), Some(&newer));
    }

    #[test]
    fn test_fast_read_started_before_mask_change_keeps_mask() {
        let mut store = loaded_store();
        let in_flight = store.begin_fast_read();
        let uploaded = MaskAsset::Present {
            url: "http://host/api/mask-image?t=5".to_string(),
        };
        store.set_mask(uploaded.clone(), 5);

        assert!(store.apply_fast_read(in_flight, snapshot(AlarmState::Warning), 6));
        assert_eq!(store.mask(), &uploaded);
        // Status from the same read still lands
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Warning);

        store.apply_fast(snapshot(AlarmState::Normal), 7);
        assert_eq!(store.mask(), &MaskAsset::Absent);
    }

    #[test]
    fn test_stale_fast_read_is_dropped() {
        let mut store = loaded_store();
        let slow = store.begin_fast_read();
        store.apply_fast(snapshot(AlarmState::Alarm), 2);

        assert!(!store.apply_fast_read(slow, snapshot(AlarmState::Normal), 3));
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Alarm);
        assert_eq!(store.image_token(), Some(2));
    }

    #[test]
    fn test_restore_reset_keeps_newer_poll() {
        let mut store = loaded_store();
        store.apply_fast(snapshot(AlarmState::Alarm), 1);
        let capture = store.apply_reset();
        store.apply_fast(snapshot(AlarmState::Warning), 2);

        store.restore_reset(capture);
        assert_eq!(store.status().unwrap().alarm_state, AlarmState::Warning);
    }

    #[test]
    fn test_revision_moves_on_mutation() {
        let mut store = StateStore::new();
        let before = store.revision();
        store.set_notice(NoticeKind::Save, "config write failed");
        assert!(store.revision() > before);
    }
}
