use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache_buster::{with_token, CacheBuster};
use crate::command::{run_optimistic, Command};
use crate::error::DashboardError;
use crate::form::parse_input;
use crate::mask::prepare_mask;
use crate::settings::ClientConfig;
use crate::state::{
    lock, ConfigField, FastSnapshot, FieldValue, HealthReport, MaskAsset, MergeOutcome,
    NoticeKind, SharedStore, StateStore,
};
use crate::transfer;
use crate::transport::Backend;
use crate::view::{DashboardView, ImageResolver};

/// One dashboard session: the shared store, the backend it syncs with, and
/// every operator action. Cheap to clone; clones share the same store.
///
/// Every mutation publishes the store revision on a watch channel so a view
/// can re-render.
pub struct Dashboard<B: Backend> {
    backend: Arc<B>,
    store: SharedStore,
    buster: Arc<CacheBuster>,
    images: Arc<ImageResolver>,
    changes: Arc<watch::Sender<u64>>,
    history_limit: usize,
    exclude_overlay: bool,
}

impl<B: Backend> Clone for Dashboard<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            buster: Arc::clone(&self.buster),
            images: Arc::clone(&self.images),
            changes: Arc::clone(&self.changes),
            history_limit: self.history_limit,
            exclude_overlay: self.exclude_overlay,
        }
    }
}

/// Counts a command as in flight until dropped, so background config merges hold off.
struct InFlight {
    store: SharedStore,
}

impl InFlight {
    fn begin(store: &SharedStore) -> Self {
        lock(store).begin_command();
        Self {
            store: Arc::clone(store),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.store).end_command();
    }
}

impl<B: Backend> Dashboard<B> {
    pub fn new(backend: B, config: &ClientConfig) -> Result<Self, DashboardError> {
        let images = ImageResolver::new(config.image_base_url.as_deref())?;
        let (changes, _) = watch::channel(0);
        Ok(Self {
            backend: Arc::new(backend),
            store: Arc::new(Mutex::new(StateStore::new())),
            buster: Arc::new(CacheBuster::new()),
            images: Arc::new(images),
            changes: Arc::new(changes),
            history_limit: config.history_limit,
            exclude_overlay: config.exclude_overlay,
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Receives the store revision after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn view(&self) -> DashboardView {
        DashboardView::from_store(&lock(&self.store), &self.images)
    }

    fn notify(&self) {
        let revision = lock(&self.store).revision();
        self.changes.send_replace(revision);
    }

    fn report(&self, kind: NoticeKind, err: &DashboardError) {
        warn!("{:?} failed: {}", kind, err);
        lock(&self.store).set_notice(kind, err.to_string());
        self.notify();
    }

    /// Fetch status, history and mask and apply them together.
    /// If any of the three fails, none is applied and a poll notice is raised.
    pub async fn refresh_fast(&self) -> Result<(), DashboardError> {
        let read = lock(&self.store).begin_fast_read();
        let (status, history, mask) = tokio::join!(
            self.backend.fetch_status(),
            self.backend
                .fetch_history(self.history_limit, self.exclude_overlay),
            self.backend.fetch_mask(),
        );

        let snapshot = match (status, history, mask) {
            (Ok(status), Ok(history), Ok(mask)) => (status, history, mask),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.report(NoticeKind::Poll, &e);
                return Err(e);
            }
        };

        let token = self.buster.next_token();
        let (status, history, mask) = snapshot;
        let mask = match mask {
            Some(_) => MaskAsset::Present {
                url: with_token(&self.backend.mask_url(), token),
            },
            None => MaskAsset::Absent,
        };
        let applied = lock(&self.store).apply_fast_read(
            read,
            FastSnapshot {
                status,
                history,
                mask,
            },
            token,
        );
        if applied {
            self.notify();
        }
        Ok(())
    }

    /// Background config read. A no-op on the buffer while it is dirty.
    pub async fn refresh_config(&self) -> Result<MergeOutcome, DashboardError> {
        self.merge_server_config(false).await
    }

    /// Explicit reload: discard local edits and take the server copy.
    pub async fn reload_config(&self) -> Result<(), DashboardError> {
        self.merge_server_config(true).await.map(|_| ())
    }

    async fn merge_server_config(&self, force: bool) -> Result<MergeOutcome, DashboardError> {
        let read = lock(&self.store).begin_config_read();
        match self.backend.fetch_config().await {
            Ok(config) => {
                let outcome = lock(&self.store).merge_config_read(read, config, force);
                if force {
                    info!("Config resynced from server");
                }
                self.notify();
                Ok(outcome)
            }
            Err(e) => {
                self.report(NoticeKind::Poll, &e);
                Err(e)
            }
        }
    }

    /// Full forced resynchronization: fast path plus a forced config merge.
    pub async fn resync(&self) -> Result<(), DashboardError> {
        let (fast, config) = tokio::join!(self.refresh_fast(), self.reload_config());
        fast.and(config)
    }

    /// Set one field from the UI. The buffer is dirty when this returns.
    pub fn edit(&self, field: ConfigField, value: FieldValue) -> Result<(), DashboardError> {
        let result = lock(&self.store).edit(field, value);
        self.notify();
        result
    }

    /// Set one field from raw text.
    /// Returns `Ok(false)` when a numeric input was unusable and left out of the next save.
    pub fn edit_input(&self, field: ConfigField, raw: &str) -> Result<bool, DashboardError> {
        let result = match parse_input(field, raw) {
            Ok(value) => lock(&self.store).edit(field, value).map(|_| true),
            Err(DashboardError::ValidationSkip { .. }) => {
                lock(&self.store).mark_skipped(field).map(|_| false)
            }
            Err(e) => Err(e),
        };
        self.notify();
        result
    }

    /// Write the buffer (minus skipped inputs) and take the saved server copy.
    /// Once the write lands the save is `Ok`; a failed follow-up resync only raises a poll notice.
    pub async fn save_config(&self) -> Result<(), DashboardError> {
        let patch = lock(&self.store).save_payload()?;
        if let Err(e) = self.backend.write_config(&patch).await {
            self.report(NoticeKind::Save, &e);
            return Err(e);
        }
        info!("Config saved");
        {
            let mut state = lock(&self.store);
            state.clear_notice(NoticeKind::Save);
            state.set_image_token(self.buster.next_token());
        }
        self.notify();
        if let Err(e) = self.resync().await {
            warn!("Resync after save failed: {}", e);
        }
        Ok(())
    }

    /// Run a control command optimistically, then always force a resync.
    pub async fn execute(&self, command: Command) -> Result<(), DashboardError> {
        let _in_flight = InFlight::begin(&self.store);
        let result = run_optimistic(&self.store, command, self.backend.as_ref()).await;
        self.notify();
        if let Err(e) = self.resync().await {
            warn!("Resync after '{}' failed: {}", command, e);
        }
        result
    }

    pub async fn reset_alarm(&self) -> Result<(), DashboardError> {
        self.execute(Command::ResetAlarm).await
    }

    /// Read a mask image from disk and upload it.
    pub async fn upload_mask_file(&self, path: &Path) -> Result<(), DashboardError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            DashboardError::Mask(format!("Failed to read {}: {}", path.display(), e))
        });
        match bytes {
            Ok(bytes) => self.upload_mask(&bytes).await,
            Err(e) => {
                self.report(NoticeKind::Mask, &e);
                Err(e)
            }
        }
    }

    /// Normalize and upload a mask. On success the preview URL gets a new token.
    pub async fn upload_mask(&self, bytes: &[u8]) -> Result<(), DashboardError> {
        let png = match prepare_mask(bytes) {
            Ok(png) => png,
            Err(e) => {
                let err = DashboardError::Mask(e);
                self.report(NoticeKind::Mask, &err);
                return Err(err);
            }
        };
        if let Err(e) = self.backend.upload_mask("mask.png", png).await {
            self.report(NoticeKind::Mask, &e);
            return Err(e);
        }

        let token = self.buster.next_token();
        {
            let mut state = lock(&self.store);
            state.clear_notice(NoticeKind::Mask);
            state.set_mask(
                MaskAsset::Present {
                    url: with_token(&self.backend.mask_url(), token),
                },
                token,
            );
        }
        self.notify();
        Ok(())
    }

    /// Delete the mask. On success the reference is absent.
    pub async fn reset_mask(&self) -> Result<(), DashboardError> {
        if let Err(e) = self.backend.delete_mask().await {
            self.report(NoticeKind::Mask, &e);
            return Err(e);
        }
        {
            let mut state = lock(&self.store);
            state.clear_notice(NoticeKind::Mask);
            state.set_mask(MaskAsset::Absent, self.buster.next_token());
        }
        self.notify();
        Ok(())
    }

    /// Allow-listed configuration as JSON.
    pub fn export_config(&self) -> Result<String, DashboardError> {
        let state = lock(&self.store);
        let config = state
            .config()
            .ok_or_else(|| DashboardError::Config("Configuration not loaded yet".to_string()))?;
        transfer::export_config(config)
    }

    pub async fn export_config_to(&self, path: &Path) -> Result<(), DashboardError> {
        let json = self.export_config()?;
        tokio::fs::write(path, json).await.map_err(|e| {
            let err = DashboardError::Import(format!("Failed to write {}: {}", path.display(), e));
            self.report(NoticeKind::Transfer, &err);
            err
        })?;
        info!("Exported config to {}", path.display());
        Ok(())
    }

    /// Apply an exported document through a config write, then force a resync.
    pub async fn import_config(&self, raw: &str) -> Result<(), DashboardError> {
        let patch = match transfer::import_config(raw) {
            Ok(patch) => patch,
            Err(e) => {
                self.report(NoticeKind::Transfer, &e);
                return Err(e);
            }
        };
        if patch.is_empty() {
            info!("Import carried no recognised settings");
            return Ok(());
        }
        if let Err(e) = self.backend.write_config(&patch).await {
            self.report(NoticeKind::Transfer, &e);
            return Err(e);
        }
        info!("Config imported");
        {
            let mut state = lock(&self.store);
            state.clear_notice(NoticeKind::Transfer);
            state.set_image_token(self.buster.next_token());
        }
        self.notify();
        if let Err(e) = self.resync().await {
            warn!("Resync after import failed: {}", e);
        }
        Ok(())
    }

    pub async fn import_config_from(&self, path: &Path) -> Result<(), DashboardError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            let err = DashboardError::Import(format!("Failed to read {}: {}", path.display(), e));
            self.report(NoticeKind::Transfer, &err);
            err
        })?;
        self.import_config(&raw).await
    }

    pub async fn health(&self) -> Result<HealthReport, DashboardError> {
        self.backend.fetch_health().await
    }
}
