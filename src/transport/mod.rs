//! Backend contract. Every call the dashboard makes goes through [`Backend`];
//! failures come back as [`DashboardError::Network`] and a missing mask as `Ok(None)`.

pub mod http_client;

use std::future::Future;

use crate::error::DashboardError;
use crate::state::{ConfigPatch, Configuration, ControlRequest, HealthReport, HistoryEntry, StatusSnapshot};

pub use http_client::HttpTransport;

pub trait Backend: Send + Sync + 'static {
    /// `GET /api/dashboard`
    fn fetch_status(&self) -> impl Future<Output = Result<StatusSnapshot, DashboardError>> + Send;

    /// `GET /api/history?limit=N&exclude_overlay=bool`
    fn fetch_history(
        &self,
        limit: usize,
        exclude_overlay: bool,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, DashboardError>> + Send;

    /// `GET /api/config`
    fn fetch_config(&self) -> impl Future<Output = Result<Configuration, DashboardError>> + Send;

    /// `POST /api/config` with a partial settings object.
    fn write_config(
        &self,
        patch: &ConfigPatch,
    ) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// `POST /api/control`
    fn send_control(
        &self,
        request: &ControlRequest,
    ) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// `GET /api/mask-image`. A 404 is `Ok(None)`: no mask is set.
    fn fetch_mask(&self) -> impl Future<Output = Result<Option<Vec<u8>>, DashboardError>> + Send;

    /// `POST /api/mask-image` as a multipart upload.
    fn upload_mask(
        &self,
        file_name: &str,
        png: Vec<u8>,
    ) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// `DELETE /api/mask-image`
    fn delete_mask(&self) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// `GET /health`
    fn fetch_health(&self) -> impl Future<Output = Result<HealthReport, DashboardError>> + Send;

    /// Absolute URL of the mask preview, without a cache token.
    fn mask_url(&self) -> String;
}
