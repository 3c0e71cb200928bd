use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use url::Url;

use super::Backend;
use crate::error::DashboardError;
use crate::settings::ClientConfig;
use crate::state::types::{ConfigResponse, HistoryResponse};
use crate::state::{
    ConfigPatch, Configuration, ControlRequest, HealthReport, HistoryEntry, StatusSnapshot,
};

/// reqwest-backed transport for the detection service API.
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    /// Build a transport from client settings.
    /// Only applies a request timeout when one is configured.
    pub fn new(config: &ClientConfig) -> Result<Self, DashboardError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DashboardError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: normalize_base(&config.base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        // `base` always ends in '/', and `path` is one of our relative constants
        self.base.join(path).unwrap_or_else(|_| self.base.clone())
    }

    fn history_url(&self, limit: usize, exclude_overlay: bool) -> Url {
        let mut url = self.endpoint("api/history");
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("exclude_overlay", if exclude_overlay { "true" } else { "false" });
        url
    }
}

/// Parse the base URL and make sure its path ends in '/', so joins keep any prefix.
fn normalize_base(raw: &str) -> Result<Url, DashboardError> {
    let mut base = Url::parse(raw)
        .map_err(|e| DashboardError::Config(format!("Invalid base_url '{}': {}", raw, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Turn a non-2xx response into a network error.
fn check_status(call: &'static str, response: Response) -> Result<Response, DashboardError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    warn!("{} returned HTTP {}", call, status.as_u16());
    Err(DashboardError::network(
        call,
        format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    ))
}

async fn read_json<T: DeserializeOwned>(
    call: &'static str,
    response: Response,
) -> Result<T, DashboardError> {
    check_status(call, response)?
        .json::<T>()
        .await
        .map_err(|e| DashboardError::network(call, format!("invalid JSON: {}", e)))
}

impl Backend for HttpTransport {
    async fn fetch_status(&self) -> Result<StatusSnapshot, DashboardError> {
        let url = self.endpoint("api/dashboard");
        info!("Fetching status: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("status", e))?;
        read_json("status", response).await
    }

    async fn fetch_history(
        &self,
        limit: usize,
        exclude_overlay: bool,
    ) -> Result<Vec<HistoryEntry>, DashboardError> {
        let url = self.history_url(limit, exclude_overlay);
        info!("Fetching history: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("history", e))?;
        let body: HistoryResponse = read_json("history", response).await?;
        Ok(body.images)
    }

    async fn fetch_config(&self) -> Result<Configuration, DashboardError> {
        let url = self.endpoint("api/config");
        info!("Fetching config: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("config read", e))?;
        let body: ConfigResponse = read_json("config read", response).await?;
        Ok(body.settings)
    }

    async fn write_config(&self, patch: &ConfigPatch) -> Result<(), DashboardError> {
        let url = self.endpoint("api/config");
        info!("Writing config: {}", url);
        let response = self
            .client
            .post(url)
            .json(patch)
            .send()
            .await
            .map_err(|e| DashboardError::network("config write", e))?;
        check_status("config write", response)?;
        Ok(())
    }

    async fn send_control(&self, request: &ControlRequest) -> Result<(), DashboardError> {
        let url = self.endpoint("api/control");
        info!("Sending control: {:?}", request);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| DashboardError::network("control", e))?;
        check_status("control", response)?;
        Ok(())
    }

    async fn fetch_mask(&self) -> Result<Option<Vec<u8>>, DashboardError> {
        let url = self.endpoint("api/mask-image");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("mask read", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = check_status("mask read", response)?
            .bytes()
            .await
            .map_err(|e| DashboardError::network("mask read", e))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn upload_mask(&self, file_name: &str, png: Vec<u8>) -> Result<(), DashboardError> {
        let url = self.endpoint("api/mask-image");
        info!("Uploading mask {} ({} bytes)", file_name, png.len());
        let part = Part::bytes(png)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .map_err(|e| DashboardError::network("mask write", e))?;
        let response = self
            .client
            .post(url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| DashboardError::network("mask write", e))?;
        check_status("mask write", response)?;
        Ok(())
    }

    async fn delete_mask(&self) -> Result<(), DashboardError> {
        let url = self.endpoint("api/mask-image");
        info!("Deleting mask: {}", url);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("mask delete", e))?;
        check_status("mask delete", response)?;
        Ok(())
    }

    async fn fetch_health(&self) -> Result<HealthReport, DashboardError> {
        let url = self.endpoint("health");
        info!("Fetching health: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DashboardError::network("health", e))?;
        read_json("health", response).await
    }

    fn mask_url(&self) -> String {
        self.endpoint("api/mask-image").to_string()
    }
}
