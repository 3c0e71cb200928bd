use std::fmt::Write;

use url::Url;

use crate::cache_buster::with_token;
use crate::error::DashboardError;
use crate::state::{AlarmState, ConfigField, Configuration, Notice, StateStore};

/// Maps server image paths to something the operator can open.
#[derive(Debug, Clone, Default)]
pub struct ImageResolver {
    base: Option<Url>,
}

impl ImageResolver {
    pub fn new(base: Option<&str>) -> Result<Self, DashboardError> {
        let base = match base {
            Some(raw) => {
                let mut url = Url::parse(raw).map_err(|e| {
                    DashboardError::Config(format!("Invalid image_base_url '{}': {}", raw, e))
                })?;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Some(url)
            }
            None => None,
        };
        Ok(Self { base })
    }

    /// Absolute URLs pass through; paths are joined onto the base, or shown verbatim without one.
    pub fn resolve(&self, path: &str) -> String {
        if Url::parse(path).is_ok() {
            return path.to_string();
        }
        match &self.base {
            Some(base) => base
                .join(path.trim_start_matches('/'))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| path.to_string()),
            None => path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub url: String,
    pub modified: Option<String>,
}

/// Everything the dashboard renders, projected from the store at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub latest_image: Option<String>,
    pub previous_image: Option<String>,
    /// Detection overlay, cache-busted with the latest image token.
    pub overlay_image: Option<String>,
    pub mask_preview: Option<String>,
    pub latest_timestamp: Option<String>,
    pub previous_timestamp: Option<String>,
    pub detection_rate: f64,
    pub threshold: f64,
    pub alarm_state: AlarmState,
    pub delay_warning: bool,
    pub alarm_banner: bool,
    pub notice: Option<Notice>,
    pub logs: Vec<String>,
    pub history: Vec<HistoryItem>,
    pub config: Option<Configuration>,
    pub dirty: bool,
    pub skipped: Vec<ConfigField>,
}

impl DashboardView {
    pub fn from_store(store: &StateStore, images: &ImageResolver) -> Self {
        let status = store.status();
        let token = store.image_token();
        let image = |path: Option<&String>| path.map(|p| images.resolve(p));

        Self {
            latest_image: image(status.and_then(|s| s.latest_image.as_ref())),
            previous_image: image(status.and_then(|s| s.previous_image.as_ref())),
            overlay_image: status
                .and_then(|s| s.mask_overlay.as_ref())
                .map(|p| {
                    let url = images.resolve(p);
                    match token {
                        Some(t) => with_token(&url, t),
                        None => url,
                    }
                }),
            mask_preview: store.mask().url().map(str::to_string),
            latest_timestamp: status.and_then(|s| s.latest_timestamp.clone()),
            previous_timestamp: status.and_then(|s| s.previous_timestamp.clone()),
            detection_rate: status.map(|s| s.detection_rate).unwrap_or_default(),
            threshold: status.map(|s| s.threshold).unwrap_or_default(),
            alarm_state: status.map(|s| s.alarm_state.clone()).unwrap_or_default(),
            delay_warning: status.is_some_and(|s| s.delay_warning),
            alarm_banner: store.banner_visible(),
            notice: store.notice().cloned(),
            logs: status.map(|s| s.logs.clone()).unwrap_or_default(),
            history: store
                .history()
                .iter()
                .map(|entry| HistoryItem {
                    url: images.resolve(&entry.path),
                    modified: entry
                        .modified_at()
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .or_else(|| entry.mtime.clone()),
                })
                .collect(),
            config: store.config().cloned(),
            dirty: store.is_dirty(),
            skipped: store.skipped_fields().collect(),
        }
    }

    /// Plain-text rendering for the terminal view.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        if self.alarm_banner {
            let _ = writeln!(out, "!!! ALARM: detection rate above threshold. Type 'reset' to acknowledge !!!");
        }
        if let Some(notice) = &self.notice {
            let _ = writeln!(out, "[{:?}] {}", notice.kind, notice.message);
        }

        let _ = writeln!(
            out,
            "State: {}  Rate: {:.3}  Threshold: {:.3}{}",
            self.alarm_state,
            self.detection_rate,
            self.threshold,
            if self.delay_warning { "  DELAYED" } else { "" }
        );
        let _ = writeln!(
            out,
            "Latest:   {} ({})",
            self.latest_image.as_deref().unwrap_or("-"),
            self.latest_timestamp.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "Previous: {} ({})",
            self.previous_image.as_deref().unwrap_or("-"),
            self.previous_timestamp.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out, "Overlay:  {}", self.overlay_image.as_deref().unwrap_or("-"));
        let _ = writeln!(out, "Mask:     {}", self.mask_preview.as_deref().unwrap_or("none"));

        if let Some(config) = &self.config {
            let _ = writeln!(
                out,
                "Config{}:",
                if self.dirty { " (unsaved changes)" } else { "" }
            );
            for field in ConfigField::ALL {
                let value = match field {
                    // Secrets are never echoed
                    ConfigField::SlackBotToken | ConfigField::SlackWebhookUrl => {
                        if config.get(field).to_string().is_empty() {
                            "unset".to_string()
                        } else {
                            "set".to_string()
                        }
                    }
                    _ => config.get(field).to_string(),
                };
                let skipped = if self.skipped.contains(&field) {
                    "  (invalid input, not saved)"
                } else {
                    ""
                };
                let _ = writeln!(out, "  {:<24} {}{}", field.name(), value, skipped);
            }
        } else {
            let _ = writeln!(out, "Config: loading...");
        }

        if !self.history.is_empty() {
            let _ = writeln!(out, "History:");
            for item in &self.history {
                let _ = writeln!(
                    out,
                    "  {}  {}",
                    item.modified.as_deref().unwrap_or("-"),
                    item.url
                );
            }
        }
        for line in &self.logs {
            let _ = writeln!(out, "  > {}", line);
        }
        out
    }
}
