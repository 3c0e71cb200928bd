pub mod alarm;
pub mod cache_buster;
pub mod command;
pub mod console;
pub mod dashboard;
pub mod error;
pub mod form;
pub mod mask;
pub mod poller;
pub mod settings;
pub mod state;
pub mod transfer;
pub mod transport;
pub mod view;

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use dashboard::Dashboard;
use poller::Poller;
use settings::ClientConfig;
use transport::HttpTransport;

/// Logs go to stderr so they do not interleave with the dashboard on stdout.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn config_arg() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config needs a path")?;
                path = Some(PathBuf::from(value));
            }
            other => bail!("Unknown argument '{}'. Usage: snowjam-dashboard [--config <path>]", other),
        }
    }
    Ok(path)
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let path = config_arg()?;
    let config = ClientConfig::load(path.as_deref())?;
    info!("Dashboard connecting to {}", config.base_url);

    let transport = HttpTransport::new(&config)?;
    let dashboard = Dashboard::new(transport, &config)?;
    let poller = Poller::spawn(
        dashboard.clone(),
        config.fast_interval(),
        config.config_interval(),
    );

    let result = console::run_console(dashboard, &poller).await;
    poller.shutdown().await;
    result
}
