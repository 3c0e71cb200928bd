use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio::select;
use tracing::{debug, info, warn};

use crate::dashboard::Dashboard;
use crate::transport::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    /// One fast-path refresh outside the regular cadence.
    RefreshNow,
}

/// Cloneable sender for manual refreshes. Does not keep the poller alive.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    sender: mpsc::Sender<PollCommand>,
}

impl RefreshHandle {
    pub async fn refresh_now(&self) -> Result<(), String> {
        self.sender
            .send(PollCommand::RefreshNow)
            .await
            .map_err(|_| "Poller is not running".to_string())
    }
}

/// Owns the two polling tasks. Dropping the handle stops them.
pub struct PollerHandle {
    refresh: RefreshHandle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    pub async fn refresh_now(&self) -> Result<(), String> {
        self.refresh.refresh_now().await
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    /// Stop scheduling ticks and wait for both loops to exit.
    /// A poll already in flight is allowed to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Poll task ended abnormally: {}", e);
            }
        }
        info!("Poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

pub struct Poller;

impl Poller {
    /// Start the fast loop (status, history, mask) and the config loop.
    /// The first tick of each fires immediately, which doubles as the initial load.
    pub fn spawn<B: Backend>(
        dashboard: Dashboard<B>,
        fast_interval: Duration,
        config_interval: Duration,
    ) -> PollerHandle {
        let (sender, receiver) = mpsc::channel(4);
        let (shutdown, _) = watch::channel(false);

        info!(
            "Starting poller (fast: {:?}, config: {:?})",
            fast_interval, config_interval
        );
        let fast = tokio::spawn(run_fast_loop(
            dashboard.clone(),
            fast_interval,
            receiver,
            shutdown.subscribe(),
        ));
        let config = tokio::spawn(run_config_loop(
            dashboard,
            config_interval,
            shutdown.subscribe(),
        ));

        PollerHandle {
            refresh: RefreshHandle { sender },
            shutdown,
            tasks: vec![fast, config],
        }
    }
}

async fn run_fast_loop<B: Backend>(
    dashboard: Dashboard<B>,
    period: Duration,
    mut receiver: mpsc::Receiver<PollCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = dashboard.refresh_fast().await {
                    debug!("Fast poll failed, keeping last snapshot: {}", e);
                }
            }
            cmd = receiver.recv() => {
                match cmd {
                    Some(PollCommand::RefreshNow) => {
                        info!("Manual refresh requested");
                        if let Err(e) = dashboard.refresh_fast().await {
                            warn!("Manual refresh failed: {}", e);
                        }
                    }
                    None => {
                        warn!("Poll command channel closed; stopping fast loop");
                        break;
                    }
                }
            }
        }
    }
}

async fn run_config_loop<B: Backend>(
    dashboard: Dashboard<B>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = dashboard.refresh_config().await {
                    debug!("Config poll failed, keeping buffer: {}", e);
                }
            }
        }
    }
}
