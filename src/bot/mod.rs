//! Task orchestration.
//!
//! Starts the collector, renewal, and strategy tasks against the
//! shared client and state, and propagates shutdown: the watch signal
//! is observed at every task's next suspension point, and an in-flight
//! API call is allowed to complete so its result can be applied or
//! cleanly discarded.

pub mod collector;
pub mod renewal;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::api::ApiClient;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::state::SharedFarmState;
use crate::strategy::policy::StrategyPolicy;
use crate::strategy::StrategyTask;

use collector::CollectorTask;
use renewal::RenewalTask;

/// Owns the three maintenance/decision tasks and their lifecycles.
pub struct FarmBot {
    config: Config,
    api: Arc<ApiClient>,
    state: SharedFarmState,
    policy: Arc<dyn StrategyPolicy>,
    dashboard: Arc<Dashboard>,
}

impl FarmBot {
    pub fn new(
        config: Config,
        api: Arc<ApiClient>,
        state: SharedFarmState,
        policy: Arc<dyn StrategyPolicy>,
        dashboard: Arc<Dashboard>,
    ) -> Self {
        Self {
            config,
            api,
            state,
            policy,
            dashboard,
        }
    }

    /// Run until Ctrl-C. Authentication failure here is fatal; once the
    /// tasks are running, nothing short of shutdown stops them.
    pub async fn run(self) -> Result<()> {
        self.api
            .authenticate()
            .await
            .context("initial authentication failed")?;
        tracing::info!("Authenticated, starting tasks");

        // seed the local view before the loops start deciding
        if let Err(e) = self.api.profile().await {
            tracing::warn!("initial profile fetch failed ({}): {}", e.kind, e.message);
        }
        if let Err(e) = self.api.land().await {
            tracing::warn!("initial land fetch failed ({}): {}", e.kind, e.message);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let collector = tokio::spawn(
            CollectorTask::new(
                self.api.clone(),
                self.dashboard.clone(),
                self.config.collect_interval(),
                shutdown_rx.clone(),
            )
            .run(),
        );
        let renewal = tokio::spawn(
            RenewalTask::new(
                self.api.clone(),
                self.config.renewal_check_interval(),
                shutdown_rx.clone(),
            )
            .run(),
        );
        let strategy = tokio::spawn(
            StrategyTask::new(
                &self.config,
                self.api.clone(),
                self.state.clone(),
                self.policy.clone(),
                self.dashboard.clone(),
                shutdown_rx.clone(),
            )
            .run(),
        );
        let dashboard = tokio::spawn(
            self.dashboard
                .clone()
                .run(self.config.dashboard_interval(), shutdown_rx),
        );

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::info!("Shutdown requested, stopping tasks");
        let _ = shutdown_tx.send(true);

        let _ = tokio::join!(collector, renewal, strategy, dashboard);
        self.dashboard.render().await;
        tracing::info!("All tasks stopped");
        Ok(())
    }
}
