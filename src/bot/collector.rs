//! Water collection loop.
//!
//! Collecting before the server interval elapses forfeits a penalty;
//! collecting late only loses idle time. The schedule therefore
//! anchors to the last *successful* collection rather than wall-clock
//! ticks: a cycle delayed behind a retry never causes a burst of
//! early, penalized calls afterward.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::api::ApiClient;
use crate::dashboard::Dashboard;
use crate::strategy::StrategyDecision;

/// Next attempt after a success: never earlier than `last_success +
/// period`; if that moment already passed, fire immediately exactly
/// once (the caller re-anchors from the new success time).
pub(crate) fn schedule_after_success(
    last_success: Instant,
    period: Duration,
    now: Instant,
) -> Instant {
    let due = last_success + period;
    if due > now {
        due
    } else {
        now
    }
}

/// Next attempt after a failure: the next tick on the last-success
/// grid strictly after `now`, so a failed call is deferred instead of
/// retried into the penalty window.
pub(crate) fn schedule_after_failure(
    last_success: Instant,
    period: Duration,
    now: Instant,
) -> Instant {
    let mut due = last_success + period;
    while due <= now {
        due += period;
    }
    due
}

/// Fixed-period collection task.
pub struct CollectorTask {
    api: Arc<ApiClient>,
    dashboard: Arc<Dashboard>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl CollectorTask {
    pub fn new(
        api: Arc<ApiClient>,
        dashboard: Arc<Dashboard>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            dashboard,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Collector task started (period {:?})", self.period);
        let mut last_success: Option<Instant> = None;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let attempt_at = Instant::now();
            let next = match self.api.collect_water().await {
                Ok(response) => {
                    let succeeded_at = Instant::now();
                    last_success = Some(succeeded_at);
                    self.dashboard.record_collection().await;
                    self.dashboard
                        .record_decision(StrategyDecision::CollectWater.to_string())
                        .await;
                    tracing::info!("Water collected, total {}", response.score);
                    schedule_after_success(succeeded_at, self.period, Instant::now())
                }
                Err(e) => {
                    tracing::warn!("Water collection failed ({}): {}", e.kind, e.message);
                    let anchor = last_success.unwrap_or(attempt_at);
                    schedule_after_failure(anchor, self.period, Instant::now())
                }
            };

            tokio::select! {
                _ = tokio::time::sleep_until(next) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        tracing::info!("Collector task stopped");
    }
}
