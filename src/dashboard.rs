//! Read-only presentation layer.
//!
//! Receives farm/market snapshots and recent decisions from the core
//! and renders a periodic status summary through the logging channel.
//! It has no write access back into the core.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};

use crate::market::MarketSnapshot;
use crate::state::SharedFarmState;

const RECENT_DECISIONS: usize = 12;

/// Counters for the current session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub water_collections: u64,
    pub crops_planted: u64,
    pub crops_harvested: u64,
    pub land_expansions: u64,
    pub credits_earned: f64,
    pub started_at: DateTime<Utc>,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            water_collections: 0,
            crops_planted: 0,
            crops_harvested: 0,
            land_expansions: 0,
            credits_earned: 0.0,
            started_at: Utc::now(),
        }
    }
}

/// Collects read-only views for display.
pub struct Dashboard {
    state: SharedFarmState,
    stats: Mutex<SessionStats>,
    market: RwLock<Option<MarketSnapshot>>,
    recent: Mutex<VecDeque<(DateTime<Utc>, String)>>,
}

impl Dashboard {
    pub fn new(state: SharedFarmState) -> Arc<Self> {
        Arc::new(Self {
            state,
            stats: Mutex::new(SessionStats::new()),
            market: RwLock::new(None),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_DECISIONS)),
        })
    }

    pub async fn publish_market(&self, market: MarketSnapshot) {
        *self.market.write().await = Some(market);
    }

    pub async fn record_decision(&self, label: String) {
        let mut recent = self.recent.lock().await;
        if recent.len() == RECENT_DECISIONS {
            recent.pop_front();
        }
        recent.push_back((Utc::now(), label));
    }

    pub async fn record_collection(&self) {
        self.stats.lock().await.water_collections += 1;
    }

    pub async fn record_planting(&self) {
        self.stats.lock().await.crops_planted += 1;
    }

    pub async fn record_harvest(&self, credits: f64) {
        let mut stats = self.stats.lock().await;
        stats.crops_harvested += 1;
        stats.credits_earned += credits;
    }

    pub async fn record_expansion(&self) {
        self.stats.lock().await.land_expansions += 1;
    }

    pub async fn stats(&self) -> SessionStats {
        self.stats.lock().await.clone()
    }

    /// Log a one-screen status summary.
    pub async fn render(&self) {
        let farm = self.state.snapshot().await;
        let stats = self.stats().await;
        let runtime = Utc::now() - stats.started_at;

        tracing::info!(
            "Farm: {} water / {} cap, {:.2} credits, land {}x{} ({} plots, {} empty)",
            farm.water,
            farm.capacity,
            farm.credits,
            farm.land_size.0,
            farm.land_size.1,
            farm.plots.len(),
            farm.empty_plot_indices().len(),
        );
        tracing::info!(
            "Session: {} collections, {} planted, {} harvested, {} expansions, {:.2} credits earned in {}m",
            stats.water_collections,
            stats.crops_planted,
            stats.crops_harvested,
            stats.land_expansions,
            stats.credits_earned,
            runtime.num_minutes(),
        );

        if let Some(market) = self.market.read().await.as_ref() {
            let top: Vec<String> = market
                .top_by_efficiency(3)
                .iter()
                .map(|c| format!("{} ({:.2}cr, eff {:.3})", c.name, c.market_price, c.efficiency))
                .collect();
            tracing::info!(
                "Market: avg price {:.2}, top crops: {}",
                market.average_price,
                top.join(", ")
            );
        }

        let recent = self.recent.lock().await;
        if let Some((at, label)) = recent.back() {
            tracing::info!("Last decision at {}: {}", at.format("%H:%M:%S"), label);
        }
    }

    /// Periodic render loop, shutdown-aware like every other task.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => self.render().await,
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FarmState;

    #[tokio::test]
    async fn decision_log_is_bounded() {
        let dashboard = Dashboard::new(FarmState::new(1024));
        for i in 0..(RECENT_DECISIONS + 5) {
            dashboard.record_decision(format!("decision {i}")).await;
        }
        let recent = dashboard.recent.lock().await;
        assert_eq!(recent.len(), RECENT_DECISIONS);
        assert_eq!(recent.front().unwrap().1, "decision 5");
    }

    #[tokio::test]
    async fn stats_accumulate() {
        let dashboard = Dashboard::new(FarmState::new(1024));
        dashboard.record_collection().await;
        dashboard.record_harvest(0.3).await;
        dashboard.record_harvest(0.2).await;

        let stats = dashboard.stats().await;
        assert_eq!(stats.water_collections, 1);
        assert_eq!(stats.crops_harvested, 2);
        assert!((stats.credits_earned - 0.5).abs() < 1e-9);
    }
}
