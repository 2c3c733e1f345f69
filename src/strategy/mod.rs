//! Strategy task: the periodic decide-and-act loop.
//!
//! Each cycle takes a consistent farm snapshot and a fresh market view,
//! asks the policy for the best move, and executes exactly one action
//! class: harvesting (batched across matured plots), land
//! claim/expansion, planting, or waiting. Decisions always derive from
//! a just-fetched snapshot, never from state another task mutated
//! mid-cycle.

pub mod policy;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::market::{CropInfo, MarketSnapshot};
use crate::state::{FarmSnapshot, SharedFarmState};

use policy::StrategyPolicy;

/// One action the policy decided on.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyDecision {
    CollectWater,
    PlantCrop { plot: usize, crop_type: String },
    Harvest { plot: usize },
    ExpandLand,
    Wait,
}

impl fmt::Display for StrategyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyDecision::CollectWater => write!(f, "collect water"),
            StrategyDecision::PlantCrop { plot, crop_type } => {
                write!(f, "plant {crop_type} on plot {plot}")
            }
            StrategyDecision::Harvest { plot } => write!(f, "harvest plot {plot}"),
            StrategyDecision::ExpandLand => write!(f, "expand land"),
            StrategyDecision::Wait => write!(f, "wait"),
        }
    }
}

/// Decide this cycle's actions. Priority is fixed: a safe harvest is
/// never deferred, expansion outranks planting, and nothing is bought
/// below the reserve.
pub fn decide(
    policy: &dyn StrategyPolicy,
    farm: &FarmSnapshot,
    market: &MarketSnapshot,
    now: DateTime<Utc>,
) -> Vec<StrategyDecision> {
    let mature = farm.mature_plot_indices(now);
    if !mature.is_empty() {
        return mature
            .into_iter()
            .map(|plot| StrategyDecision::Harvest { plot })
            .collect();
    }

    if policy.should_expand(farm, market) {
        return vec![StrategyDecision::ExpandLand];
    }

    if let Some((plot, crop)) = pick_planting(policy, farm, market) {
        return vec![StrategyDecision::PlantCrop {
            plot,
            crop_type: crop.crop_type.clone(),
        }];
    }

    vec![StrategyDecision::Wait]
}

/// The highest-scoring crop that fits within (water - reserve), paired
/// with the first empty plot. `None` when nothing affordable fits: the
/// cycle waits rather than spending below the reserve.
pub fn pick_planting<'m>(
    policy: &dyn StrategyPolicy,
    farm: &FarmSnapshot,
    market: &'m MarketSnapshot,
) -> Option<(usize, &'m CropInfo)> {
    let empties = farm.empty_plot_indices();
    let plot = *empties.first()?;

    let reserve = policy.reserve_threshold(empties.len(), farm.credits);
    let budget = farm.water.saturating_sub(reserve);

    let best = market
        .crops
        .iter()
        .filter(|c| c.water_cost <= budget)
        .max_by(|a, b| {
            policy
                .score_crop(a, market)
                .total_cmp(&policy.score_crop(b, market))
        })?;
    Some((plot, best))
}

/// Periodic strategy loop.
pub struct StrategyTask {
    api: Arc<ApiClient>,
    state: SharedFarmState,
    policy: Arc<dyn StrategyPolicy>,
    dashboard: Arc<Dashboard>,
    period: Duration,
    market_max_age: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StrategyTask {
    pub fn new(
        config: &Config,
        api: Arc<ApiClient>,
        state: SharedFarmState,
        policy: Arc<dyn StrategyPolicy>,
        dashboard: Arc<Dashboard>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            state,
            policy,
            dashboard,
            period: config.strategy_period(),
            market_max_age: config.market_refresh(),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Strategy task started (period {:?})", self.period);
        let mut market: Option<MarketSnapshot> = None;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.cycle(&mut market).await;

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        tracing::info!("Strategy task stopped");
    }

    async fn cycle(&self, market: &mut Option<MarketSnapshot>) {
        // refresh the server-confirmed view before deciding anything
        if let Err(e) = self.api.profile().await {
            tracing::warn!("profile refresh failed ({}): {}", e.kind, e.message);
            return;
        }
        if let Err(e) = self.api.land().await {
            tracing::warn!("land refresh failed ({}): {}", e.kind, e.message);
            return;
        }

        let now = Utc::now();
        let fresh = match market.as_ref() {
            Some(m) if !m.is_stale(self.market_max_age, now) => m.clone(),
            _ => match self.api.crops().await {
                Ok(m) => {
                    self.dashboard.publish_market(m.clone()).await;
                    *market = Some(m.clone());
                    m
                }
                Err(e) => {
                    tracing::warn!("market refresh failed ({}): {}", e.kind, e.message);
                    return;
                }
            },
        };

        let farm = self.state.snapshot().await;
        let decisions = decide(self.policy.as_ref(), &farm, &fresh, now);
        self.execute(decisions, &fresh).await;
    }

    async fn execute(&self, decisions: Vec<StrategyDecision>, market: &MarketSnapshot) {
        for decision in decisions {
            self.dashboard.record_decision(decision.to_string()).await;
            match &decision {
                StrategyDecision::Harvest { plot } => match self.api.harvest(*plot).await {
                    Ok(response) => {
                        tracing::info!(
                            "Harvested plot {plot} for {:.2} credits",
                            response.credits_earned
                        );
                        self.dashboard.record_harvest(response.credits_earned).await;
                    }
                    Err(e) => self.report_action_failure("harvest", &e),
                },
                StrategyDecision::ExpandLand => {
                    let claimed = self.state.snapshot().await.land_claimed;
                    let result = if claimed {
                        self.api.expand_land().await
                    } else {
                        self.api.claim_land().await
                    };
                    match result {
                        Ok(_) => {
                            tracing::info!("Land {}", if claimed { "expanded" } else { "claimed" });
                            self.dashboard.record_expansion().await;
                        }
                        Err(e) => self.report_action_failure("expansion", &e),
                    }
                }
                StrategyDecision::PlantCrop { plot, crop_type } => {
                    let Some(crop) = market.crops.iter().find(|c| &c.crop_type == crop_type)
                    else {
                        tracing::warn!("crop {crop_type} vanished from the market, waiting");
                        continue;
                    };
                    match self.api.plant(crop, *plot).await {
                        Ok(_) => {
                            tracing::info!(
                                "Planted {} on plot {plot} ({} water)",
                                crop.name,
                                crop.water_cost
                            );
                            self.dashboard.record_planting().await;
                        }
                        Err(e) => self.report_action_failure("planting", &e),
                    }
                }
                StrategyDecision::Wait => {
                    tracing::debug!("No profitable action this cycle, waiting");
                }
                StrategyDecision::CollectWater => {
                    // collection belongs to the collector task's schedule
                }
            }
        }
    }

    /// A rejection means the decision's preconditions no longer hold;
    /// the cycle falls back to waiting instead of crashing or retrying.
    fn report_action_failure(&self, action: &str, error: &ApiError) {
        if error.is_rejection() {
            tracing::warn!("{action} rejected, waiting for next cycle: {}", error.message);
        } else {
            tracing::warn!("{action} failed ({}): {}", error.kind, error.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategySettings;
    use crate::state::PlotState;
    use super::policy::ReferencePolicy;

    fn policy() -> ReferencePolicy {
        ReferencePolicy::new(StrategySettings::default(), 5)
    }

    fn crop(crop_type: &str, price: f64, water_cost: u32) -> CropInfo {
        CropInfo {
            id: 1,
            crop_type: crop_type.into(),
            name: crop_type.into(),
            market_price: price,
            grow_time_minutes: 20,
            water_cost,
            efficiency: 0.3,
        }
    }

    fn market(crops: Vec<CropInfo>) -> MarketSnapshot {
        let count = crops.len().max(1) as f64;
        let average_price = crops.iter().map(|c| c.market_price).sum::<f64>() / count;
        let average_efficiency = crops.iter().map(|c| c.efficiency).sum::<f64>() / count;
        MarketSnapshot {
            crops,
            average_price,
            average_efficiency,
            fetched_at: Utc::now(),
        }
    }

    fn farm_with_plots(water: u32, plots: Vec<PlotState>) -> FarmSnapshot {
        FarmSnapshot {
            water,
            capacity: 1024,
            credits: 100.0,
            land_claimed: true,
            land_size: (2, 2),
            next_expansion_cost: Some(200),
            plots,
        }
    }

    fn planted(index: usize, matured: bool) -> PlotState {
        let now = Utc::now();
        PlotState {
            index,
            crop: Some("herb".into()),
            planted_at: Some(now - chrono::Duration::minutes(30)),
            matures_at: Some(if matured {
                now - chrono::Duration::minutes(1)
            } else {
                now + chrono::Duration::minutes(10)
            }),
        }
    }

    fn empty(index: usize) -> PlotState {
        PlotState {
            index,
            ..Default::default()
        }
    }

    #[test]
    fn harvest_outranks_everything_and_batches() {
        let farm = farm_with_plots(500, vec![planted(0, true), planted(1, true), empty(2)]);
        let market = market(vec![crop("herb", 2.0, 5)]);

        let decisions = decide(&policy(), &farm, &market, Utc::now());
        assert_eq!(
            decisions,
            vec![
                StrategyDecision::Harvest { plot: 0 },
                StrategyDecision::Harvest { plot: 1 }
            ]
        );
    }

    #[test]
    fn planting_picks_highest_score_within_budget() {
        let farm = farm_with_plots(20, vec![empty(0), planted(1, false)]);
        // premium crop is unaffordable once the reserve is held back
        let market = market(vec![crop("herb", 2.0, 5), crop("melon", 6.0, 18)]);

        let (plot, picked) = pick_planting(&policy(), &farm, &market).unwrap();
        assert_eq!(plot, 0);
        assert_eq!(picked.crop_type, "herb");
    }

    #[test]
    fn never_spends_below_the_reserve() {
        // one empty plot, rich: the conservative reserve of 8 applies,
        // leaving 2 water, below every crop's cost
        let farm = farm_with_plots(10, vec![empty(0)]);
        let market = market(vec![crop("herb", 2.0, 5)]);

        assert!(pick_planting(&policy(), &farm, &market).is_none());
        let decisions = decide(&policy(), &farm, &market, Utc::now());
        assert_eq!(decisions, vec![StrategyDecision::Wait]);
    }

    #[test]
    fn unaffordable_market_waits() {
        let farm = farm_with_plots(6, vec![empty(0), empty(1), empty(2)]);
        let market = market(vec![crop("melon", 6.0, 18)]);

        let decisions = decide(&policy(), &farm, &market, Utc::now());
        assert_eq!(decisions, vec![StrategyDecision::Wait]);
    }

    #[test]
    fn unclaimed_land_claims_before_planting() {
        let farm = FarmSnapshot {
            water: 10,
            credits: 0.0,
            land_claimed: false,
            ..Default::default()
        };
        let market = market(vec![crop("herb", 2.0, 5)]);

        let decisions = decide(&policy(), &farm, &market, Utc::now());
        assert_eq!(decisions, vec![StrategyDecision::ExpandLand]);
    }
}
