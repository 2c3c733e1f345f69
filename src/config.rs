//! Runtime configuration.
//!
//! Every timing and policy constant the agent uses lives here; the
//! scheduling loops and scoring policies take these as parameters and
//! never hard-code their own. Values come from `HARVESTBOT_*`
//! environment variables layered over built-in defaults, the same way
//! a `.env` file seeds the client credentials.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the game server.
    pub base_url: String,
    /// Server-mandated water collection period. Collecting earlier than
    /// this forfeits a penalty.
    pub collect_interval_secs: u64,
    /// How often the renewal task checks the credential for expiry.
    pub renewal_check_interval_secs: u64,
    /// Refresh the token this long before its expiry.
    pub renewal_safety_margin_secs: u64,
    /// Strategy decision cycle period.
    pub strategy_period_secs: u64,
    /// Maximum age of a market snapshot before it is re-fetched.
    /// Deliberately offset from `strategy_period_secs` so decision
    /// cycles are not systematically reading prices about to change.
    pub market_refresh_secs: u64,
    /// How often the dashboard renders a status summary.
    pub dashboard_interval_secs: u64,
    /// Server-side water storage cap.
    pub water_capacity: u32,
    /// Water cost of claiming the first plot of land.
    pub land_claim_cost: u32,
    pub retry: RetrySettings,
    pub strategy: StrategySettings,
}

/// Retry and backoff tuning for the API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retries after the first attempt of a transient failure.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Cap on a single backoff delay.
    pub max_delay_ms: u64,
    /// Wall-clock budget across all retries of one call.
    pub retry_budget_ms: u64,
}

/// Tunables consumed by the reference strategy policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Emergency floor the reserve shrinks toward under urgency.
    pub min_reserve: u32,
    /// Conservative water reserve when there is no urgency to plant.
    pub default_reserve: u32,
    /// Below this credit balance the reserve collapses to the minimum.
    pub low_credit_floor: f64,
    /// Minimum projected ROI before expanding land.
    pub expansion_roi_threshold: f64,
    /// Horizon over which expansion revenue is projected, in hours.
    pub roi_horizon_hours: f64,
    /// Rough credit value of one unit of water, used to compare
    /// expansion cost against projected crop revenue.
    pub water_credit_rate: f64,
    /// Score multipliers suppressing very-low-value crops. Checked in
    /// order; the first tier whose `below` exceeds the price applies.
    pub price_tiers: Vec<PriceTier>,
}

/// One price-tier penalty breakpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceTier {
    pub below: f64,
    pub multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://happyharvest.fun".to_string(),
            collect_interval_secs: 30,
            renewal_check_interval_secs: 30,
            renewal_safety_margin_secs: 60,
            strategy_period_secs: 30,
            market_refresh_secs: 65,
            dashboard_interval_secs: 30,
            water_capacity: 1024,
            land_claim_cost: 5,
            retry: RetrySettings::default(),
            strategy: StrategySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            retry_budget_ms: 30_000,
        }
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            min_reserve: 1,
            default_reserve: 8,
            low_credit_floor: 25.0,
            expansion_roi_threshold: 0.15,
            roi_horizon_hours: 24.0,
            water_credit_rate: 0.02,
            price_tiers: vec![
                PriceTier {
                    below: 0.5,
                    multiplier: 0.25,
                },
                PriceTier {
                    below: 1.0,
                    multiplier: 0.6,
                },
            ],
        }
    }
}

impl Config {
    /// Build a config from environment variables layered over defaults.
    ///
    /// A variable that is present but unparseable is a startup error,
    /// not a silent fallback.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("HARVESTBOT_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        override_var(&mut config.collect_interval_secs, "HARVESTBOT_COLLECT_INTERVAL_SECS")?;
        override_var(
            &mut config.renewal_check_interval_secs,
            "HARVESTBOT_RENEWAL_CHECK_INTERVAL_SECS",
        )?;
        override_var(
            &mut config.renewal_safety_margin_secs,
            "HARVESTBOT_RENEWAL_SAFETY_MARGIN_SECS",
        )?;
        override_var(&mut config.strategy_period_secs, "HARVESTBOT_STRATEGY_PERIOD_SECS")?;
        override_var(&mut config.market_refresh_secs, "HARVESTBOT_MARKET_REFRESH_SECS")?;
        override_var(
            &mut config.dashboard_interval_secs,
            "HARVESTBOT_DASHBOARD_INTERVAL_SECS",
        )?;
        override_var(&mut config.water_capacity, "HARVESTBOT_WATER_CAPACITY")?;
        override_var(&mut config.land_claim_cost, "HARVESTBOT_LAND_CLAIM_COST")?;

        override_var(&mut config.retry.max_retries, "HARVESTBOT_MAX_RETRIES")?;
        override_var(&mut config.retry.base_delay_ms, "HARVESTBOT_RETRY_BASE_DELAY_MS")?;
        override_var(&mut config.retry.max_delay_ms, "HARVESTBOT_RETRY_MAX_DELAY_MS")?;
        override_var(&mut config.retry.retry_budget_ms, "HARVESTBOT_RETRY_BUDGET_MS")?;

        override_var(&mut config.strategy.min_reserve, "HARVESTBOT_MIN_RESERVE")?;
        override_var(&mut config.strategy.default_reserve, "HARVESTBOT_DEFAULT_RESERVE")?;
        override_var(&mut config.strategy.low_credit_floor, "HARVESTBOT_LOW_CREDIT_FLOOR")?;
        override_var(
            &mut config.strategy.expansion_roi_threshold,
            "HARVESTBOT_EXPANSION_ROI_THRESHOLD",
        )?;
        override_var(&mut config.strategy.roi_horizon_hours, "HARVESTBOT_ROI_HORIZON_HOURS")?;
        override_var(&mut config.strategy.water_credit_rate, "HARVESTBOT_WATER_CREDIT_RATE")?;

        if let Ok(raw) = std::env::var("HARVESTBOT_PRICE_TIERS") {
            config.strategy.price_tiers = serde_json::from_str(&raw)
                .context("HARVESTBOT_PRICE_TIERS is not a valid tier list")?;
        }

        if config.collect_interval_secs == 0 {
            anyhow::bail!("collect interval must be greater than zero");
        }

        Ok(config)
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn renewal_check_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_check_interval_secs)
    }

    pub fn renewal_safety_margin(&self) -> Duration {
        Duration::from_secs(self.renewal_safety_margin_secs)
    }

    pub fn strategy_period(&self) -> Duration {
        Duration::from_secs(self.strategy_period_secs)
    }

    pub fn market_refresh(&self) -> Duration {
        Duration::from_secs(self.market_refresh_secs)
    }

    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_secs(self.dashboard_interval_secs)
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn retry_budget(&self) -> Duration {
        Duration::from_millis(self.retry_budget_ms)
    }
}

fn override_var<T>(slot: &mut T, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}"))?;
    }
    Ok(())
}
