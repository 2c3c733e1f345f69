//! Market snapshots derived from `/crops` pricing.
//!
//! A snapshot is immutable once fetched; the strategy task works from a
//! fresh copy each cycle and discards the previous one, since the
//! server fully replaces prices on every query.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::api::types::CropsResponse;

/// One plantable crop with its live pricing.
#[derive(Debug, Clone)]
pub struct CropInfo {
    pub id: u32,
    /// Identifier used in plant requests.
    pub crop_type: String,
    pub name: String,
    pub market_price: f64,
    pub grow_time_minutes: u32,
    pub water_cost: u32,
    /// Output value normalized by resource cost, as reported by the server.
    pub efficiency: f64,
}

impl CropInfo {
    /// Projected credits per hour for one plot of this crop.
    pub fn credits_per_hour(&self) -> f64 {
        if self.grow_time_minutes == 0 {
            return 0.0;
        }
        self.market_price * 60.0 / f64::from(self.grow_time_minutes)
    }
}

/// Point-in-time view of the crop market.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub crops: Vec<CropInfo>,
    pub average_price: f64,
    pub average_efficiency: f64,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Build a snapshot from a `/crops` answer. The server's reported
    /// average price is used when present; averages the server omits
    /// are computed from the entries.
    pub fn from_response(response: &CropsResponse, fetched_at: DateTime<Utc>) -> Self {
        let crops: Vec<CropInfo> = response
            .crops
            .iter()
            .map(|c| CropInfo {
                id: c.id,
                crop_type: c.crop_type.clone(),
                name: c.name.clone(),
                market_price: c.market_price,
                grow_time_minutes: c.grow_time_minutes,
                water_cost: c.water_cost,
                efficiency: c.efficiency,
            })
            .collect();

        let count = crops.len().max(1) as f64;
        let average_price = if response.market_info.average_price > 0.0 {
            response.market_info.average_price
        } else {
            crops.iter().map(|c| c.market_price).sum::<f64>() / count
        };
        let average_efficiency = crops.iter().map(|c| c.efficiency).sum::<f64>() / count;

        Self {
            crops,
            average_price,
            average_efficiency,
            fetched_at,
        }
    }

    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        now - self.fetched_at >= max_age
    }

    /// Mean projected credits per hour across all crops; used when
    /// projecting revenue from not-yet-planted plots.
    pub fn average_credits_per_hour(&self) -> f64 {
        if self.crops.is_empty() {
            return 0.0;
        }
        self.crops.iter().map(CropInfo::credits_per_hour).sum::<f64>() / self.crops.len() as f64
    }

    /// Top crops by efficiency, for the dashboard summary.
    pub fn top_by_efficiency(&self, n: usize) -> Vec<&CropInfo> {
        let mut ranked: Vec<&CropInfo> = self.crops.iter().collect();
        ranked.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
        ranked.truncate(n);
        ranked
    }
}
