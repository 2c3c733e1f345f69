//! Shared farm state: the single source of truth for water, land,
//! plots, and credits.
//!
//! All tasks read it; writes happen only after the server confirms the
//! corresponding call (write-after-confirm, never optimistic). The
//! snapshot is replaced wholesale from `/profile` and `/land` answers —
//! planting timestamps are the one locally-derived piece of data, since
//! the server does not report them, and they are carried across land
//! refreshes for plots the server still shows occupied.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::types::{LandResponse, ProfileResponse};

/// One unit of land and what is growing on it.
#[derive(Debug, Clone, Default)]
pub struct PlotState {
    pub index: usize,
    /// Crop type identifier, or `None` for empty dirt.
    pub crop: Option<String>,
    pub planted_at: Option<DateTime<Utc>>,
    pub matures_at: Option<DateTime<Utc>>,
}

impl PlotState {
    fn empty(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crop.is_none()
    }

    /// Maturity is computed from the local planting record, not polled.
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.crop.is_some() && matches!(self.matures_at, Some(at) if at <= now)
    }
}

/// Last known server-confirmed view of the farm.
#[derive(Debug, Clone, Default)]
pub struct FarmSnapshot {
    pub water: u32,
    pub capacity: u32,
    pub credits: f64,
    pub land_claimed: bool,
    /// Grid dimensions (width, height).
    pub land_size: (u32, u32),
    pub next_expansion_cost: Option<u32>,
    pub plots: Vec<PlotState>,
}

impl FarmSnapshot {
    pub fn empty_plot_indices(&self) -> Vec<usize> {
        self.plots
            .iter()
            .filter(|p| p.is_empty())
            .map(|p| p.index)
            .collect()
    }

    pub fn mature_plot_indices(&self, now: DateTime<Utc>) -> Vec<usize> {
        self.plots
            .iter()
            .filter(|p| p.is_mature(now))
            .map(|p| p.index)
            .collect()
    }
}

/// Guarded farm state shared by every task.
pub struct FarmState {
    inner: RwLock<FarmSnapshot>,
}

/// Handle passed to each task at construction.
pub type SharedFarmState = Arc<FarmState>;

impl FarmState {
    pub fn new(capacity: u32) -> SharedFarmState {
        Arc::new(Self {
            inner: RwLock::new(FarmSnapshot {
                capacity,
                ..Default::default()
            }),
        })
    }

    /// Consistent point-in-time copy for decision making.
    pub async fn snapshot(&self) -> FarmSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn land_size(&self) -> (u32, u32) {
        self.inner.read().await.land_size
    }

    /// Apply a confirmed `/collect` result.
    pub async fn apply_water(&self, total: u32) {
        let mut farm = self.inner.write().await;
        farm.water = total.min(farm.capacity);
    }

    /// Apply a confirmed `/profile` result.
    pub async fn apply_profile(&self, profile: &ProfileResponse) {
        let mut farm = self.inner.write().await;
        farm.water = profile.score.min(farm.capacity);
        farm.credits = profile.credits;
    }

    /// Rebuild the plot list from a confirmed `/land` result.
    ///
    /// Cell codes: 0 = empty, 1 = growing, 2+ = mature crop id. Local
    /// planting timestamps take precedence for plots the server still
    /// shows occupied; occupied plots with no local record fall back to
    /// the server's maturity encoding so a restarted agent can still
    /// harvest what it finds.
    pub async fn apply_land(&self, land: &LandResponse) {
        let mut farm = self.inner.write().await;
        farm.land_claimed = land.land_claimed;
        farm.land_size = (land.grid_size, land.grid_size);
        farm.next_expansion_cost = land.next_expansion_cost;

        let width = land.grid_size as usize;
        let mut plots = Vec::with_capacity(land.land_tiles as usize);
        for (row_idx, row) in land.land_data.iter().enumerate() {
            for (col_idx, &cell) in row.iter().enumerate() {
                let index = row_idx * width + col_idx;
                let plot = if cell == 0 {
                    PlotState::empty(index)
                } else {
                    match farm.plots.get(index).filter(|p| !p.is_empty()) {
                        Some(known) => PlotState {
                            index,
                            ..known.clone()
                        },
                        None => PlotState {
                            index,
                            crop: Some(cell.to_string()),
                            planted_at: None,
                            // cell >= 2 means the server already considers it mature
                            matures_at: (cell >= 2).then(Utc::now),
                        },
                    }
                };
                plots.push(plot);
            }
        }
        farm.plots = plots;
    }

    /// Apply a confirmed `/plant` result. Returns false when the plot
    /// already holds this crop, so a response processed twice is a
    /// no-op.
    pub async fn apply_plant(
        &self,
        index: usize,
        crop_type: &str,
        planted_at: DateTime<Utc>,
        matures_at: DateTime<Utc>,
    ) -> bool {
        let mut farm = self.inner.write().await;
        let Some(plot) = farm.plots.get_mut(index) else {
            return false;
        };
        if plot.crop.as_deref() == Some(crop_type) {
            return false;
        }
        plot.crop = Some(crop_type.to_string());
        plot.planted_at = Some(planted_at);
        plot.matures_at = Some(matures_at);
        true
    }

    /// Apply a confirmed `/harvest` result. Returns false when the plot
    /// is already empty.
    pub async fn apply_harvest(&self, index: usize, credits_earned: f64) -> bool {
        let mut farm = self.inner.write().await;
        let Some(plot) = farm.plots.get_mut(index) else {
            return false;
        };
        if plot.is_empty() {
            return false;
        }
        *plot = PlotState::empty(index);
        farm.credits += credits_earned;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land(grid: Vec<Vec<u32>>) -> LandResponse {
        let size = grid.len() as u32;
        LandResponse {
            land_claimed: true,
            grid_size: size,
            land_tiles: size * size,
            land_data: grid,
            next_expansion_cost: Some(30),
        }
    }

    #[tokio::test]
    async fn plant_applies_exactly_once() {
        let state = FarmState::new(1024);
        state.apply_land(&land(vec![vec![0, 0], vec![0, 0]])).await;

        let planted_at = Utc::now();
        let matures_at = planted_at + chrono::Duration::minutes(12);
        assert!(state.apply_plant(1, "tomato", planted_at, matures_at).await);
        // processing the same response again must not re-apply
        assert!(!state.apply_plant(1, "tomato", planted_at, matures_at).await);

        let farm = state.snapshot().await;
        let plot = &farm.plots[1];
        assert_eq!(plot.crop.as_deref(), Some("tomato"));
        assert_eq!(plot.matures_at, Some(planted_at + chrono::Duration::minutes(12)));
    }

    #[tokio::test]
    async fn harvest_empties_plot_and_credits() {
        let state = FarmState::new(1024);
        state.apply_land(&land(vec![vec![0, 0], vec![0, 0]])).await;
        let now = Utc::now();
        state.apply_plant(2, "herb", now, now).await;

        assert!(state.apply_harvest(2, 0.45).await);
        assert!(!state.apply_harvest(2, 0.45).await);

        let farm = state.snapshot().await;
        assert!(farm.plots[2].is_empty());
        assert!((farm.credits - 0.45).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn land_refresh_carries_local_planting_data() {
        let state = FarmState::new(1024);
        state.apply_land(&land(vec![vec![0, 0], vec![0, 0]])).await;
        let planted_at = Utc::now();
        let matures_at = planted_at + chrono::Duration::minutes(30);
        state.apply_plant(3, "corn", planted_at, matures_at).await;

        // server now shows the sprout; our timing survives the rebuild
        state.apply_land(&land(vec![vec![0, 0], vec![0, 1]])).await;
        let farm = state.snapshot().await;
        assert_eq!(farm.plots[3].crop.as_deref(), Some("corn"));
        assert_eq!(farm.plots[3].matures_at, Some(matures_at));

        // and a plot the server reports empty is dropped locally too
        state.apply_land(&land(vec![vec![0, 0], vec![0, 0]])).await;
        assert!(state.snapshot().await.plots[3].is_empty());
    }

    #[tokio::test]
    async fn unknown_mature_cell_is_harvestable() {
        let state = FarmState::new(1024);
        // a fresh process finds crops it has no planting record for
        state.apply_land(&land(vec![vec![7, 1], vec![0, 0]])).await;
        let farm = state.snapshot().await;
        let now = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(farm.mature_plot_indices(now), vec![0]);
        // the growing sprout has no known maturity and is left alone
        assert!(!farm.plots[1].is_mature(now));
    }

    #[tokio::test]
    async fn water_is_capped_at_capacity() {
        let state = FarmState::new(100);
        state.apply_water(250).await;
        assert_eq!(state.snapshot().await.water, 100);
    }

    #[test]
    fn maturity_is_time_derived() {
        let now = Utc::now();
        let plot = PlotState {
            index: 0,
            crop: Some("peas".into()),
            planted_at: Some(now),
            matures_at: Some(now + chrono::Duration::minutes(5)),
        };
        assert!(!plot.is_mature(now));
        assert!(plot.is_mature(now + chrono::Duration::minutes(5)));
    }
}
