//! Typed request/response contracts for the HappyHarvest endpoints.
//!
//! Responses are validated at the boundary: a body missing a required
//! field fails deserialization and is reported as a parse error rather
//! than being silently ignored.

use serde::{Deserialize, Serialize};

/// `/auth/token` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

/// `/register` response. Issued exactly once per farmer.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_secret: String,
}

/// `/collect` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectResponse {
    /// Water total after the collection.
    pub score: u32,
}

/// `/profile` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Current water level.
    pub score: u32,
    #[serde(default)]
    pub credits: f64,
    #[serde(default)]
    pub total_calls: u64,
    #[serde(default)]
    pub registered_at: Option<String>,
}

/// `/land` response. `land_data` encodes plot contents per cell:
/// 0 = empty dirt, 1 = growing sprout, 2+ = a mature crop id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandResponse {
    pub land_claimed: bool,
    #[serde(default)]
    pub grid_size: u32,
    #[serde(default)]
    pub land_tiles: u32,
    #[serde(default)]
    pub land_data: Vec<Vec<u32>>,
    #[serde(default)]
    pub next_expansion_cost: Option<u32>,
}

/// `/crops` response with live market pricing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropsResponse {
    pub crops: Vec<CropEntry>,
    #[serde(default)]
    pub market_info: MarketInfo,
}

/// Market aggregates reported by the server alongside crop pricing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub highest_price: f64,
    #[serde(default)]
    pub best_efficiency: f64,
}

/// One crop's pricing entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropEntry {
    pub id: u32,
    /// Identifier sent back in plant requests.
    #[serde(rename = "type")]
    pub crop_type: String,
    pub name: String,
    pub market_price: f64,
    pub grow_time_minutes: u32,
    pub water_cost: u32,
    pub efficiency: f64,
}

/// `/plant` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRequest {
    pub crop_type: String,
    pub row: u32,
    pub col: u32,
}

/// `/plant` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantResponse {
    /// Water remaining after planting, when reported.
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `/harvest` request body.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestRequest {
    pub row: u32,
    pub col: u32,
}

/// `/harvest` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResponse {
    #[serde(default)]
    pub credits_earned: f64,
    #[serde(default)]
    pub score: Option<u32>,
}

/// `/claimLand` and `/expandLand` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandActionResponse {
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `/leaderboard` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// One leaderboard row.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardEntry {
    pub playername: String,
    pub score: i64,
}

/// Error payload the server attaches to non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message from the payload, if any.
    pub fn message(&self) -> Option<&str> {
        self.error_description.as_deref().or(self.error.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn land_response_parses_grid() {
        let body = r#"{
            "landClaimed": true,
            "gridSize": 2,
            "landTiles": 4,
            "landData": [[0, 1], [7, 0]],
            "nextExpansionCost": 60
        }"#;
        let land: LandResponse = serde_json::from_str(body).unwrap();
        assert_eq!(land.grid_size, 2);
        assert_eq!(land.land_data[1][0], 7);
        assert_eq!(land.next_expansion_cost, Some(60));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        // crops entries without pricing must not deserialize silently
        let body = r#"{"crops": [{"id": 3, "type": "lettuce", "name": "Lettuce"}]}"#;
        assert!(serde_json::from_str::<CropsResponse>(body).is_err());
    }

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error": "invalid_plot", "error_description": "occupied"}"#)
                .unwrap();
        assert_eq!(body.message(), Some("occupied"));
    }
}
