//! # harvestbot
//!
//! An unattended agent for the HappyHarvest farming game. It
//! authenticates against the game's HTTP API, collects the
//! regenerating water resource on the server-mandated period, converts
//! water into planted crops, harvests what matures, and expands its
//! land when the projected return justifies it.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────┐  ┌──────────┐  ┌──────────┐
//!   │ Collector │  │ Renewal  │  │ Strategy │   independently
//!   │   task    │  │   task   │  │   task   │   scheduled loops
//!   └─────┬─────┘  └────┬─────┘  └────┬─────┘
//!         │             │             │
//!         └─────────────┼─────────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │  ApiClient   │  auth freshness, retry/backoff
//!               └──────┬───────┘
//!                      ▼
//!               ┌──────────────┐
//!               │  FarmState   │  write-after-confirm
//!               └──────────────┘
//! ```
//!
//! The collector and renewal tasks are pure maintenance loops; only the
//! strategy task makes resource-allocation decisions. All three observe
//! a shared shutdown signal at their next suspension point.
//!
//! ## Modules
//! - `api`: authenticated HTTP client with credential lifecycle and retry
//! - `bot`: task orchestration, collection and renewal loops
//! - `strategy`: decision cycle and pluggable scoring policies
//! - `state`: shared farm state
//! - `market`: market snapshots from live pricing
//! - `dashboard`: read-only status presentation
//! - `secrets`: client credential persistence

pub mod api;
pub mod bot;
pub mod config;
pub mod dashboard;
pub mod market;
pub mod secrets;
pub mod state;
pub mod strategy;

pub use config::Config;
pub use state::{FarmSnapshot, FarmState, PlotState, SharedFarmState};
