//! CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use harvestbot::api::ApiClient;
use harvestbot::bot::FarmBot;
use harvestbot::config::Config;
use harvestbot::dashboard::Dashboard;
use harvestbot::secrets::{ClientCredentials, DotenvSecretStore, SecretStore};
use harvestbot::state::FarmState;
use harvestbot::strategy::policy::ReferencePolicy;

#[derive(Debug, Parser)]
#[command(name = "harvestbot", about = "Unattended farming agent for the HappyHarvest HTTP API")]
struct Cli {
    /// Farmer display name (required for registration)
    #[arg(short, long)]
    farmer: Option<String>,

    /// Register a new farmer and persist the issued credentials
    #[arg(short, long)]
    register: bool,

    /// Print the current profile and land, then exit
    #[arg(short, long)]
    stats: bool,

    /// Print the leaderboard, then exit
    #[arg(short, long)]
    leaderboard: bool,

    /// Path to the credentials file
    #[arg(long, default_value = ".env")]
    credentials: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let state = FarmState::new(config.water_capacity);
    let store = DotenvSecretStore::new(cli.credentials);

    // leaderboard and market data are public; no credentials needed
    if cli.leaderboard {
        let api = ApiClient::new(&config, &ClientCredentials::default(), state)?;
        let board = api
            .leaderboard()
            .await
            .context("failed to fetch leaderboard")?;
        println!("HappyHarvest leaderboard:");
        for (rank, entry) in board.leaderboard.iter().take(10).enumerate() {
            println!("{:2}. {:20} {:6} water", rank + 1, entry.playername, entry.score);
        }
        return Ok(());
    }

    let creds = match store.load().await? {
        Some(creds) => creds,
        None if cli.register => {
            let farmer = cli
                .farmer
                .clone()
                .or_else(|| std::env::var("FARMER_NAME").ok())
                .context("--register requires --farmer <name>")?;
            let api = ApiClient::new(&config, &ClientCredentials::default(), state.clone())?;
            tracing::info!("Registering farmer {farmer}");
            let issued = api
                .register(&farmer)
                .await
                .context("registration failed")?;
            let creds = ClientCredentials {
                client_id: issued.client_id,
                client_secret: issued.client_secret,
            };
            store.save(&farmer, &creds).await?;
            creds
        }
        None => anyhow::bail!(
            "no client credentials found; run with --register --farmer <name> to create a farmer"
        ),
    };

    let api = Arc::new(ApiClient::new(&config, &creds, state.clone())?);

    if cli.stats {
        api.authenticate().await.context("authentication failed")?;
        let profile = api.profile().await.context("failed to fetch profile")?;
        let land = api.land().await.context("failed to fetch land")?;
        println!("Water:   {}", profile.score);
        println!("Credits: {:.2}", profile.credits);
        println!(
            "Land:    {}x{} ({} tiles)",
            land.grid_size, land.grid_size, land.land_tiles
        );
        println!("Calls:   {}", profile.total_calls);
        return Ok(());
    }

    let policy = Arc::new(ReferencePolicy::new(
        config.strategy.clone(),
        config.land_claim_cost,
    ));
    let dashboard = Dashboard::new(state.clone());

    FarmBot::new(config, api, state, policy, dashboard).run().await
}
