use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use gift_buyer::api::GiftMarket;
use gift_buyer::auth;
use gift_buyer::config::AppConfig;
use gift_buyer::poller::Poller;
use gift_buyer::state::WatchState;
use gift_buyer::telegram::TelegramClient;
use gift_buyer::upgrader::{UpgradeSettings, Upgrader};
use gift_buyer::watchdog::{CHECK_PERIOD, Watchdog};

#[derive(Parser)]
#[command(
    name = "gift-buyer",
    about = "Watch the gift catalog, auto-buy limited gifts and notify the operator"
)]
struct Args {
    /// Log in interactively and print a session string for TG_SESSION
    #[arg(long)]
    auth: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let session = match (&config.session, args.auth) {
        (Some(session), false) => session.clone(),
        (None, false) => {
            warn!("TG_SESSION not set, starting interactive login");
            return run_auth(&config).await;
        }
        (_, true) => return run_auth(&config).await,
    };

    let state = WatchState::new();
    Watchdog::new(state.activity(), CHECK_PERIOD).spawn();

    let (client, me) =
        TelegramClient::connect_with_session(config.app_id, &config.app_hash, &session).await?;
    let market = Arc::new(client);

    let admin = market
        .resolve_peer(&config.admin)
        .await
        .with_context(|| format!("failed to resolve admin peer {}", config.admin))?;

    let mut poller = Poller::new(Arc::clone(&market), admin, me.peer_name(), state);
    if config.auto_upgrade {
        info!("Auto-upgrade enabled");
        poller = poller.with_upgrader(Upgrader::spawn(market, UpgradeSettings::default()));
    }

    info!(
        "Bot started as {} (id {}), notifying {} every {:?}",
        me.peer_name(),
        me.id,
        config.admin,
        config.poll_interval
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = poller.run(config.poll_interval) => {}
    }

    Ok(())
}

async fn run_auth(config: &AppConfig) -> Result<()> {
    let session = auth::bootstrap_session(config)
        .await
        .context("failed to authenticate session")?;
    println!();
    println!("Store this in your environment:");
    println!("TG_SESSION={session}");
    Ok(())
}
