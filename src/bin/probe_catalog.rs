//! Probe: fetch the gift catalog once
//!
//! Restores the configured session, requests the full catalog (hash 0) and
//! prints:
//! - Change-token and gift counts
//! - Limited gifts with remaining/total supply
//! - Which gifts the auto-buyer would target, in purchase order

use anyhow::{Context, Result};
use std::time::Instant;

use gift_buyer::api::GiftMarket;
use gift_buyer::config::AppConfig;
use gift_buyer::engine::{MAX_TOTAL_COUNT, select_targets};
use gift_buyer::reporter;
use gift_buyer::telegram::TelegramClient;
use gift_buyer::types::StarGifts;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let session = config
        .session
        .as_deref()
        .context("TG_SESSION not set; run `gift-buyer --auth` first")?;

    println!("=== Probe: gift catalog ===");
    let (client, me) =
        TelegramClient::connect_with_session(config.app_id, &config.app_hash, session).await?;
    println!("Account: {} (id {})", me.peer_name(), me.id);
    println!();

    let start = Instant::now();
    let resp = client.star_gifts(0).await?;
    let latency = start.elapsed();

    let (hash, gifts) = match resp {
        StarGifts::Gifts { hash, gifts } => (hash, gifts),
        StarGifts::NotModified => {
            println!("Catalog not modified (unexpected for hash 0)");
            return Ok(());
        }
        StarGifts::Unknown => {
            println!("Unexpected response shape");
            return Ok(());
        }
    };

    let limited = gifts.iter().filter(|g| g.is_limited()).count();
    println!("Latency: {latency:?}");
    println!("Hash: {hash}");
    println!("Gifts: {} ({limited} limited)", gifts.len());
    println!();

    print!("{}", reporter::limited_gifts_summary(&gifts));
    println!();

    let targets = select_targets(&gifts, MAX_TOTAL_COUNT);
    println!("--- Auto-buy targets (total <= {MAX_TOTAL_COUNT}) ---");
    if targets.is_empty() {
        println!("None");
    }
    for target in &targets {
        println!(
            "  Gift {} total={} upgradable={}",
            target.id, target.total, target.upgradable
        );
    }

    Ok(())
}
