use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info, warn};

use crate::api::GiftMarket;
use crate::engine::{self, BuyPolicy, BuySummary};
use crate::reporter;
use crate::state::WatchState;
use crate::types::{InputPeer, StarGift, StarGifts};
use crate::upgrader::Upgrader;

/// What happened to the operator notification for a changed catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Every gift was already known; nothing to announce.
    NoNewGifts,
    /// New gifts appeared but none has stock left.
    Empty,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub previous_hash: i32,
    pub current_hash: i32,
    pub gift_count: usize,
    /// This change printed the one-time limited-gift summary.
    pub summary_printed: bool,
    /// Ids seen for the first time, in catalog order.
    pub new_gifts: Vec<i64>,
    pub purchases: BuySummary,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    NotModified,
    Changed(ChangeReport),
    /// The service answered with a shape we do not handle.
    Unexpected,
}

/// Polls the catalog, buys matching gifts and notifies the operator.
pub struct Poller<M: ?Sized> {
    market: Arc<M>,
    admin: InputPeer,
    /// Peer name the auto-buyer sends gifts to.
    buyer: String,
    policy: BuyPolicy,
    upgrader: Option<Upgrader>,
    state: WatchState,
}

impl<M> Poller<M>
where
    M: GiftMarket + ?Sized,
{
    pub fn new(market: Arc<M>, admin: InputPeer, buyer: String, state: WatchState) -> Self {
        Self {
            market,
            admin,
            buyer,
            policy: BuyPolicy::default(),
            upgrader: None,
            state,
        }
    }

    pub fn with_policy(mut self, policy: BuyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_upgrader(mut self, upgrader: Upgrader) -> Self {
        self.upgrader = Some(upgrader);
        self
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Poll forever, sleeping `interval` between iterations. Errors are
    /// logged and the next iteration runs as usual.
    pub async fn run(&mut self, interval: Duration) {
        loop {
            if let Err(e) = self.poll_once().await {
                warn!("Poll failed: {e:#}");
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Run one iteration of the poll loop.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let count = self.state.tick();
        let previous = self.state.hash();

        let resp = self
            .market
            .star_gifts(previous)
            .await
            .context("failed to get star gifts")?;

        match resp {
            StarGifts::NotModified => {
                debug!("No gift changes detected (hash {previous}, poll #{count})");
                Ok(PollOutcome::NotModified)
            }
            StarGifts::Gifts { hash, gifts } => {
                let report = self.handle_changed(previous, hash, gifts).await;
                Ok(PollOutcome::Changed(report))
            }
            StarGifts::Unknown => {
                warn!("Unexpected star gifts response, ignoring");
                Ok(PollOutcome::Unexpected)
            }
        }
    }

    async fn handle_changed(&mut self, previous: i32, hash: i32, gifts: Vec<StarGift>) -> ChangeReport {
        let summary_printed = self.state.claim_summary();
        if summary_printed {
            reporter::report_summary(&gifts);
        }

        let purchases = engine::auto_buy(
            self.market.as_ref(),
            &self.buyer,
            &gifts,
            &self.policy,
            self.upgrader.as_ref(),
        )
        .await;

        let new_gifts = self.state.record_gifts(&gifts);
        info!(
            "Gift changes detected (hash {previous} -> {hash}, {} gifts)",
            gifts.len()
        );

        let delivery = if new_gifts.is_empty() {
            info!("No new gifts (poll #{})", self.state.activity_count());
            Delivery::NoNewGifts
        } else {
            info!("New gifts: {new_gifts:?}");
            self.notify(&gifts).await
        };

        self.state.advance(hash);

        ChangeReport {
            previous_hash: previous,
            current_hash: hash,
            gift_count: gifts.len(),
            summary_printed,
            new_gifts,
            purchases,
            delivery,
        }
    }

    async fn notify(&self, gifts: &[StarGift]) -> Delivery {
        let Some(message) = reporter::format_update_message(gifts, &Local::now()) else {
            info!("Nothing in stock, skipping notification");
            return Delivery::Empty;
        };

        match self.market.send_message(&self.admin, &message).await {
            Ok(()) => {
                info!("Notification sent to admin");
                Delivery::Sent
            }
            Err(e) => {
                warn!("Failed to send notification to admin: {e:#}");
                Delivery::Failed
            }
        }
    }
}
