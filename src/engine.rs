use std::time::Duration;

use tracing::{info, warn};

use crate::api::{GiftMarket, purchase_gift};
use crate::types::StarGift;
use crate::upgrader::Upgrader;

/// Largest total supply still considered worth buying.
pub const MAX_TOTAL_COUNT: i32 = 50_000;

/// Purchases attempted per gift in one run before moving on.
pub const MAX_BUYS_PER_GIFT: u32 = 100;

/// Pause after each successful purchase, for the service's rate limits.
pub const PURCHASE_DELAY: Duration = Duration::from_secs(1);

/// Note attached to every auto-bought gift.
pub const PURCHASE_NOTE: &str = "auto-buy";

/// Fixed limits for the auto-buyer. No spend cap is applied.
#[derive(Debug, Clone)]
pub struct BuyPolicy {
    pub max_total_count: i32,
    pub max_buys_per_gift: u32,
    pub purchase_delay: Duration,
    pub note: Option<String>,
    /// Pay for the upgrade together with the gift.
    pub include_upgrade: bool,
}

impl Default for BuyPolicy {
    fn default() -> Self {
        Self {
            max_total_count: MAX_TOTAL_COUNT,
            max_buys_per_gift: MAX_BUYS_PER_GIFT,
            purchase_delay: PURCHASE_DELAY,
            note: Some(PURCHASE_NOTE.to_string()),
            include_upgrade: false,
        }
    }
}

/// A gift selected for purchase attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGift {
    pub id: i64,
    pub total: i32,
    pub upgradable: bool,
}

/// Purchases made for one target during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftPurchases {
    pub gift_id: i64,
    pub bought: u32,
    /// Whether the run for this gift ended on a failed purchase.
    pub stopped_on_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuySummary {
    pub gifts: Vec<GiftPurchases>,
}

impl BuySummary {
    pub fn total_bought(&self) -> u32 {
        self.gifts.iter().map(|g| g.bought).sum()
    }
}

/// Pick limited gifts with stock left and total supply at most
/// `max_total_count`, scarcest first.
pub fn select_targets(gifts: &[StarGift], max_total_count: i32) -> Vec<TargetGift> {
    let mut targets: Vec<TargetGift> = gifts
        .iter()
        .filter(|g| {
            g.availability_total > 0
                && g.availability_total <= max_total_count
                && g.availability_remains > 0
        })
        .map(|g| TargetGift {
            id: g.id,
            total: g.availability_total,
            upgradable: g.can_upgrade,
        })
        .collect();
    // Stable sort keeps catalog order between equal totals.
    targets.sort_by_key(|t| t.total);
    targets
}

/// Buy every target gift for `recipient`, one purchase at a time.
///
/// Each gift is bought repeatedly until `max_buys_per_gift` is reached or a
/// purchase fails; a failure abandons that gift and moves on to the next.
pub async fn auto_buy<M>(
    market: &M,
    recipient: &str,
    gifts: &[StarGift],
    policy: &BuyPolicy,
    upgrader: Option<&Upgrader>,
) -> BuySummary
where
    M: GiftMarket + ?Sized,
{
    let targets = select_targets(gifts, policy.max_total_count);
    let mut summary = BuySummary::default();

    for target in targets {
        info!("Starting to buy gift {} (total {})", target.id, target.total);

        let mut bought = 0;
        let mut stopped_on_error = false;
        while bought < policy.max_buys_per_gift {
            let result = purchase_gift(
                market,
                recipient,
                target.id,
                policy.include_upgrade,
                policy.note.as_deref(),
            )
            .await;
            if let Err(e) = result {
                warn!("Failed to buy gift {}, moving to next: {e:#}", target.id);
                stopped_on_error = true;
                break;
            }

            bought += 1;
            info!("Bought gift {} ({bought}/{})", target.id, policy.max_buys_per_gift);
            if let Some(upgrader) = upgrader {
                upgrader.request();
            }
            if !policy.purchase_delay.is_zero() {
                tokio::time::sleep(policy.purchase_delay).await;
            }
        }

        summary.gifts.push(GiftPurchases {
            gift_id: target.id,
            bought,
            stopped_on_error,
        });
    }

    summary
}
