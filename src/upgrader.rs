use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::GiftMarket;

/// How long one sweep keeps looking for an upgradable gift.
pub const UPGRADE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The service rejects upgrade calls made sooner than this after a purchase.
pub const UPGRADE_WARM_UP: Duration = Duration::from_secs(3);

pub const UPGRADE_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Pending sweeps kept before new requests are dropped.
const QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct UpgradeSettings {
    pub warm_up: Duration,
    pub poll_period: Duration,
    pub timeout: Duration,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            warm_up: UPGRADE_WARM_UP,
            poll_period: UPGRADE_POLL_PERIOD,
            timeout: UPGRADE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Upgraded { msg_id: i32 },
    TimedOut,
}

/// Upgrade exactly one held gift, giving up at `deadline`.
///
/// Waits `warm_up` before the first remote call, then lists held gifts every
/// `poll_period` and upgrades the first one that allows it. Listing and
/// upgrade errors are logged and the sweep keeps going.
pub async fn upgrade_one<M>(market: &M, deadline: Instant, settings: &UpgradeSettings) -> SweepOutcome
where
    M: GiftMarket + ?Sized,
{
    info!("Starting gift upgrade sweep");

    if tokio::time::timeout_at(deadline, tokio::time::sleep(settings.warm_up))
        .await
        .is_err()
    {
        info!("Gift upgrade sweep timed out during warm-up");
        return SweepOutcome::TimedOut;
    }

    let mut ticker = tokio::time::interval(settings.poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            _ = &mut expired => {
                info!("Gift upgrade sweep timed out after {:?}", settings.timeout);
                return SweepOutcome::TimedOut;
            }
            _ = ticker.tick() => {
                debug!("Checking for upgradable gifts...");
                let saved = match market.saved_star_gifts().await {
                    Ok(saved) => saved,
                    Err(e) => {
                        warn!("Failed to list saved gifts: {e:#}");
                        continue;
                    }
                };

                for gift in saved.iter().filter(|g| g.can_upgrade) {
                    match market.upgrade_star_gift(gift.msg_id).await {
                        Ok(()) => {
                            info!("Upgraded gift from message {}", gift.msg_id);
                            return SweepOutcome::Upgraded { msg_id: gift.msg_id };
                        }
                        Err(e) => warn!("Failed to upgrade gift from message {}: {e:#}", gift.msg_id),
                    }
                }
                debug!("No upgradable gifts found");
            }
        }
    }
}

/// Handle to the background upgrade worker.
///
/// A single task drains the request queue, so at most one sweep runs at a
/// time. The worker stops when every handle is dropped.
#[derive(Clone)]
pub struct Upgrader {
    tx: mpsc::Sender<()>,
}

impl Upgrader {
    pub fn spawn<M>(market: Arc<M>, settings: UpgradeSettings) -> Self
    where
        M: GiftMarket + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let deadline = Instant::now() + settings.timeout;
                let outcome = upgrade_one(market.as_ref(), deadline, &settings).await;
                debug!("Upgrade sweep finished: {outcome:?}");
            }
        });
        Self { tx }
    }

    /// Queue one sweep. Returns false if the request was dropped.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                warn!("Upgrade queue full, dropping request");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Upgrade worker stopped, dropping request");
                false
            }
        }
    }
}
