use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

/// How often the poll loop must show progress.
pub const CHECK_PERIOD: Duration = Duration::from_secs(60);

/// The activity counter did not move between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no activity detected since last check (count stuck at {count})")]
pub struct Stall {
    pub count: u64,
}

/// Crashes the process when the poll loop stops making progress, leaving
/// the restart to the process supervisor.
pub struct Watchdog {
    counter: Arc<AtomicU64>,
    last: u64,
    period: Duration,
}

impl Watchdog {
    pub fn new(counter: Arc<AtomicU64>, period: Duration) -> Self {
        let last = counter.load(Ordering::Relaxed);
        Self {
            counter,
            last,
            period,
        }
    }

    /// Take one sample. Fails if the counter equals the previous sample.
    pub fn check(&mut self) -> Result<u64, Stall> {
        let current = self.counter.load(Ordering::Relaxed);
        if current == self.last {
            return Err(Stall { count: current });
        }
        self.last = current;
        Ok(current)
    }

    /// Sample every period until a stall is seen.
    pub async fn run_until_stall(mut self) -> Stall {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.check() {
                Ok(count) => debug!("Activity check passed (count {count})"),
                Err(stall) => return stall,
            }
        }
    }

    /// Run in the background and exit the process on the first stall.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let stall = self.run_until_stall().await;
            error!("{stall}, terminating");
            std::process::exit(1);
        })
    }
}
