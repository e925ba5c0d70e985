//! Overdue sweeper: periodic reconciliation of expired loans

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    clock::Clock,
    error::AppResult,
    repository::LendingStore,
    services::instrument::{traced, Operation},
};

/// `tokio::time::interval` rejects a zero period
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct OverdueSweeper {
    store: Arc<dyn LendingStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OverdueSweeper {
    pub fn new(store: Arc<dyn LendingStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(requested_ms = interval.as_millis() as u64, "Sweep interval raised to 1 second");
        }
        Self {
            store,
            clock,
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Move every `Borrowed` record past its due date to `Overdue`.
    ///
    /// Inventory is untouched: an overdue book is still lent. Returns the
    /// number of records transitioned.
    pub async fn sweep(&self) -> AppResult<u64> {
        traced(Operation::SweepOverdue, async {
            let count = self.store.mark_overdue(self.clock.now()).await?;
            if count > 0 {
                tracing::info!(count, "Marked loans overdue");
            } else {
                tracing::debug!("No loans to mark overdue");
            }
            Ok(count)
        })
        .await
    }

    /// Sweep on every tick until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "Overdue sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A failed pass is retried on the next tick
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Overdue sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Overdue sweeper stopped");
    }
}
