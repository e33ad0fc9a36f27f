use log::{error, info};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::DEFAULT_UPDATE_EVERY_MS;
use crate::manager::PollManager;

/// Handle to the periodic reconciliation loop. Aborted on `stop` or drop.
#[derive(Debug)]
pub struct ReconcileTask {
    handle: JoinHandle<()>,
}

impl ReconcileTask {
    /// Spawn the loop. It holds only a weak reference, so it ends on its own
    /// once the manager is dropped.
    pub fn start(manager: Weak<PollManager>, every: Duration) -> Self {
        // tokio intervals panic on a zero period
        let every = if every.is_zero() {
            let fallback = Duration::from_millis(DEFAULT_UPDATE_EVERY_MS);
            error!("Reconcile interval must be positive, using {:?}", fallback);
            fallback
        } else {
            every
        };

        let handle = tokio::spawn(async move {
            info!("Starting poll reconciliation every {:?}", every);
            // First tick after one full period, not immediately
            let mut interval = interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    info!("Poll manager dropped, stopping reconciliation");
                    break;
                };
                manager.reconcile().await;
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ReconcileTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
