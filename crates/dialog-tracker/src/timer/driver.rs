//! Background task driving dialog timers
//!
//! ```text
//! every timer_tick_interval         → DialogManager::on_timer_tick
//! every stale_cleanup_interval      → DialogManager::clean_stale
//! every persistence_flush_interval  → DialogManager::flush_changed (delayed mode)
//! ```

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::manager::DialogManager;
use crate::persistence::PersistenceMode;

/// Handle to a running timer driver
#[derive(Debug)]
pub struct TimerDriverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TimerDriverHandle {
    /// Stop the driver and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            debug!("timer driver task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the driver on the current tokio runtime
pub fn spawn_timer_driver(manager: DialogManager) -> TimerDriverHandle {
    let (shutdown, mut stop) = watch::channel(false);
    let task = tokio::spawn(async move {
        let config = manager.config().clone();
        let mut tick = interval(config.timer_tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup = interval(config.stale_cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush = interval(config.persistence_flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let delayed = config.persistence_mode == PersistenceMode::Delayed;

        info!(
            "dialog timer driver started (tick {:?}, cleanup {:?})",
            config.timer_tick_interval, config.stale_cleanup_interval
        );
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    manager.on_timer_tick(Instant::now());
                }
                _ = cleanup.tick() => {
                    manager.clean_stale(Utc::now());
                }
                _ = flush.tick(), if delayed => {
                    manager.flush_changed();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("dialog timer driver stopped");
    });
    TimerDriverHandle { shutdown, task }
}
