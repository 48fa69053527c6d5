use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Engine;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// How long the loop sleeps when nothing is scheduled; new items wake it early.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Background loop: ticks the aggregator on a fixed cadence and releases
/// deferred items and batch windows as their deadlines pass.
pub async fn engine_loop(engine: Arc<Engine>, tick_interval: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let wake = engine.wake_handle();

    loop {
        let until_deadline = match engine.next_deadline() {
            Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_WAIT,
        };

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("engine loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                engine.tick(now);
                engine.release_due(now);
            }
            _ = tokio::time::sleep(until_deadline) => {
                engine.release_due(Utc::now());
            }
            _ = wake.notified() => {
                log_debug!("scheduler armed a new deadline");
            }
        }
    }
}
