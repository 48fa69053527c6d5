use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::notifications::NotificationSource;

use super::Engine;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Runs `poll` on a blocking thread every `period` and hands each result to
/// `sink`. No engine state is held while the collaborator runs.
pub async fn poll_loop<T, P, S>(
    name: &'static str,
    period: Duration,
    cancel_token: CancellationToken,
    poll: P,
    sink: S,
) where
    T: Send + 'static,
    P: Fn(DateTime<Utc>) -> T + Send + Sync + 'static,
    S: Fn(T, DateTime<Utc>) + Send,
{
    let poll = Arc::new(poll);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("{name} poller shutting down");
                break;
            }
            _ = ticker.tick() => {
                let poll = poll.clone();
                let now = Utc::now();
                match tokio::task::spawn_blocking(move || poll(now)).await {
                    Ok(value) => sink(value, Utc::now()),
                    Err(err) => log_error!("{name} poll task failed: {err}"),
                }
            }
        }
    }
}

/// Polls one notification source and submits whatever it produced.
pub async fn source_loop(
    engine: Arc<Engine>,
    mut source: Box<dyn NotificationSource>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                let polled = tokio::task::spawn_blocking(move || {
                    let produced = source.poll(now);
                    (source, produced)
                })
                .await;
                match polled {
                    Ok((returned, produced)) => {
                        source = returned;
                        for notification in produced {
                            engine.submit_notification(notification, Utc::now());
                        }
                    }
                    Err(err) => {
                        log_error!("notification source task failed, stopping it: {err}");
                        break;
                    }
                }
            }
        }
    }
}
