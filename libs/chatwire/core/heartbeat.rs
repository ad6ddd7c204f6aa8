//! Keepalive for the realtime socket
//!
//! Runs on a dedicated task so heartbeat timing is independent of message
//! processing. Payloads reach the socket write half through an unbounded
//! channel drained by the connection's main loop.

use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;
use tracing::debug;

/// Periodically emit the configured payload until shut down
pub async fn heartbeat_task(
    interval: Duration,
    payload: String,
    heartbeat_tx: Sender<String>,
    shutdown_rx: Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Wait a full interval before the first beat.
    ticker.tick().await;
    // Skip missed ticks rather than bursting to catch up.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("heartbeat task started, interval {:?}", interval);

    loop {
        match shutdown_rx.try_recv() {
            Ok(_) | Err(crossbeam_channel::TryRecvError::Disconnected) => {
                break;
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }

        ticker.tick().await;

        if heartbeat_tx.send(payload.clone()).is_err() {
            debug!("heartbeat channel closed, stopping");
            break;
        }
    }

    debug!("heartbeat task exiting");
}

/// Spawn a heartbeat task
///
/// Returns the task handle, the shutdown trigger, and the channel the
/// connection loop drains for outgoing beats.
pub fn spawn_heartbeat(
    interval: Duration,
    payload: String,
) -> (tokio::task::JoinHandle<()>, Sender<()>, Receiver<String>) {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let (heartbeat_tx, heartbeat_rx) = crossbeam_channel::unbounded();

    let handle = tokio::spawn(async move {
        heartbeat_task(interval, payload, heartbeat_tx, shutdown_rx).await;
    });

    (handle, shutdown_tx, heartbeat_rx)
}
