//! Periodic expiry scanner.
//!
//! Ticks on a fixed interval and asks the registry actor to sweep live
//! takes for expiry warnings and forced completion. The sweep itself runs
//! inside the actor, so the scanner never races a user command; this task
//! is only the clock.

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use takes_core::TakesConfig;

use crate::registry::TakesHandle;

/// Spawns the background scanner task.
///
/// The task ticks every `config.check_interval` and sends a fire-and-forget
/// sweep command. It exits when the cancellation token fires or the actor's
/// channel closes.
pub fn spawn_scanner_task(handle: TakesHandle, config: &TakesConfig, shutdown: CancellationToken) -> JoinHandle<()> {
    let check_interval = config.check_interval;
    tokio::spawn(async move {
        info!(interval_secs = check_interval.as_secs(), "Expiry scanner starting");
        let mut ticker = interval(check_interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Expiry scanner stopping: shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    if !handle.is_connected() {
                        debug!("Expiry scanner stopping: registry channel closed");
                        break;
                    }
                    handle.sweep().await;
                    debug!("Triggered expiry sweep");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;

    #[tokio::test]
    async fn test_scanner_stops_on_cancellation() {
        let config = TakesConfig {
            check_interval: std::time::Duration::from_millis(10),
            ..TakesConfig::default()
        };
        let handle = spawn_registry(config.clone());
        let shutdown = CancellationToken::new();

        let task = spawn_scanner_task(handle, &config, shutdown.clone());
        shutdown.cancel();

        // Task must exit promptly once cancelled.
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap();
    }
}
