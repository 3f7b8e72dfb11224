use crate::services::ActivationService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodically deletes expired tokens until `shutdown` is cancelled.
///
/// The first sweep runs immediately. A zero interval disables sweeping.
pub fn spawn_token_sweeper(
    service: Arc<ActivationService>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if every.is_zero() {
            tracing::info!("Token sweeping disabled");
            return;
        }

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = service.purge_expired_tokens().await {
                        tracing::error!(error = %e, "Failed to purge expired tokens");
                    }
                }
            }
        }

        tracing::info!("Token sweeper stopped");
    })
}
