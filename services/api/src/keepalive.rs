//! Periodic self-ping that keeps idle hosting platforms from suspending the service.

use crate::config::KeepaliveConfig;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Spawns a task that GETs the configured URL forever. Failures are logged and never stop it.
pub fn spawn_keepalive(http: reqwest::Client, config: KeepaliveConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(url = %config.url, interval_secs = config.interval.as_secs(), "Keep-alive ping enabled.");
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the server is obviously awake at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match http.get(&config.url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), "Keep-alive ping ok.");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Keep-alive ping returned an error status.");
                }
                Err(e) => warn!(error = %e, "Keep-alive ping failed."),
            }
        }
    })
}
