// jukebot-core/src/tasks/heartbeat.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval as tick_every};
use tracing::{debug, warn};

use crate::http::HttpClient;

/// Default gap between two heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// One outbound GET to the uptime endpoint. Returns whether it succeeded.
pub async fn beat_once<C>(client: &C, url: &str) -> bool
where
    C: HttpClient + ?Sized,
{
    match client.get(url.to_string(), HashMap::new()).await {
        Ok(_) => {
            debug!("(Heartbeat) sent to {}", url);
            true
        }
        Err(e) => {
            warn!("(Heartbeat) request to {} failed: {}", url, e);
            false
        }
    }
}

/// Spawns a background task that pings `url` immediately and then every `interval`.
/// Failures are logged; the loop keeps going until the handle is aborted.
pub fn spawn_heartbeat_task<C>(
    client: Arc<C>,
    url: String,
    interval: Duration,
) -> JoinHandle<()>
where
    C: HttpClient + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tick_every(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            beat_once(client.as_ref(), &url).await;
        }
    })
}
