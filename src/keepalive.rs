//! Optional startup keep-alive ping.
//!
//! Some hosting platforms idle out containers that never make outbound
//! requests. When a keep-alive URL is configured, one GET is issued from a
//! background task at startup; the outcome is logged and never affects the
//! gateway.

use std::time::Duration;

use tracing::{info, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns the one-shot ping task when a URL is configured.
pub fn spawn(keepalive_url: Option<&str>) {
    let Some(url) = keepalive_url else {
        return;
    };
    let url = url.to_string();

    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(PING_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build keep-alive HTTP client");
                return;
            }
        };

        match client.get(&url).send().await {
            Ok(response) => {
                info!(url = %url, status = %response.status(), "Keep-alive ping sent");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Keep-alive ping failed");
            }
        }
    });
}
