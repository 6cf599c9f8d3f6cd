use std::{sync::OnceLock, time::Duration};

use reqwest::Client;

/// Shared HTTP client so upstream connections get reused across requests.
pub(crate) fn http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            Client::builder()
                // Long enough for slow streamed generations; short enough
                // that a wedged upstream doesn't pin the request forever.
                .timeout(Duration::from_secs(300))
                .pool_idle_timeout(Some(Duration::from_secs(5)))
                .tcp_nodelay(true)
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .build()
                .expect("Failed to build default HTTP client")
        })
        .clone()
}
