use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use async_trait::async_trait;
use eyre::{Context, Result};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::mpsc;

use crate::{
    config::{loader::parse_json_config, models::GatewayConfig},
    ports::config_provider::ConfigProvider,
};

/// Fetches a JSON route document over HTTP and polls it for changes.
pub struct HttpConfigProvider {
    url: String,
    client: Client,
    update_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl HttpConfigProvider {
    /// Must be called inside a tokio runtime: the polling task starts immediately.
    pub fn new(url: String, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let poll_client = client.clone();
        let poll_url = url.clone();
        tokio::spawn(async move {
            let mut last_hash: Option<u64> = None;
            let mut interval = tokio::time::interval(poll_interval);

            loop {
                interval.tick().await;
                if tx.is_closed() {
                    break;
                }

                match Self::fetch_body(&poll_client, &poll_url).await {
                    Ok(body) => {
                        let mut hasher = DefaultHasher::new();
                        body.hash(&mut hasher);
                        let new_hash = hasher.finish();

                        match last_hash {
                            Some(last) if last != new_hash => {
                                tracing::info!(url = %poll_url, "Remote configuration changed");
                                let _ = tx.try_send(());
                                last_hash = Some(new_hash);
                            }
                            Some(_) => {}
                            None => last_hash = Some(new_hash),
                        }
                    }
                    Err(e) => tracing::warn!(url = %poll_url, "Failed to poll remote config: {e:#}"),
                }
            }
            tracing::debug!(url = %poll_url, "Remote config poller stopped");
        });

        Self {
            url,
            client,
            update_rx: Mutex::new(Some(rx)),
        }
    }

    async fn fetch_body(client: &Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?
            .error_for_status()
            .context("Config server returned an error status")?;
        resp.text().await.context("Failed to read config body")
    }
}

#[async_trait]
impl ConfigProvider for HttpConfigProvider {
    async fn load_config(&self) -> Result<GatewayConfig> {
        let body = Self::fetch_body(&self.client, &self.url).await?;
        parse_json_config(&body)
    }

    fn watch(&self) -> Result<mpsc::Receiver<()>> {
        self.update_rx
            .lock()
            .take()
            .ok_or_else(|| eyre::eyre!("Config watch channel already taken"))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
