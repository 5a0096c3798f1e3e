use async_trait::async_trait;
use eyre::Result;
use tokio::sync::mpsc;

use crate::config::models::GatewayConfig;

/// Source of gateway configuration that can announce changes.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Load the current configuration.
    async fn load_config(&self) -> Result<GatewayConfig>;

    /// Take the change notification channel. Each notification means "load again".
    ///
    /// The channel can be taken once; later calls return an error.
    fn watch(&self) -> Result<mpsc::Receiver<()>>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}
