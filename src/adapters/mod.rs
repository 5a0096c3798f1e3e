pub mod config_providers;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use config_providers::{FileConfigProvider, HttpConfigProvider};
pub use http_client::HttpClientAdapter;
pub use http_handler::{GatewayHandler, router};
