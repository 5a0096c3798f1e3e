use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    config::{loader::load_config, models::GatewayConfig},
    ports::config_provider::ConfigProvider,
};

/// Loads the route file from disk and watches its directory for edits.
pub struct FileConfigProvider {
    path: PathBuf,
    // Dropping the watcher stops notifications
    _watcher: notify::RecommendedWatcher,
    update_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let config_filename = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid config path: {}", path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&config_filename))
                        {
                            tracing::debug!(kind = ?event.kind, "Route file changed");
                            // A full channel already holds a pending reload
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Route file watch error"),
                }
            })
            .wrap_err("Failed to create file watcher")?;

        let watch_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("Failed to watch {}", watch_dir.display()))?;

        Ok(Self {
            path,
            _watcher: watcher,
            update_rx: Mutex::new(Some(rx)),
        })
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<GatewayConfig> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", self.path.display()))?;
        load_config(path_str).await
    }

    fn watch(&self) -> Result<mpsc::Receiver<()>> {
        self.update_rx
            .lock()
            .take()
            .ok_or_else(|| eyre::eyre!("Config watch channel already taken"))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::tempdir;
    use tokio::time::{Duration, sleep};

    use super::*;

    fn write(path: &Path, content: &str) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    #[tokio::test]
    async fn test_file_config_provider() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("routes.json");

        write(
            &file_path,
            r#"{ "listen_addr": "127.0.0.1:8080",
                 "routes": [ { "name": "api", "path_prefix": "/api", "upstreams": ["http://127.0.0.1:9001"] } ] }"#,
        )?;

        let provider = FileConfigProvider::new(&file_path)?;
        let config = provider.load_config().await?;
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert!(config.routes[0].id.starts_with("api@"));

        let mut rx = provider.watch()?;
        assert!(provider.watch().is_err());

        sleep(Duration::from_millis(100)).await;
        write(
            &file_path,
            r#"{ "listen_addr": "127.0.0.1:9090", "routes": [] }"#,
        )?;

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(notification.is_ok(), "Timed out waiting for config update");
        assert!(notification.unwrap().is_some(), "Channel closed unexpectedly");

        let config = provider.load_config().await?;
        assert_eq!(config.listen_addr, "127.0.0.1:9090");
        assert!(config.routes.is_empty());

        Ok(())
    }

    #[test]
    fn test_rejects_path_without_file_name() {
        assert!(FileConfigProvider::new("/").is_err());
    }
}
