use crate::ports::{AppConfig, ConfigError, ConfigResult, ConfigStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

// Every field is optional so partial files keep working.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
    stale_after_seconds: Option<u64>,
    serialize_task_mutations: Option<bool>,
    log_file: Option<PathBuf>,
}

impl ConfigFile {
    fn into_config(self) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            request_timeout_seconds: self
                .request_timeout_seconds
                .unwrap_or(defaults.request_timeout_seconds),
            stale_after_seconds: self.stale_after_seconds.unwrap_or(defaults.stale_after_seconds),
            serialize_task_mutations: self
                .serialize_task_mutations
                .unwrap_or(defaults.serialize_task_mutations),
            log_file: self.log_file.unwrap_or(defaults.log_file),
        }
    }
}

impl From<&AppConfig> for ConfigFile {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: Some(config.base_url.clone()),
            request_timeout_seconds: Some(config.request_timeout_seconds),
            stale_after_seconds: Some(config.stale_after_seconds),
            serialize_task_mutations: Some(config.serialize_task_mutations),
            log_file: Some(config.log_file.clone()),
        }
    }
}

/// JSON configuration at `<config dir>/todo-cli/config.json`.
pub struct FileConfigStore {
    config_path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> ConfigResult<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::ReadError("Cannot determine config directory".to_string())
        })?;

        Ok(Self::with_path(config_dir.join("todo-cli").join("config.json")))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    async fn ensure_config_dir(&self) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load_config(&self) -> ConfigResult<AppConfig> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "No config at {}, using defaults",
                    self.config_path.display()
                );
                return Ok(AppConfig::default());
            }
            Err(e) => return Err(ConfigError::ReadError(e.to_string())),
        };

        let config_file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        Ok(config_file.into_config())
    }

    async fn save_config(&self, config: &AppConfig) -> ConfigResult<()> {
        self.ensure_config_dir().await?;

        let content = serde_json::to_string_pretty(&ConfigFile::from(config))
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .await
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        tracing::info!("Saved config to {}", self.config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> FileConfigStore {
        let dir = std::env::temp_dir().join(format!("todo-cli-test-{}", uuid::Uuid::new_v4()));
        FileConfigStore::with_path(dir.join("config.json"))
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let store = scratch_store();
        assert_eq!(store.load_config().await.unwrap(), AppConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = scratch_store();
        let config = AppConfig {
            base_url: "http://todo.internal:9000".to_string(),
            stale_after_seconds: 60,
            serialize_task_mutations: false,
            ..AppConfig::default()
        };

        store.save_config(&config).await.unwrap();
        assert_eq!(store.load_config().await.unwrap(), config);

        if let Some(dir) = store.path().parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_partial_file_fills_in_defaults() {
        let store = scratch_store();
        store.ensure_config_dir().await.unwrap();
        std::fs::write(store.path(), r#"{"base_url":"http://example.test"}"#).unwrap();

        let config = store.load_config().await.unwrap();
        assert_eq!(config.base_url, "http://example.test");
        assert_eq!(config.request_timeout_seconds, 30);
        assert!(config.serialize_task_mutations);

        if let Some(dir) = store.path().parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() {
        let store = scratch_store();
        store.ensure_config_dir().await.unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        assert!(matches!(
            store.load_config().await,
            Err(ConfigError::InvalidFormat(_))
        ));

        if let Some(dir) = store.path().parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
