//! Engine configuration loader for devflow.
//!
//! Reads `config.toml` from the data directory (`~/.devflow/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use devflow_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DEVFLOW_DATA_DIR";

/// Resolve the devflow data directory.
///
/// `DEVFLOW_DATA_DIR` wins; otherwise `~/.devflow`.
pub fn resolve_data_dir() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".devflow"))
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Workspace root for file and git steps.
///
/// The configured `workspace_dir` when set, else `{data_dir}/workspace`.
pub fn resolve_workspace_dir(config: &EngineConfig, data_dir: &Path) -> PathBuf {
    config
        .workspace_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("workspace"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::config::BackoffPolicy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
event_capacity = 64
http_timeout_secs = 5
workspace_dir = "/srv/devflow"

[retry_backoff]
kind = "exponential"
initial_ms = 100
max_ms = 2000
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.http_timeout_secs, 5);
        assert_eq!(config.workspace_dir, Some(PathBuf::from("/srv/devflow")));
        assert_eq!(
            config.retry_backoff,
            BackoffPolicy::Exponential {
                initial_ms: 100,
                multiplier: 2.0,
                max_ms: 2000
            }
        );
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn workspace_dir_defaults_under_data_dir() {
        let data = Path::new("/data");
        assert_eq!(
            resolve_workspace_dir(&EngineConfig::default(), data),
            PathBuf::from("/data/workspace")
        );

        let config = EngineConfig {
            workspace_dir: Some(PathBuf::from("/elsewhere")),
            ..EngineConfig::default()
        };
        assert_eq!(resolve_workspace_dir(&config, data), PathBuf::from("/elsewhere"));
    }
}
