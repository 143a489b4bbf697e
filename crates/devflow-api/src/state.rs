//! Shared application state.
//!
//! Built once at startup and passed by reference to every command handler.

use std::path::PathBuf;
use std::sync::Arc;

use devflow_core::capability::CapabilityRegistry;
use devflow_core::workflow::{Orchestrator, TemplateCatalog};
use devflow_infra::config::{load_engine_config, resolve_workspace_dir};
use devflow_infra::tools::register_builtin_tools;
use devflow_types::config::EngineConfig;

/// Everything a command needs: configuration, the template catalog and an
/// orchestrator with every built-in tool registered.
pub struct AppState {
    pub data_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub config: EngineConfig,
    pub catalog: TemplateCatalog,
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Create the data and workspace directories, load `config.toml` and
    /// wire up the tool registry.
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;
        let workspace_dir = resolve_workspace_dir(&config, &data_dir);
        tokio::fs::create_dir_all(&workspace_dir).await?;

        let mut registry = CapabilityRegistry::new();
        register_builtin_tools(&mut registry, &config, &workspace_dir)?;
        tracing::debug!(
            tools = registry.len(),
            workspace = %workspace_dir.display(),
            "tool registry ready"
        );

        let catalog = TemplateCatalog::builtin()?;
        let orchestrator = Orchestrator::with_config(Arc::new(registry), config.clone());

        Ok(Self {
            data_dir,
            workspace_dir,
            config,
            catalog,
            orchestrator,
        })
    }
}
