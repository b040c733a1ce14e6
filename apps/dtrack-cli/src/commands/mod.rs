//! CLI command implementations

pub mod apply;
pub mod plan;
pub mod validate;

use std::env::VarError;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Args;
use dtrack_api::{ClientConfig, DependencyTrackApi, DependencyTrackClient};
use dtrack_reconcile::DesiredState;
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Server connection options. Flags take precedence over `DTRACK_*` variables.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Dependency-Track base URL (overrides DTRACK_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// API key (overrides DTRACK_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,
}

impl ConnectionArgs {
    /// Resolve the client configuration from flags and the environment.
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        self.client_config_with(|key| std::env::var(key))
    }

    /// Resolve the client configuration from flags layered over `env`.
    pub fn client_config_with<F>(&self, env: F) -> CliResult<ClientConfig>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let config = ClientConfig::from_reader(|key| match key {
            "DTRACK_URL" if self.url.is_some() => Ok(self.url.clone().unwrap_or_default()),
            "DTRACK_API_KEY" if self.api_key.is_some() => {
                Ok(self.api_key.clone().unwrap_or_default())
            }
            _ => env(key),
        })?;
        debug!(config = ?config, "Resolved client configuration");
        Ok(config)
    }

    /// Build an API client.
    pub fn connect(&self) -> CliResult<Arc<dyn DependencyTrackApi>> {
        let client = DependencyTrackClient::new(&self.client_config()?)?;
        Ok(Arc::new(client))
    }
}

/// Load and parse a desired-state file (YAML or JSON).
pub fn load_desired(path: &Path) -> CliResult<DesiredState> {
    if !path.exists() {
        return Err(CliError::Validation(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("Failed to read file {}: {}", path.display(), e)))?;

    let desired = DesiredState::from_yaml_str(&content)?;
    debug!(
        path = %path.display(),
        items = desired.item_count(),
        "Loaded desired state"
    );
    Ok(desired)
}
