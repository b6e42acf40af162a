pub mod agent_core;
pub mod inference;
pub mod logging;

use std::sync::Arc;
use std::time::Duration;

use agent_core::{AdminAgent, AgentError, MetadataFetcher, SiteDatabase, ToolRouter};
use inference::config::{expand_tilde, DatabaseConfig};
use inference::{AgentConfig, EnvCredentials, HttpTransport};

/// Resolve the SQLite path from config.
///
/// `:memory:` passes through; anything else gets `~` expanded and its parent
/// directory created.
fn resolve_db_path(config: &DatabaseConfig) -> String {
    if config.path == ":memory:" {
        return config.path.clone();
    }
    let path = std::path::PathBuf::from(expand_tilde(&config.path));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(parent);
    }
    path.to_string_lossy().into_owned()
}

/// Build a production agent: HTTP transport, credentials from the
/// environment, and the SQLite store named in the config.
pub fn build_agent(config: AgentConfig) -> Result<AdminAgent, AgentError> {
    let db_path = resolve_db_path(&config.database);
    let db = SiteDatabase::open(&db_path)?;
    tracing::info!(db_path = %db_path, "site database initialized");

    let metadata = MetadataFetcher::new(Duration::from_millis(config.timeouts.metadata_fetch_ms))?;
    let tools = ToolRouter::new(db, metadata);

    let agent = AdminAgent::new(
        Arc::new(config),
        Arc::new(HttpTransport::new()?),
        Arc::new(EnvCredentials),
        tools,
    )?;
    Ok(agent)
}
