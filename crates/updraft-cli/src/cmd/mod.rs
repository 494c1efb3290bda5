pub mod agent;
pub mod cycle;
pub mod digest;
pub mod fetch;
pub mod serve;

use anyhow::{Context, Result};
use std::path::Path;
use updraft_core::config::AgentConfig;

/// Load the agent configuration; a missing file yields defaults.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    AgentConfig::load(path).with_context(|| format!("cannot load config {}", path.display()))
}
