use crate::output::{print_fields, print_json};
use anyhow::{Context, Result};
use std::path::Path;
use updraft_core::transfer::TransferEngine;

/// One-shot resumable download using the agent's configured timeouts.
pub fn run(config_path: &Path, url: &str, dest: &Path, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let engine = TransferEngine::from_config(&config)?;
    let state = engine
        .fetch(url, dest)
        .with_context(|| format!("fetch {url} failed"))?;

    if json {
        print_json(&serde_json::json!({
            "destination": state.destination,
            "bytes": state.bytes_on_disk,
            "total": state.total,
            "complete": state.complete,
        }))
    } else {
        print_fields(&[
            ("destination", state.destination.display().to_string()),
            ("bytes", state.bytes_on_disk.to_string()),
            (
                "total",
                state.total.map(|t| t.to_string()).unwrap_or_else(|| "?".into()),
            ),
        ]);
        Ok(())
    }
}
