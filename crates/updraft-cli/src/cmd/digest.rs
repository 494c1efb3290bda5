use crate::output::print_json;
use anyhow::{Context, Result};
use std::path::Path;
use updraft_core::digest;

pub fn run(path: &Path, json: bool) -> Result<()> {
    let sha = digest::digest_file(path).with_context(|| format!("cannot hash {}", path.display()))?;
    if json {
        let size = std::fs::metadata(path)?.len();
        print_json(&serde_json::json!({
            "file": path.display().to_string(),
            "sha256": sha,
            "size": size,
        }))
    } else {
        println!("{sha}  {}", path.display());
        Ok(())
    }
}
