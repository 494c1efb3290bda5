use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use updraft_core::orchestrator::{SystemClock, UpdateOrchestrator};
use updraft_core::self_update::{SelfUpdateOutcome, SelfUpdater};

/// Run the agent: startup gate, self-update, then the update loop forever.
/// Returns only when a new agent build was launched in this process's place.
pub fn run(config_path: &Path, silent: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let orch = UpdateOrchestrator::from_config(config, Arc::new(SystemClock))
        .context("cannot initialize update agent")?;

    if !silent {
        println!(
            "updraft agent → {}  (PID {})",
            orch.config().server_url,
            std::process::id()
        );
    }

    orch.wait_for_startup();

    match self_update(&orch, config_path) {
        Ok(true) => {
            info!("exiting in favour of the new agent build");
            return Ok(());
        }
        Ok(false) => {}
        // The current build keeps running; the next start retries.
        Err(e) => error!(error = %format!("{e:#}"), "self-update failed"),
    }

    orch.run_forever()
}

fn self_update(orch: &UpdateOrchestrator, config_path: &Path) -> Result<bool> {
    let updater = SelfUpdater::new(orch.transfer(), orch.config())?;
    match updater.check()? {
        SelfUpdateOutcome::UpToDate => Ok(false),
        SelfUpdateOutcome::Replaced { exe } => {
            info!(exe = %exe.display(), "relaunching");
            updater.relaunch(&relaunch_args(config_path))?;
            Ok(true)
        }
    }
}

fn relaunch_args(config_path: &Path) -> Vec<String> {
    vec![
        "--config".to_string(),
        config_path.display().to_string(),
        "agent".to_string(),
        "--silent".to_string(),
    ]
}
