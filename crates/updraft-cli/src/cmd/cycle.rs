use crate::output::{print_fields, print_json};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use updraft_core::orchestrator::{
    Clock, CycleReport, Decision, ManualClock, SystemClock, UpdateOrchestrator,
};

/// One update cycle, then exit. `on` pins the date the cycle sees; the time
/// of day stays the current one.
pub fn run(config_path: &Path, on: Option<NaiveDate>, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let clock: Arc<dyn Clock> = match on {
        Some(day) => Arc::new(ManualClock::new(day.and_time(Local::now().time()))),
        None => Arc::new(SystemClock),
    };
    let orch =
        UpdateOrchestrator::from_config(config, clock).context("cannot initialize update agent")?;
    let report = orch.run_cycle().context("update cycle failed")?;

    if json {
        print_json(&to_json(&report))
    } else {
        print_fields(&fields(&report));
        Ok(())
    }
}

fn decision_text(decision: &Decision) -> String {
    match decision {
        Decision::Attempt(plan) => format!("attempt ({:?})", plan.trigger).to_lowercase(),
        Decision::Idle(reason) => format!("idle: {reason}"),
    }
}

fn fields(report: &CycleReport) -> Vec<(&'static str, String)> {
    vec![
        ("identity", report.identity.code.clone()),
        ("group", report.identity.group.clone()),
        ("artifact", report.artifact.file_name.clone()),
        ("decision", decision_text(&report.decision)),
        (
            "outcome",
            report
                .outcome
                .as_ref()
                .map(|o| match o.detail() {
                    Some(d) => format!("{} ({d})", o.status()),
                    None => o.status().to_string(),
                })
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("synced", report.synced.to_string()),
    ]
}

fn to_json(report: &CycleReport) -> serde_json::Value {
    serde_json::json!({
        "identity": report.identity.code,
        "group": report.identity.group,
        "artifact": report.artifact.file_name,
        "size": report.artifact.size,
        "sha256": report.artifact.digest,
        "decision": decision_text(&report.decision),
        "status": report.outcome.as_ref().map(|o| o.status().to_string()),
        "error": report.outcome.as_ref().and_then(|o| o.detail()),
        "synced": report.synced,
    })
}
