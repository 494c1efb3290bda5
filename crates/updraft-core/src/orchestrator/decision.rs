//! Whether this cycle attempts an update. Pure: every input is passed in,
//! nothing is read from disk or the network here.

use chrono::{Datelike, NaiveDate};

use crate::markers::CycleState;
use crate::rollout::ForceDecision;
use crate::types::ForceScope;

/// Why an attempt is made. Earlier variants take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    FirstRun,
    Forced,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub trigger: Trigger,
    /// Only scheduled-only attempts check availability before fetching.
    pub check_first: bool,
    /// Set when a force flag is being honored; the suppression record is
    /// written after the attempt whatever its outcome.
    pub forced: Option<ForceScope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Attempt(Plan),
    Idle(&'static str),
}

pub fn decide(
    state: &CycleState,
    force: &ForceDecision,
    today: NaiveDate,
    scheduled_day: u32,
    artifact: &str,
) -> Decision {
    let forced = match force {
        ForceDecision::Force(scope) => Some(scope.clone()),
        _ => None,
    };

    if !state.first_run_done {
        return Decision::Attempt(Plan {
            trigger: Trigger::FirstRun,
            check_first: false,
            forced,
        });
    }
    if forced.is_some() {
        return Decision::Attempt(Plan {
            trigger: Trigger::Forced,
            check_first: false,
            forced,
        });
    }
    if today.day() != scheduled_day {
        return Decision::Idle(match force {
            ForceDecision::Suppressed(_) => "forced update already ran today",
            _ => "not the scheduled day",
        });
    }
    if state.last_applied.as_deref() == Some(artifact) {
        return Decision::Idle("artifact already applied");
    }
    Decision::Attempt(Plan {
        trigger: Trigger::Scheduled,
        check_first: true,
        forced: None,
    })
}
