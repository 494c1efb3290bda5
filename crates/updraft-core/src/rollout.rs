//! Forced-rollout detection.
//!
//! A force flag is a small file on the delivery server; its existence is
//! the signal. Flags are checked most-specific first and the first hit wins.
//! Once a forced cycle has run today, further hits are suppressed until the
//! calendar date changes.

use chrono::NaiveDate;
use tracing::info;

use crate::config::AgentConfig;
use crate::transfer::TransferEngine;
use crate::types::{ClientIdentity, ForceScope};

/// Outcome of a force check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceDecision {
    /// No flag exists for this client.
    NotFlagged,
    /// A flag exists but a forced cycle already ran today.
    Suppressed(ForceScope),
    /// A flag exists and should be honored now.
    Force(ForceScope),
}

/// Existence check for a flag URL. Implemented by [`TransferEngine`];
/// tests substitute a set of present flags.
pub trait FlagSource {
    fn exists(&self, url: &str) -> bool;
}

impl FlagSource for TransferEngine {
    fn exists(&self, url: &str) -> bool {
        self.is_published(url)
    }
}

pub struct RolloutSignal<'a, P: FlagSource + ?Sized> {
    flags: &'a P,
    config: &'a AgentConfig,
}

impl<'a, P: FlagSource + ?Sized> RolloutSignal<'a, P> {
    pub fn new(flags: &'a P, config: &'a AgentConfig) -> Self {
        Self { flags, config }
    }

    /// First scope whose flag exists, in identity → group → global order.
    pub fn active_scope(&self, identity: &ClientIdentity) -> Option<ForceScope> {
        ForceScope::lookup_order(identity)
            .into_iter()
            .find(|scope| self.flags.exists(&self.config.file_url(&scope.flag_file_name())))
    }

    /// `last_honored` is the SuppressionRecord: the date a forced cycle last ran.
    pub fn should_force(
        &self,
        identity: &ClientIdentity,
        last_honored: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ForceDecision {
        let Some(scope) = self.active_scope(identity) else {
            return ForceDecision::NotFlagged;
        };
        if last_honored == Some(today) {
            return ForceDecision::Suppressed(scope);
        }
        info!(%scope, "force trigger detected");
        ForceDecision::Force(scope)
    }
}
