pub mod apply;
pub mod config;
pub mod digest;
pub mod error;
pub mod history;
pub mod identity;
pub mod io;
pub mod markers;
pub mod orchestrator;
pub mod paths;
pub mod report;
pub mod rollout;
pub mod self_update;
pub mod transfer;
pub mod types;

pub use error::{Result, UpdraftError};
