pub mod digest;
pub mod files;
pub mod force;
pub mod health;
pub mod log;
