pub mod classify;
pub mod config;
pub mod entity;
pub mod errors;
pub mod logging;
pub mod migrator_config;
pub mod ops;
pub mod orchestrator;
pub mod record;
pub mod retry;
pub mod ui;
