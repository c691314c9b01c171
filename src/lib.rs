//! Beachfront job lifecycle orchestrator
//!
//! This library dispatches shoreline detection jobs to a remote execution
//! platform and runs the background worker that polls them until each one
//! reaches a terminal status.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
