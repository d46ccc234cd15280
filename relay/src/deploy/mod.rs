//! Deployment configuration and orchestration

pub mod config;
pub mod orchestrator;
