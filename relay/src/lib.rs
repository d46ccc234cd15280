//! Deploy Relay Library
//!
//! Core modules for relaying repository events into hosted deployments.

pub mod config;
pub mod deploy;
pub mod errors;
pub mod http;
pub mod logs;
pub mod models;
pub mod platform;
pub mod trigger;
pub mod utils;
