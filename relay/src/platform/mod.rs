//! Deployment platform client

pub mod client;
