//! k8spulse agent: HTTP surface and configuration for the monitoring daemon

pub mod api;
pub mod config;
