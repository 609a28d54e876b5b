//! Core library for the k8spulse cluster health agent
//!
//! This crate provides:
//! - Deployment, node, event and zombie-process detectors
//! - Cluster-wide resource aggregation from capacity, requests and usage
//! - SQLite-backed report history
//! - Static HTML report and index rendering
//! - Recommendation, audit-event and git publishing collaborators
//! - The monitoring cycle, its loop, health checks and metrics

pub mod collaborators;
pub mod cycle;
pub mod detector;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod report;
pub mod resources;
pub mod source;

pub use cycle::{CycleConfig, CycleError, MonitorCycle, MonitorCycleBuilder, MonitorLoop};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{HistoryStore, StoreError};
pub use models::*;
pub use observability::{PulseMetrics, StructuredLogger};
pub use source::{ClusterSource, KubeSource};
