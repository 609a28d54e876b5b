//! Read-only health detectors
//!
//! Each detector is a pure filter or count over one API listing, paired with
//! an async wrapper that fetches the listing from a [`ClusterSource`].
//!
//! [`ClusterSource`]: crate::source::ClusterSource

mod deployments;
mod status;
mod zombies;

#[cfg(test)]
mod tests;

pub use deployments::{
    count_deployments, count_with_exact_replicas, count_with_replicas, count_with_zero_replicas,
    crashlooping_apps, deployment_name_from_replicaset, deployments_count,
    deployments_with_crashloopbackoff, deployments_with_exact_replicas,
    deployments_with_recent_restarts, deployments_with_replicas, deployments_with_zero_replicas,
    recently_restarted_deployments, CrashLoopApp, CrashLoopJoin, LabelJoin, APP_LABEL_KEYS,
    RECENT_RESTART_WINDOW_MINUTES,
};
pub use status::{
    detect_nodes_with_issues, nodes_with_issues, semaphore_status, summarize_unusual_events,
    unusual_events, MAX_UNUSUAL_EVENTS,
};
pub use zombies::{
    detect_zombie_processes, inspectable_pods, parse_proc_scan, DEFAULT_MIN_POD_AGE_SECS,
};
