//! Zombie process detection inside long-lived non-running pods

use crate::models::ZombieProcess;
use crate::source::{ClusterSource, SourceResult};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, warn};

/// Pods younger than this are not inspected
pub const DEFAULT_MIN_POD_AGE_SECS: i64 = 300;

const NON_RUNNING_SELECTOR: &str = "status.phase!=Running";

/// Prints, for every process, its `/proc/<pid>` path followed by the
/// `State:` and `Name:` lines of its status file.
const PROC_SCAN_SCRIPT: &str = r#"for pid in /proc/[0-9]*; do if [ -f "$pid/status" ]; then echo "$pid"; grep "^State:" "$pid/status" || true; grep "^Name:" "$pid/status" || true; fi; done"#;

fn scan_command() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), PROC_SCAN_SCRIPT.to_string()]
}

/// Parse the scan output into `(pid, name)` pairs of processes in state `Z`
pub fn parse_proc_scan(output: &str) -> Vec<(i64, String)> {
    let mut zombies = Vec::new();
    let mut pid: Option<i64> = None;
    let mut state: Option<String> = None;
    let mut name: Option<String> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("/proc/") {
            pid = rest.parse().ok();
            state = None;
            name = None;
        } else if let Some(rest) = line.strip_prefix("State:") {
            state = rest.split_whitespace().next().map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("Name:") {
            name = Some(rest.trim().to_string());
        } else {
            continue;
        }

        if let (Some(p), Some(s), Some(n)) = (pid, state.as_deref(), name.as_ref()) {
            if s == "Z" {
                zombies.push((p, n.clone()));
            }
            pid = None;
            state = None;
            name = None;
        }
    }

    zombies
}

/// Pods started more than `min_age` before `now`
pub fn inspectable_pods(pods: &[Pod], now: DateTime<Utc>, min_age: Duration) -> Vec<&Pod> {
    pods.iter()
        .filter(|pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.start_time.as_ref())
                .map(|start| now - start.0 > min_age)
                .unwrap_or(false)
        })
        .collect()
}

/// Exec a `/proc` scan into every container of long-lived non-running pods.
///
/// Exec failures are logged per container and skipped.
pub async fn detect_zombie_processes(
    source: &dyn ClusterSource,
    now: DateTime<Utc>,
    min_age: Duration,
) -> SourceResult<Vec<ZombieProcess>> {
    let pods = source.list_pods(Some(NON_RUNNING_SELECTOR)).await?;
    let command = scan_command();
    let mut found = Vec::new();

    for pod in inspectable_pods(&pods, now, min_age) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();

        for container in containers {
            debug!(namespace = %namespace, pod = %pod_name, container = %container.name, "Scanning container for zombies");
            let output = match source
                .exec(&namespace, &pod_name, &container.name, &command)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(namespace = %namespace, pod = %pod_name, container = %container.name, error = %e, "Zombie scan failed");
                    continue;
                }
            };

            for (pid, process_name) in parse_proc_scan(&output) {
                info!(namespace = %namespace, pod = %pod_name, container = %container.name, pid = pid, process = %process_name, "Zombie process found");
                found.push(ZombieProcess {
                    namespace: namespace.clone(),
                    pod: pod_name.clone(),
                    container: container.name.clone(),
                    pid,
                    process_name,
                });
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_scan_reports_only_zombies() {
        let output = "/proc/1\nState:\tS (sleeping)\nName:\tinit\n\
                      /proc/42\nState:\tZ (zombie)\nName:\tworker\n\
                      /proc/43\nState:\tR (running)\nName:\tpython3\n\
                      /proc/77\nState:\tZ (zombie)\nName:\tsh\n";

        let zombies = parse_proc_scan(output);
        assert_eq!(zombies, vec![(42, "worker".to_string()), (77, "sh".to_string())]);
    }

    #[test]
    fn test_parse_proc_scan_tolerates_vanished_processes() {
        // /proc/9 disappeared between listing and reading its status
        let output = "/proc/9\n/proc/10\nState:\tZ (zombie)\nName:\tdefunct\n";

        assert_eq!(parse_proc_scan(output), vec![(10, "defunct".to_string())]);
    }

    #[test]
    fn test_parse_proc_scan_empty() {
        assert!(parse_proc_scan("").is_empty());
    }
}
