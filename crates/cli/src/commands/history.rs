//! Report history CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HistoryRecord};
use crate::output::{
    color_count, color_percentage, color_status, format_timestamp, print_info, print_json,
    print_table, print_warning, OutputFormat,
};

/// Row for the history table
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Deploys")]
    total: i64,
    #[tabled(rename = "Zero Ready")]
    zero_replicas: String,
    #[tabled(rename = "CrashLoop")]
    crashloop: String,
    #[tabled(rename = "Restarted")]
    restarted: String,
    #[tabled(rename = "CPU Used")]
    cpu_used: String,
    #[tabled(rename = "CPU Req")]
    cpu_requested: String,
    #[tabled(rename = "Mem Used")]
    memory_used: String,
    #[tabled(rename = "Mem Req")]
    memory_requested: String,
    #[tabled(rename = "Node Issues")]
    node_issues: String,
}

impl From<&HistoryRecord> for HistoryRow {
    fn from(r: &HistoryRecord) -> Self {
        Self {
            timestamp: format_timestamp(&r.timestamp),
            total: r.total_deployments,
            zero_replicas: color_count(r.deployments_with_zero_replicas),
            crashloop: color_count(r.deployments_with_crashloopbackoff),
            restarted: color_count(r.deployments_with_recent_start),
            cpu_used: color_percentage(r.cpu_used_percentage),
            cpu_requested: color_percentage(r.cpu_requested_percentage),
            memory_used: color_percentage(r.memory_used_percentage),
            memory_requested: color_percentage(r.memory_requested_percentage),
            node_issues: color_count(r.node_issues.len() as i64),
        }
    }
}

/// Row for the node issues table
#[derive(Tabled)]
struct NodeIssueRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Ready")]
    status: String,
}

/// Show the snapshots of the last `hours` hours
pub async fn show_history(client: &ApiClient, hours: u64, format: OutputFormat) -> Result<()> {
    let records = client.history(hours).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            println!("{}", format!("Cluster history (last {}h)", hours).bold());
            let rows: Vec<HistoryRow> = records.iter().map(HistoryRow::from).collect();
            let total = rows.len();
            print_table(rows, "No snapshots recorded in this window");
            if total > 0 {
                println!("\nTotal: {} snapshots", total);
            }
        }
    }

    Ok(())
}

/// Show the most recent snapshot in detail
pub async fn show_latest(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let Some(record) = client.latest().await? else {
        print_warning("No snapshot recorded yet");
        print_info("The agent stores its first snapshot after one monitoring cycle.");
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Table => {
            println!("{}", "Latest snapshot".bold());
            println!("{}", "=".repeat(50));
            println!("Recorded:               {}", format_timestamp(&record.timestamp));
            println!();
            println!("{}", "Deployments".bold());
            println!("{}", "-".repeat(50));
            println!("Total:                  {}", record.total_deployments);
            println!("With ready replicas:    {}", record.deployments_with_replicas);
            println!(
                "Zero ready replicas:    {}",
                color_count(record.deployments_with_zero_replicas)
            );
            println!("Exact replicas:         {}", record.deployments_with_exact_replicas);
            println!(
                "CrashLoopBackOff:       {}",
                color_count(record.deployments_with_crashloopbackoff)
            );
            println!(
                "Recently restarted:     {}",
                color_count(record.deployments_with_recent_start)
            );
            println!();
            println!("{}", "Resources".bold());
            println!("{}", "-".repeat(50));
            println!("CPU used:               {}", color_percentage(record.cpu_used_percentage));
            println!(
                "CPU requested:          {}",
                color_percentage(record.cpu_requested_percentage)
            );
            println!(
                "Memory used:            {}",
                color_percentage(record.memory_used_percentage)
            );
            println!(
                "Memory requested:       {}",
                color_percentage(record.memory_requested_percentage)
            );
            println!();
            println!(
                "Node issues:            {}",
                color_count(record.node_issues.len() as i64)
            );
            println!(
                "Zombie processes:       {}",
                color_count(record.zombie_processes.len() as i64)
            );
        }
    }

    Ok(())
}

/// Show the node issues of the most recent snapshot
pub async fn show_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let Some(record) = client.latest().await? else {
        print_warning("No snapshot recorded yet");
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&record.node_issues)?,
        OutputFormat::Table => {
            println!(
                "{} ({})",
                "Nodes with issues".bold(),
                format_timestamp(&record.timestamp)
            );
            let rows: Vec<NodeIssueRow> = record
                .node_issues
                .iter()
                .map(|issue| NodeIssueRow {
                    name: issue.name.clone(),
                    status: color_status(&issue.status),
                })
                .collect();
            print_table(rows, "All nodes report Ready");
            if !record.node_issues.is_empty() {
                print_info("Use --format json to see the full node descriptions");
            }
        }
    }

    Ok(())
}
