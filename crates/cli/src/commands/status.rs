//! Agent status command

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, OutputFormat};

/// Row for the component table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the agent's health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("Status:                 {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:              {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:                 {}", reason);
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(rows, "No components registered");
        }
    }

    Ok(())
}
