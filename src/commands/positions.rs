//! One-shot position listing over the tracking API.

use chrono::{DateTime, Utc};
use clap::Args;

use hunt_link_core::TrackingApi;

use crate::config::Config;

/// List the latest known member positions
#[derive(Debug, Args)]
pub struct PositionsCommand {
    /// Override the configured group
    #[arg(long)]
    group: Option<String>,
}

impl PositionsCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.fetch(config))
    }

    async fn fetch(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let group = self
            .group
            .clone()
            .unwrap_or_else(|| config.group_id.value.clone());
        let api = TrackingApi::new(config.server_url.value.clone());
        let positions = api.group_positions(&group, &config.user_id.value).await?;

        if positions.is_empty() {
            println!("No positions reported for group '{}'.", group);
            return Ok(());
        }

        println!("Group '{}': {} member(s)\n", group, positions.len());
        for member in positions {
            println!(
                "  {:<16} {:>10.5}, {:>10.5}  {}",
                member.user_id,
                member.position.lat,
                member.position.lng,
                age(&member.position.timestamp)
            );
        }
        Ok(())
    }
}

pub(crate) fn age(timestamp: &DateTime<Utc>) -> String {
    let secs = (Utc::now() - *timestamp).num_seconds().max(0);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
