//! Position trail listing over the tracking API.

use clap::Args;

use hunt_link_core::TrackingApi;

use crate::config::Config;

/// Show a member's recent position trail
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Hours of history to fetch
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Member to inspect (defaults to the configured user)
    #[arg(long)]
    user: Option<String>,

    /// Override the configured group
    #[arg(long)]
    group: Option<String>,
}

impl HistoryCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.fetch(config))
    }

    async fn fetch(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let user = self
            .user
            .clone()
            .unwrap_or_else(|| config.user_id.value.clone());
        let group = self
            .group
            .clone()
            .unwrap_or_else(|| config.group_id.value.clone());
        let api = TrackingApi::new(config.server_url.value.clone());
        let trail = api.position_history(&user, &group, self.hours).await?;

        if trail.is_empty() {
            println!(
                "No positions in the last {}h for '{}' in group '{}'.",
                self.hours, user, group
            );
            return Ok(());
        }

        println!(
            "{} position(s) over the last {}h for '{}'\n",
            trail.len(),
            self.hours,
            user
        );
        for position in &trail {
            println!(
                "  {}  {:>10.5}, {:>10.5}",
                position.timestamp.format("%Y-%m-%d %H:%M:%S"),
                position.lat,
                position.lng
            );
        }
        Ok(())
    }
}
