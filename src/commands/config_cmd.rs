use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("server_url: {}", config.server_url.value);
                        println!("  source: {}", config.server_url.source);
                        println!();

                        println!("group_id: {}", config.group_id.value);
                        println!("  source: {}", config.group_id.source);
                        println!();

                        println!("user_id: {}", config.user_id.value);
                        println!("  source: {}", config.user_id.source);
                        println!();

                        if let Some(name) = &config.display_name {
                            println!("display_name: {}", name);
                            println!();
                        }

                        println!(
                            "safety.check_interval_secs: {}",
                            config.safety.check_interval_secs
                        );
                        println!("tracking.mode: {}", config.tracking.mode);
                        println!("tracking.auto_start: {}", config.tracking.auto_start);
                        println!(
                            "tracking.update_interval_ms: {}",
                            config.tracking.update_interval_ms
                        );
                        println!(
                            "tracking.share_exact_position: {}",
                            config.tracking.share_exact_position
                        );
                        println!(
                            "alerts.proximity_threshold_m: {}",
                            config.alerts.proximity_threshold_m
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'huntlink config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Write default config
                let default_config = r#"# huntlink configuration

# Relay server URL
server_url: ws://localhost:8080

# Group and member identity
group_id: default
user_id: default
# display_name: Dana

# Safety evaluation
# safety:
#   check_interval_secs: 5

# Position sharing
# tracking:
#   auto_start: false
#   mode: auto
#   update_interval_ms: 30000
#   share_exact_position: true

# Notifications
# alerts:
#   sound_enabled: true
#   proximity_threshold_m: 200.0
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
