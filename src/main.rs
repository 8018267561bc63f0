use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{ConfigCommand, HistoryCommand, PositionsCommand, RunCommand, ZoneCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "huntlink")]
#[command(version)]
#[command(about = "Group hunting safety and position sharing", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the group and stream safety events
    Run(RunCommand),

    /// Validate and test shooting zones offline
    Zone(ZoneCommand),

    /// List the latest member positions
    Positions(PositionsCommand),

    /// Show a member's position trail
    History(HistoryCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Run(cmd)) => cmd.run(&config)?,
        Some(Commands::Zone(cmd)) => cmd.run()?,
        Some(Commands::Positions(cmd)) => cmd.run(&config)?,
        Some(Commands::History(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
