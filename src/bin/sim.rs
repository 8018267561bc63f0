//! HuntLink Simulator
//!
//! Walks a scripted group against a running relay so alert behavior can be
//! watched end to end: a stationary shooter declares an active zone, walker
//! members drift toward it with jitter, and every alert the shooter's
//! session raises is printed as it fires.
//!
//! # Usage
//!
//! ```bash
//! huntlink-sim --server ws://localhost:8080 --members 2 --steps 30
//! huntlink-sim --group elk-camp --center 46.81,-71.20 --zone-range 300
//! ```

use clap::Parser;
use rand::Rng;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hunt_link_core::geo;
use hunt_link_core::{GroupSession, Position, SessionConfig, SessionEvent, ZoneParams};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "huntlink-sim")]
#[command(version)]
#[command(about = "Scripted hunting group for exercising a relay")]
struct Cli {
    /// Relay URL
    #[arg(long, default_value = "ws://localhost:8080")]
    server: String,

    /// Group to join
    #[arg(long, default_value = "sim")]
    group: String,

    /// Number of walking members (a stationary shooter joins too)
    #[arg(long, default_value_t = 2)]
    members: u32,

    /// Base coordinate, "lat,lng"
    #[arg(long, default_value = "46.8100,-71.2000")]
    center: String,

    /// Walk steps before the group leaves
    #[arg(long, default_value_t = 30)]
    steps: u32,

    /// Seconds between steps
    #[arg(long, default_value_t = 2)]
    step_secs: u64,

    /// Zone reach in meters for the shooter
    #[arg(long, default_value_t = 300.0)]
    zone_range: f64,
}

fn parse_center(text: &str) -> Option<Position> {
    let mut parts = text.splitn(2, ',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lng: f64 = parts.next()?.trim().parse().ok()?;
    Some(Position::new(lat, lng))
}

// ============================================================================
// Walkers
// ============================================================================

/// Distance from the shooter at which walkers start.
const SCATTER_M: f64 = 400.0;

async fn run_walker(
    server: String,
    group: String,
    user: String,
    center: Position,
    steps: u32,
    step_secs: u64,
) {
    let mut config = SessionConfig::new(server, group, user.clone());
    config.tracking.auto_start = true;
    config.tracking.update_interval_ms = step_secs.max(1) * 1000;
    let (session, feed) = GroupSession::start(config).await;
    let feed = match feed {
        Some(feed) => feed,
        None => return,
    };

    let start_bearing: f64 = rand::rng().random_range(0.0..360.0);
    let scattered = geo::offset(&center, start_bearing, SCATTER_M);
    let mut position = Position::new(scattered.lat, scattered.lng);
    feed.push(position.clone()).await;

    for _ in 0..steps {
        tokio::time::sleep(Duration::from_secs(step_secs)).await;
        // Drift toward the shooter with jitter so cone crossings happen.
        let toward = geo::bearing_degrees(&position, &center);
        let bearing = toward + rand::rng().random_range(-50.0..50.0);
        let step_m = rand::rng().random_range(15.0..35.0);
        let next = geo::offset(&position, bearing, step_m);
        position = Position::new(next.lat, next.lng);
        feed.push(position.clone()).await;
    }

    session.stop().await;
    println!("· {} finished the walk", user);
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huntlink_sim=info,hunt_link_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let center = match parse_center(&cli.center) {
        Some(center) => center,
        None => {
            eprintln!("Error: --center expects 'lat,lng', got '{}'", cli.center);
            std::process::exit(1);
        }
    };

    println!(
        "Simulating group '{}' on {} ({} walker(s), {} steps)",
        cli.group, cli.server, cli.members, cli.steps
    );

    // Shooter: stationary, facing east, zone declared immediately.
    let mut config = SessionConfig::new(cli.server.clone(), cli.group.clone(), "shooter");
    config.tracking.auto_start = true;
    config.tracking.update_interval_ms = cli.step_secs.max(1) * 1000;
    config.monitor.interval = Duration::from_secs(1);
    let (shooter, feed) = GroupSession::start(config).await;
    let shooter_feed = match feed {
        Some(feed) => feed,
        None => {
            eprintln!("Error: tracking feed unavailable");
            std::process::exit(1);
        }
    };
    shooter_feed.push(center.clone()).await;

    let params = ZoneParams::new(center.clone(), 90.0, 60.0, cli.zone_range);
    match shooter.set_zone(params).await {
        Ok(zone) => println!(
            "✓ shooter declared an active zone (bearing {:.0}°, {:.0} m)",
            zone.direction_deg, zone.range_m
        ),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    // Print every alert the shooter's session raises.
    let mut shooter_events = shooter.subscribe();
    let printer = tokio::spawn(async move {
        let mut alerts = 0usize;
        while let Ok(event) = shooter_events.recv().await {
            if let SessionEvent::Alert { alert, .. } = event {
                alerts += 1;
                println!(
                    "⚠ shooter [{}] {}: {}",
                    alert.severity,
                    alert
                        .data
                        .get("finding")
                        .and_then(|v| v.as_str())
                        .unwrap_or("alert"),
                    alert.member_id.as_deref().unwrap_or("-")
                );
            }
        }
        alerts
    });

    let mut walkers = Vec::new();
    for index in 1..=cli.members {
        walkers.push(tokio::spawn(run_walker(
            cli.server.clone(),
            cli.group.clone(),
            format!("walker-{}", index),
            center.clone(),
            cli.steps,
            cli.step_secs,
        )));
    }

    for walker in walkers {
        let _ = walker.await;
    }

    shooter.stop().await;
    let alerts = printer.await.unwrap_or(0);
    println!("\nDone: {} alert(s) on the shooter", alerts);
}
