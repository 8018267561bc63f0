//! Offline zone math: validate parameters, print the sector, test points.

use clap::{Args, Subcommand};

use hunt_link_core::geo;
use hunt_link_core::{Position, ShootingZone, ZoneParams};

use super::run::{parse_coord, ZoneKindArg};

#[derive(Debug, Args)]
pub struct ZoneCommand {
    #[command(subcommand)]
    command: ZoneSubcommand,
}

#[derive(Debug, Subcommand)]
enum ZoneSubcommand {
    /// Validate zone parameters and print the computed sector
    Show {
        /// Shooter position, "lat,lng"
        #[arg(long)]
        center: String,

        /// Facing direction, degrees clockwise from north
        #[arg(long)]
        direction: f64,

        /// Total cone width in degrees
        #[arg(long)]
        aperture: f64,

        /// Cone reach in meters
        #[arg(long)]
        range: f64,

        /// Buffer distance around the shooter in meters
        #[arg(long)]
        min_safe_distance: Option<f64>,

        #[arg(long, value_enum, default_value = "active")]
        kind: ZoneKindArg,
    },

    /// Test whether a point falls inside the cone
    Check {
        /// Shooter position, "lat,lng"
        #[arg(long)]
        center: String,

        /// Facing direction, degrees clockwise from north
        #[arg(long)]
        direction: f64,

        /// Total cone width in degrees
        #[arg(long)]
        aperture: f64,

        /// Cone reach in meters
        #[arg(long)]
        range: f64,

        /// Buffer distance around the shooter in meters
        #[arg(long)]
        min_safe_distance: Option<f64>,

        /// Point to test, "lat,lng"
        #[arg(long)]
        point: String,
    },
}

impl ZoneCommand {
    pub fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ZoneSubcommand::Show {
                center,
                direction,
                aperture,
                range,
                min_safe_distance,
                kind,
            } => {
                let zone =
                    build_zone(center, *direction, *aperture, *range, *min_safe_distance, *kind)?;
                print_zone(&zone);
                Ok(())
            }
            ZoneSubcommand::Check {
                center,
                direction,
                aperture,
                range,
                min_safe_distance,
                point,
            } => {
                let zone = build_zone(
                    center,
                    *direction,
                    *aperture,
                    *range,
                    *min_safe_distance,
                    ZoneKindArg::Active,
                )?;
                let (lat, lng) = parse_coord(point)?;
                let point = Position::new(lat, lng);
                print_zone(&zone);
                println!();
                println!("  point:     {:.5}, {:.5}", point.lat, point.lng);
                println!(
                    "  distance:  {:.0} m   bearing: {:.0}°",
                    geo::distance_meters(&zone.center, &point),
                    geo::bearing_degrees(&zone.center, &point)
                );
                match classify(&zone, &point) {
                    PointCall::InsideCone => println!("  → INSIDE the shooting cone"),
                    PointCall::InsideBuffer => println!(
                        "  → outside the cone but inside the {:.0} m buffer",
                        zone.min_safe_distance_m
                    ),
                    PointCall::Clear => println!("  → clear of the zone"),
                }
                Ok(())
            }
        }
    }
}

enum PointCall {
    InsideCone,
    InsideBuffer,
    Clear,
}

fn classify(zone: &ShootingZone, point: &Position) -> PointCall {
    if geo::in_cone(point, zone) {
        PointCall::InsideCone
    } else if geo::distance_meters(&zone.center, point) < zone.min_safe_distance_m {
        PointCall::InsideBuffer
    } else {
        PointCall::Clear
    }
}

fn build_zone(
    center: &str,
    direction: f64,
    aperture: f64,
    range: f64,
    min_safe_distance: Option<f64>,
    kind: ZoneKindArg,
) -> Result<ShootingZone, Box<dyn std::error::Error>> {
    let (lat, lng) = parse_coord(center)?;
    let mut params = ZoneParams::new(Position::new(lat, lng), direction, aperture, range)
        .with_kind(kind.into());
    if let Some(meters) = min_safe_distance {
        params = params.with_min_safe_distance(meters);
    }
    Ok(ShootingZone::from_params("local", params)?)
}

fn print_zone(zone: &ShootingZone) {
    let (left, right) = sector_edges(zone.direction_deg, zone.aperture_deg);
    println!("Shooting zone ({})", zone.kind);
    println!("  center:    {:.5}, {:.5}", zone.center.lat, zone.center.lng);
    println!(
        "  bearing:   {:.0}° (sector {:.0}° to {:.0}°)",
        zone.direction_deg, left, right
    );
    println!("  range:     {:.0} m", zone.range_m);
    println!("  min safe:  {:.0} m", zone.min_safe_distance_m);
}

fn sector_edges(direction_deg: f64, aperture_deg: f64) -> (f64, f64) {
    let half = aperture_deg / 2.0;
    (
        (direction_deg - half).rem_euclid(360.0),
        (direction_deg + half).rem_euclid(360.0),
    )
}
