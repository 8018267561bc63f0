//! Live session command: join the group, stream events, leave on Ctrl-C.

use clap::{Args, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use hunt_link_core::{
    Alert, GroupSession, Position, SessionEvent, ZoneKind, ZoneParams,
};

use crate::config::Config;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ZoneKindArg {
    #[default]
    Active,
    Standby,
    Safe,
}

impl From<ZoneKindArg> for ZoneKind {
    fn from(arg: ZoneKindArg) -> Self {
        match arg {
            ZoneKindArg::Active => ZoneKind::Active,
            ZoneKindArg::Standby => ZoneKind::Standby,
            ZoneKindArg::Safe => ZoneKind::Safe,
        }
    }
}

/// Join the group and stream safety events
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Override the configured group
    #[arg(long)]
    group: Option<String>,

    /// Override the configured member id
    #[arg(long)]
    user: Option<String>,

    /// Override the display name
    #[arg(long)]
    name: Option<String>,

    /// Announce a starting position, "lat,lng"
    #[arg(long)]
    at: Option<String>,

    /// Declare a shooting zone on join, "direction,aperture,range"
    /// (degrees, degrees, meters); requires --at for the center
    #[arg(long)]
    zone: Option<String>,

    /// Kind for the declared zone
    #[arg(long, value_enum, default_value = "active")]
    zone_kind: ZoneKindArg,

    /// Suppress per-position lines
    #[arg(long)]
    quiet: bool,
}

impl RunCommand {
    pub fn run(&self, config: &Config) -> Result<(), RunCommandError> {
        // RUST_LOG wins; the default keeps the event feed readable
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("huntlink=info,hunt_link_core=warn"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| RunCommandError::RuntimeError(e.to_string()))?;
        rt.block_on(self.watch(config))
    }

    async fn watch(&self, config: &Config) -> Result<(), RunCommandError> {
        let mut session_config = config.session_config();
        if let Some(group) = &self.group {
            session_config.group_id = group.clone();
        }
        if let Some(user) = &self.user {
            // The display name tracks the id unless something names one.
            if session_config.display_name == session_config.user_id {
                session_config.display_name = user.clone();
            }
            session_config.user_id = user.clone();
        }
        if let Some(name) = &self.name {
            session_config.display_name = name.clone();
        }

        let start = self
            .at
            .as_deref()
            .map(parse_coord)
            .transpose()
            .map_err(RunCommandError::BadArgument)?;
        let zone = self
            .zone
            .as_deref()
            .map(parse_zone)
            .transpose()
            .map_err(RunCommandError::BadArgument)?;
        if zone.is_some() && start.is_none() {
            return Err(RunCommandError::BadArgument(
                "--zone needs --at for the zone center".to_string(),
            ));
        }

        println!(
            "Joining group '{}' as {} via {}",
            session_config.group_id, session_config.display_name, session_config.server_url
        );

        let (mut session, mut feed) = GroupSession::start(session_config).await;
        if feed.is_none() && start.is_some() {
            feed = session.start_tracking();
        }
        if let (Some((lat, lng)), Some(feed)) = (start, &feed) {
            feed.push(Position::new(lat, lng)).await;
        }

        if let (Some((direction, aperture, range)), Some((lat, lng))) = (zone, start) {
            let params = ZoneParams::new(Position::new(lat, lng), direction, aperture, range)
                .with_kind(self.zone_kind.into());
            match session.set_zone(params).await {
                Ok(declared) => println!(
                    "✓ Declared {} zone (bearing {:.0}°, {:.0} m)",
                    declared.kind, declared.direction_deg, declared.range_m
                ),
                Err(e) => return Err(RunCommandError::BadArgument(e.to_string())),
            }
        }

        let mut events = session.subscribe();
        println!("Listening for group events (Ctrl-C to leave)\n");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => self.print_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        eprintln!("... {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        session.stop().await;
        println!("✓ Left the group");
        Ok(())
    }

    fn print_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Alert { alert, effects } => {
                let mut line = format!("⚠ [{}] {}", alert.severity, describe_alert(alert));
                if effects.sound {
                    line.push_str(" ♪");
                }
                println!("{}", line);
            }
            SessionEvent::MemberJoined { member_id } => println!("→ {} joined", member_id),
            SessionEvent::MemberLeft { member_id } => println!("← {} left", member_id),
            SessionEvent::Position {
                member_id,
                position,
            } => {
                if !self.quiet {
                    println!("· {} @ {:.4}, {:.4}", member_id, position.lat, position.lng);
                }
            }
            SessionEvent::ZoneUpdated { zone } => println!(
                "◆ {} declared a {} zone (bearing {:.0}°, {:.0} m)",
                zone.owner_id, zone.kind, zone.direction_deg, zone.range_m
            ),
            SessionEvent::ZoneCleared { owner_id } => {
                println!("◇ {} cleared their zone", owner_id)
            }
            SessionEvent::ServerError { message } => eprintln!("✗ server error: {}", message),
            SessionEvent::Entity(_) => {}
        }
    }
}

/// Human line for an alert, built from the finding the evaluator recorded.
fn describe_alert(alert: &Alert) -> String {
    let subject = alert.member_id.as_deref().unwrap_or("someone");
    let finding = alert.data.get("finding").and_then(|v| v.as_str());
    let distance = alert.data.get("distance_m").and_then(|v| v.as_f64());
    match finding {
        Some("member_in_my_zone") => format!("{} is inside your shooting zone", subject),
        Some("in_shooting_zone") => format!("{} is inside a declared shooting zone", subject),
        Some("too_close") | Some("proximity") => match distance {
            Some(d) => format!("{} is only {:.0} m away", subject, d),
            None => format!("{} is too close", subject),
        },
        _ => format!("{} alert involving {}", alert.kind, subject),
    }
}

pub(crate) fn parse_coord(text: &str) -> Result<(f64, f64), String> {
    let mut parts = text.splitn(2, ',');
    let lat = parts.next().unwrap_or_default().trim();
    let lng = parts
        .next()
        .ok_or_else(|| format!("expected 'lat,lng', got '{}'", text))?
        .trim();
    let lat: f64 = lat.parse().map_err(|_| format!("bad latitude '{}'", lat))?;
    let lng: f64 = lng.parse().map_err(|_| format!("bad longitude '{}'", lng))?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {} out of range", lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(format!("longitude {} out of range", lng));
    }
    Ok((lat, lng))
}

fn parse_zone(text: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected 'direction,aperture,range', got '{}'", text));
    }
    let direction = parts[0]
        .parse()
        .map_err(|_| format!("bad direction '{}'", parts[0]))?;
    let aperture = parts[1]
        .parse()
        .map_err(|_| format!("bad aperture '{}'", parts[1]))?;
    let range = parts[2]
        .parse()
        .map_err(|_| format!("bad range '{}'", parts[2]))?;
    Ok((direction, aperture, range))
}

/// Errors from the run command
#[derive(Debug)]
pub enum RunCommandError {
    RuntimeError(String),
    BadArgument(String),
}

impl std::fmt::Display for RunCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
            RunCommandError::BadArgument(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RunCommandError {}
