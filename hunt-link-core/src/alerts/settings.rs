use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::AlertKind;

/// Default member-to-member proximity warning distance.
pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 200.0;

/// Per-member alert preferences.
///
/// Each `*_alerts_enabled` flag gates creation of that kind entirely and is
/// checked before deduplication. Proximity has no enable flag; setting
/// `proximity_threshold_m` to zero disables it instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub proximity_threshold_m: f64,
    pub safety_alerts_enabled: bool,
    pub weather_alerts_enabled: bool,
    pub activity_alerts_enabled: bool,
    pub game_alerts_enabled: bool,
    pub zone_alerts_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            vibration_enabled: true,
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            safety_alerts_enabled: true,
            weather_alerts_enabled: true,
            activity_alerts_enabled: true,
            game_alerts_enabled: true,
            zone_alerts_enabled: true,
        }
    }
}

impl AlertSettings {
    /// Whether alerts of this kind may be created at all.
    pub fn allows(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::Safety => self.safety_alerts_enabled,
            AlertKind::Proximity => true,
            AlertKind::Weather => self.weather_alerts_enabled,
            AlertKind::Activity => self.activity_alerts_enabled,
            AlertKind::Game => self.game_alerts_enabled,
            AlertKind::Zone => self.zone_alerts_enabled,
        }
    }
}

/// Duplicate-suppression windows per alert kind, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub proximity_secs: u64,
    pub safety_secs: u64,
    pub zone_secs: u64,
    pub weather_secs: u64,
    pub activity_secs: u64,
    pub game_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            proximity_secs: 60,
            safety_secs: 30,
            zone_secs: 30,
            weather_secs: 1800,
            activity_secs: 60,
            game_secs: 60,
        }
    }
}

impl CooldownConfig {
    pub fn window(&self, kind: AlertKind) -> Duration {
        let secs = match kind {
            AlertKind::Proximity => self.proximity_secs,
            AlertKind::Safety => self.safety_secs,
            AlertKind::Zone => self.zone_secs,
            AlertKind::Weather => self.weather_secs,
            AlertKind::Activity => self.activity_secs,
            AlertKind::Game => self.game_secs,
        };
        Duration::seconds(secs as i64)
    }
}

/// Static notification profile for an alert kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectProfile {
    pub sound: bool,
    pub vibrate: bool,
    pub priority: u8,
}

impl EffectProfile {
    /// Built-in profile per kind. Safety, proximity and game are loud;
    /// weather, activity and zone changes stay silent.
    pub fn for_kind(kind: AlertKind) -> Self {
        match kind {
            AlertKind::Safety => Self {
                sound: true,
                vibrate: true,
                priority: 1,
            },
            AlertKind::Proximity => Self {
                sound: true,
                vibrate: true,
                priority: 2,
            },
            AlertKind::Game => Self {
                sound: true,
                vibrate: true,
                priority: 3,
            },
            AlertKind::Zone => Self {
                sound: false,
                vibrate: false,
                priority: 3,
            },
            AlertKind::Activity => Self {
                sound: false,
                vibrate: false,
                priority: 4,
            },
            AlertKind::Weather => Self {
                sound: false,
                vibrate: false,
                priority: 4,
            },
        }
    }
}

/// Side effects the consumer should perform for a freshly created alert,
/// after the member's preferences and the global mute are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEffects {
    pub sound: bool,
    pub vibrate: bool,
    pub priority: u8,
}

impl AlertEffects {
    pub fn resolve(kind: AlertKind, settings: &AlertSettings, muted: bool) -> Self {
        let profile = EffectProfile::for_kind(kind);
        Self {
            sound: profile.sound && settings.sound_enabled && !muted,
            vibrate: profile.vibrate && settings.vibration_enabled && !muted,
            priority: profile.priority,
        }
    }

    pub fn silent(kind: AlertKind) -> Self {
        Self {
            sound: false,
            vibrate: false,
            priority: EffectProfile::for_kind(kind).priority,
        }
    }
}
