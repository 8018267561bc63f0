//! Alert lifecycle: gating, deduplication, storage and notification effects.

mod aggregator;
mod settings;

pub use aggregator::{AlertAggregator, AlertEvent, AlertInput};
pub use settings::{
    AlertEffects, AlertSettings, CooldownConfig, EffectProfile, DEFAULT_PROXIMITY_THRESHOLD_M,
};
