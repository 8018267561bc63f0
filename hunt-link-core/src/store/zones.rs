//! Registry of declared shooting zones, one per member.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ShootingZone, ZoneError, ZoneKind, ZoneParams};

/// Holds every declared zone in the group, keyed by owner.
///
/// A member has at most one zone; declaring a new one replaces the previous
/// one wholesale. Zones are destroyed when the owner clears them or leaves.
#[derive(Debug, Default)]
pub struct ShootingZoneRegistry {
    zones: HashMap<String, ShootingZone>,
}

impl ShootingZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the owner's zone from validated parameters.
    pub fn set(
        &mut self,
        owner_id: impl Into<String>,
        params: ZoneParams,
    ) -> Result<ShootingZone, ZoneError> {
        let owner_id = owner_id.into();
        let zone = ShootingZone::from_params(owner_id.clone(), params)?;
        let replaced = self.zones.insert(owner_id, zone.clone()).is_some();
        debug!(owner_id = %zone.owner_id, zone_id = %zone.id, replaced, "zone set");
        Ok(zone)
    }

    /// Inserts a zone received from a peer over sync.
    ///
    /// Remote zones were validated by their declaring side, but a malformed
    /// one is rejected here too rather than poisoning the registry.
    pub fn apply_remote(&mut self, zone: ShootingZone) -> bool {
        let check = ZoneParams {
            center: zone.center.clone(),
            direction_deg: zone.direction_deg,
            aperture_deg: zone.aperture_deg,
            range_m: zone.range_m,
            min_safe_distance_m: Some(zone.min_safe_distance_m),
            kind: zone.kind,
        };
        if let Err(e) = check.validate() {
            warn!(owner_id = %zone.owner_id, error = %e, "rejecting invalid remote zone");
            return false;
        }
        self.zones.insert(zone.owner_id.clone(), zone);
        true
    }

    /// Removes the owner's zone, returning it if one existed.
    pub fn clear(&mut self, owner_id: &str) -> Option<ShootingZone> {
        self.zones.remove(owner_id)
    }

    /// Removes a zone by its id regardless of owner, e.g. for a
    /// `geo.deleted` event that carries only the entity id.
    pub fn remove_by_id(&mut self, zone_id: Uuid) -> Option<ShootingZone> {
        let owner = self
            .zones
            .iter()
            .find(|(_, z)| z.id == zone_id)
            .map(|(owner, _)| owner.clone())?;
        self.zones.remove(&owner)
    }

    /// Changes the activity classification of the owner's zone.
    pub fn set_kind(&mut self, owner_id: &str, kind: ZoneKind) -> Option<&ShootingZone> {
        let zone = self.zones.get_mut(owner_id)?;
        zone.set_kind(kind);
        Some(zone)
    }

    pub fn by_owner(&self, owner_id: &str) -> Option<&ShootingZone> {
        self.zones.get(owner_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &ShootingZone> {
        self.zones.values()
    }

    /// Zones with the given activity classification.
    pub fn of_kind(&self, kind: ZoneKind) -> Vec<&ShootingZone> {
        self.zones.values().filter(|z| z.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    fn params() -> ZoneParams {
        ZoneParams::new(Position::new(46.81, -71.20), 90.0, 60.0, 300.0)
    }

    #[test]
    fn test_set_and_get() {
        let mut registry = ShootingZoneRegistry::new();
        let zone = registry.set("user-1", params()).unwrap();

        assert_eq!(registry.by_owner("user-1").unwrap().id, zone.id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut registry = ShootingZoneRegistry::new();
        let first = registry.set("user-1", params()).unwrap();
        let second = registry
            .set("user-1", params().with_kind(ZoneKind::Standby))
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_owner("user-1").unwrap().kind, ZoneKind::Standby);
    }

    #[test]
    fn test_set_rejects_invalid_params() {
        let mut registry = ShootingZoneRegistry::new();
        let mut p = params();
        p.aperture_deg = 200.0;

        assert!(registry.set("user-1", p).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut registry = ShootingZoneRegistry::new();
        registry.set("user-1", params()).unwrap();

        assert!(registry.clear("user-1").is_some());
        assert!(registry.clear("user-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_by_id() {
        let mut registry = ShootingZoneRegistry::new();
        let zone = registry.set("user-1", params()).unwrap();

        assert!(registry.remove_by_id(zone.id).is_some());
        assert!(registry.by_owner("user-1").is_none());
        assert!(registry.remove_by_id(zone.id).is_none());
    }

    #[test]
    fn test_set_kind() {
        let mut registry = ShootingZoneRegistry::new();
        registry.set("user-1", params()).unwrap();

        let updated = registry.set_kind("user-1", ZoneKind::Safe).unwrap();
        assert_eq!(updated.kind, ZoneKind::Safe);

        assert!(registry.set_kind("nobody", ZoneKind::Safe).is_none());
    }

    #[test]
    fn test_of_kind() {
        let mut registry = ShootingZoneRegistry::new();
        registry.set("user-1", params()).unwrap();
        registry
            .set("user-2", params().with_kind(ZoneKind::Safe))
            .unwrap();
        registry.set("user-3", params()).unwrap();

        assert_eq!(registry.of_kind(ZoneKind::Active).len(), 2);
        assert_eq!(registry.of_kind(ZoneKind::Safe).len(), 1);
        assert!(registry.of_kind(ZoneKind::Standby).is_empty());
    }

    #[test]
    fn test_apply_remote() {
        let mut registry = ShootingZoneRegistry::new();
        let zone = ShootingZone::from_params("peer-1", params()).unwrap();

        assert!(registry.apply_remote(zone.clone()));
        assert_eq!(registry.by_owner("peer-1").unwrap().id, zone.id);
    }

    #[test]
    fn test_apply_remote_rejects_invalid() {
        let mut registry = ShootingZoneRegistry::new();
        let mut zone = ShootingZone::from_params("peer-1", params()).unwrap();
        zone.range_m = 10_000.0;

        assert!(!registry.apply_remote(zone));
        assert!(registry.is_empty());
    }
}
