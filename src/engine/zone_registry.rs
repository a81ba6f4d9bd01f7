use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock as AsyncRwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::geometry;
use crate::error::{EngineError, EngineResult};
use crate::model::ZoneId;
use crate::model::zone::{GeofenceZone, LatLng, NewZone, ZonePatch};
use crate::store::ZoneStore;

/// Owns the zone set.
///
/// Readers clone the current `Arc` snapshot and never wait on a writer for
/// longer than that clone. Writers are serialized, persist first, then swap
/// in a freshly built set, so a reader sees either the old or the new zone,
/// never a mix.
///
/// Check-ins hold the admission gate shared from zone lookup until their
/// record is stored; zone purges hold it exclusively.
pub struct ZoneRegistry {
    snapshot: RwLock<Arc<Vec<GeofenceZone>>>,
    writer: Mutex<()>,
    admission: AsyncRwLock<()>,
    store: Arc<dyn ZoneStore>,
}

impl ZoneRegistry {
    /// Builds the registry from whatever the store already holds.
    pub async fn load(store: Arc<dyn ZoneStore>) -> EngineResult<Self> {
        let mut zones = store.load_all().await?;
        zones.sort_by_key(|z| z.id);
        info!(zones = zones.len(), "Zone registry warmup complete");

        Ok(Self {
            snapshot: RwLock::new(Arc::new(zones)),
            writer: Mutex::new(()),
            admission: AsyncRwLock::new(()),
            store,
        })
    }

    /// Taken by a check-in before it resolves the point and released once
    /// the record is stored.
    pub async fn admit(&self) -> RwLockReadGuard<'_, ()> {
        self.admission.read().await
    }

    /// Waits out every check-in in flight and blocks new ones until dropped.
    pub(crate) async fn close_admissions(&self) -> RwLockWriteGuard<'_, ()> {
        self.admission.write().await
    }

    pub fn snapshot(&self) -> Arc<Vec<GeofenceZone>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of every active zone containing `point`, ascending.
    pub fn resolve_zones(&self, point: LatLng) -> Vec<ZoneId> {
        self.snapshot()
            .iter()
            .filter(|z| z.is_active && geometry::contains(&z.shape, point))
            .map(|z| z.id)
            .collect()
    }

    pub fn get(&self, id: ZoneId) -> EngineResult<GeofenceZone> {
        self.snapshot()
            .iter()
            .find(|z| z.id == id)
            .cloned()
            .ok_or(EngineError::ZoneNotFound(id))
    }

    pub fn list(&self) -> Vec<GeofenceZone> {
        self.snapshot().as_ref().clone()
    }

    pub async fn create(&self, mut zone: NewZone) -> EngineResult<GeofenceZone> {
        zone.name = validate_name(&zone.name)?;
        zone.shape = geometry::validate_shape(zone.shape)?;

        let _guard = self.writer.lock().await;
        let stored = self.store.insert(zone, Utc::now()).await?;
        info!(zone_id = stored.id, name = %stored.name, "Zone created");

        self.replace(|zones| zones.push(stored.clone()));
        Ok(stored)
    }

    pub async fn update(&self, id: ZoneId, mut patch: ZonePatch) -> EngineResult<GeofenceZone> {
        if patch.is_empty() {
            return Err(EngineError::validation("No fields provided for update"));
        }
        if let Some(name) = patch.name.take() {
            patch.name = Some(validate_name(&name)?);
        }
        if let Some(shape) = patch.shape.take() {
            patch.shape = Some(geometry::validate_shape(shape)?);
        }

        let _guard = self.writer.lock().await;
        let mut zone = self.get(id)?;
        patch.apply(&mut zone, Utc::now());
        self.store.update(&zone).await?;
        debug!(zone_id = id, active = zone.is_active, "Zone updated");

        let updated = zone.clone();
        self.replace(move |zones| {
            if let Some(slot) = zones.iter_mut().find(|z| z.id == id) {
                *slot = zone;
            }
        });
        Ok(updated)
    }

    /// Tombstones the zone: it stops matching check-ins but keeps its history.
    pub async fn deactivate(&self, id: ZoneId) -> EngineResult<GeofenceZone> {
        self.update(id, ZonePatch::deactivate()).await
    }

    /// Removes the zone for good. The store refuses while records reference it.
    pub async fn purge(&self, id: ZoneId) -> EngineResult<()> {
        let _guard = self.writer.lock().await;
        self.get(id)?;
        self.store.delete(id).await?;
        info!(zone_id = id, "Zone purged");

        self.replace(|zones| zones.retain(|z| z.id != id));
        Ok(())
    }

    fn replace(&self, edit: impl FnOnce(&mut Vec<GeofenceZone>)) {
        let mut next = self.snapshot().as_ref().clone();
        edit(&mut next);
        next.sort_by_key(|z| z.id);

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

fn validate_name(name: &str) -> EngineResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("zone name must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::zone::ZoneShape;
    use crate::store::memory::MemoryStore;

    fn circle_zone(name: &str, lat: f64, lng: f64, radius_meters: f64) -> NewZone {
        NewZone {
            name: name.to_string(),
            description: None,
            shape: ZoneShape::Circle {
                center: LatLng::new(lat, lng),
                radius_meters,
            },
            is_active: true,
            created_by: 1,
        }
    }

    async fn registry() -> ZoneRegistry {
        ZoneRegistry::load(Arc::new(MemoryStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn resolves_every_overlapping_active_zone_in_id_order() {
        let zones = registry().await;
        let big = zones.create(circle_zone("Pit", 10.0, 20.0, 200.0)).await.unwrap();
        let small = zones.create(circle_zone("Crusher", 10.0, 20.0, 50.0)).await.unwrap();
        zones.create(circle_zone("Camp", 11.0, 21.0, 50.0)).await.unwrap();

        assert_eq!(zones.resolve_zones(LatLng::new(10.0, 20.0)), vec![big.id, small.id]);
        assert_eq!(zones.resolve_zones(LatLng::new(10.001, 20.0)), vec![big.id]);
        assert!(zones.resolve_zones(LatLng::new(12.0, 20.0)).is_empty());
    }

    #[tokio::test]
    async fn inactive_zones_do_not_match_but_are_kept() {
        let zones = registry().await;
        let zone = zones.create(circle_zone("Pit", 10.0, 20.0, 50.0)).await.unwrap();

        let deactivated = zones.deactivate(zone.id).await.unwrap();
        assert!(!deactivated.is_active);
        assert!(deactivated.updated_at >= zone.updated_at);
        assert!(zones.resolve_zones(LatLng::new(10.0, 20.0)).is_empty());
        assert_eq!(zones.list().len(), 1);
    }

    #[tokio::test]
    async fn malformed_shapes_are_rejected_before_storage() {
        let zones = registry().await;
        let err = zones.create(circle_zone("Bad", 10.0, 20.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = zones.create(circle_zone("  ", 10.0, 20.0, 10.0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(zones.list().is_empty());

        let zone = zones.create(circle_zone("Pit", 10.0, 20.0, 50.0)).await.unwrap();
        let bad_patch = ZonePatch {
            shape: Some(ZoneShape::Polygon { vertices: vec![] }),
            ..ZonePatch::default()
        };
        assert!(zones.update(zone.id, bad_patch).await.is_err());
        assert_eq!(zones.get(zone.id).unwrap().shape, zone.shape);
    }

    #[tokio::test]
    async fn update_and_purge_unknown_zone() {
        let zones = registry().await;
        let err = zones
            .update(
                42,
                ZonePatch {
                    name: Some("x".into()),
                    ..ZonePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::ZoneNotFound(42));
        assert_eq!(zones.purge(42).await.unwrap_err(), EngineError::ZoneNotFound(42));
    }

    #[tokio::test]
    async fn old_snapshot_is_untouched_by_writes() {
        let zones = registry().await;
        zones.create(circle_zone("Pit", 10.0, 20.0, 50.0)).await.unwrap();
        let before = zones.snapshot();

        zones.create(circle_zone("Camp", 11.0, 21.0, 50.0)).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(zones.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn load_picks_up_persisted_zones() {
        let store = Arc::new(MemoryStore::new());
        {
            let zones = ZoneRegistry::load(store.clone()).await.unwrap();
            zones.create(circle_zone("Pit", 10.0, 20.0, 50.0)).await.unwrap();
        }
        let reloaded = ZoneRegistry::load(store).await.unwrap();
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.resolve_zones(LatLng::new(10.0, 20.0)), vec![1]);
    }
}
