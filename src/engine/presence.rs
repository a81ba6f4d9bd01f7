use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use super::ledger::AttendanceLedger;
use super::zone_registry::ZoneRegistry;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::model::attendance::AttendanceRecord;
use crate::model::zone::GeofenceZone;
use crate::model::{UserId, ZoneId};

/// What `delete_zone` ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ZoneRemoval {
    /// Attendance history exists, the zone was only deactivated.
    Tombstoned { zone: GeofenceZone },
    Purged {
        #[schema(value_type = u64)]
        zone_id: ZoneId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ZoneHeadcount {
    #[schema(value_type = u64)]
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub workers: usize,
}

/// Read side over the registry and ledger. Every answer reflects only
/// transitions that had committed when the call started.
#[derive(Clone)]
pub struct PresenceQueryService {
    zones: Arc<ZoneRegistry>,
    ledger: AttendanceLedger,
}

impl PresenceQueryService {
    pub fn new(zones: Arc<ZoneRegistry>, ledger: AttendanceLedger) -> Self {
        Self { zones, ledger }
    }

    pub async fn is_present(&self, user_id: UserId) -> EngineResult<bool> {
        Ok(self.ledger.open_session(user_id).await?.is_some())
    }

    pub async fn current_session(&self, user_id: UserId) -> EngineResult<Option<AttendanceRecord>> {
        self.ledger.open_session(user_id).await
    }

    pub async fn workers_in_zone(&self, zone_id: ZoneId) -> EngineResult<BTreeSet<UserId>> {
        // inactive zones still answer: people may be inside when it is retired
        self.zones.get(zone_id)?;

        Ok(self
            .ledger
            .open_sessions()
            .await?
            .into_iter()
            .filter(|r| r.zone_id == zone_id && r.is_open())
            .map(|r| r.user_id)
            .collect())
    }

    /// Open sessions per zone, for every zone with at least one worker or
    /// that is currently active.
    pub async fn headcount(&self) -> EngineResult<Vec<ZoneHeadcount>> {
        let mut counts: BTreeMap<ZoneId, usize> = BTreeMap::new();
        for record in self.ledger.open_sessions().await? {
            *counts.entry(record.zone_id).or_default() += 1;
        }

        Ok(self
            .zones
            .list()
            .into_iter()
            .filter(|z| z.is_active || counts.contains_key(&z.id))
            .map(|z| ZoneHeadcount {
                workers: counts.get(&z.id).copied().unwrap_or(0),
                zone_id: z.id,
                zone_name: z.name,
            })
            .collect())
    }

    /// Purges a zone nobody ever checked into, tombstones it otherwise.
    pub async fn delete_zone(&self, zone_id: ZoneId) -> EngineResult<ZoneRemoval> {
        // stop new check-ins from resolving to it before looking at history
        self.zones.deactivate(zone_id).await?;

        // check-ins that resolved the zone before deactivation finish first
        let _closed = self.zones.close_admissions().await;
        let zone = self.zones.get(zone_id)?;

        if self.ledger.has_history(zone_id).await? {
            info!(zone_id, "Zone has attendance history, kept as tombstone");
            return Ok(ZoneRemoval::Tombstoned { zone });
        }

        match self.zones.purge(zone_id).await {
            Ok(()) => Ok(ZoneRemoval::Purged { zone_id }),
            // another instance checked someone in after the history count
            Err(EngineError::Storage(StoreError::Referenced)) => {
                Ok(ZoneRemoval::Tombstoned { zone: self.zones.get(zone_id)? })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::audit_log::AuditLog;
    use crate::model::zone::{LatLng, NewZone, ZoneShape};
    use crate::store::memory::MemoryStore;

    async fn service() -> (PresenceQueryService, AttendanceLedger, Arc<ZoneRegistry>) {
        let store = Arc::new(MemoryStore::new());
        let zones = Arc::new(ZoneRegistry::load(store.clone()).await.unwrap());
        for (name, lat) in [("Pit", 10.0), ("Camp", 11.0)] {
            zones
                .create(NewZone {
                    name: name.into(),
                    description: None,
                    shape: ZoneShape::Circle {
                        center: LatLng::new(lat, 20.0),
                        radius_meters: 50.0,
                    },
                    is_active: true,
                    created_by: 1,
                })
                .await
                .unwrap();
        }
        let audit = AuditLog::spawn(store.clone());
        let ledger = AttendanceLedger::new(zones.clone(), store, audit, Duration::from_secs(1));
        (PresenceQueryService::new(zones.clone(), ledger.clone()), ledger, zones)
    }

    #[tokio::test]
    async fn presence_follows_check_in_and_out() {
        let (presence, ledger, _) = service().await;
        assert!(!presence.is_present(1).await.unwrap());

        ledger.check_in(1, LatLng::new(10.0, 20.0), None).await.unwrap();
        assert!(presence.is_present(1).await.unwrap());

        ledger.check_out(1, LatLng::new(10.0, 20.0)).await.unwrap();
        assert!(!presence.is_present(1).await.unwrap());
        assert!(presence.current_session(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workers_in_zone_is_stable_without_mutation() {
        let (presence, ledger, _) = service().await;
        ledger.check_in(1, LatLng::new(10.0, 20.0), None).await.unwrap();
        ledger.check_in(2, LatLng::new(10.0001, 20.0), None).await.unwrap();
        ledger.check_in(3, LatLng::new(11.0, 20.0), None).await.unwrap();

        let first = presence.workers_in_zone(1).await.unwrap();
        let second = presence.workers_in_zone(1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, BTreeSet::from([1, 2]));
        assert_eq!(presence.workers_in_zone(2).await.unwrap(), BTreeSet::from([3]));
        assert_eq!(
            presence.workers_in_zone(99).await.unwrap_err(),
            EngineError::ZoneNotFound(99)
        );
    }

    #[tokio::test]
    async fn headcount_counts_open_sessions() {
        let (presence, ledger, _) = service().await;
        ledger.check_in(1, LatLng::new(10.0, 20.0), None).await.unwrap();
        ledger.check_in(2, LatLng::new(10.0, 20.0), None).await.unwrap();

        let counts = presence.headcount().await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].workers, 2);
        assert_eq!(counts[1].workers, 0);
    }

    #[tokio::test]
    async fn delete_zone_purges_only_without_history() {
        let (presence, ledger, zones) = service().await;
        ledger.check_in(1, LatLng::new(10.0, 20.0), None).await.unwrap();
        ledger.check_out(1, LatLng::new(10.0, 20.0)).await.unwrap();

        match presence.delete_zone(1).await.unwrap() {
            ZoneRemoval::Tombstoned { zone } => assert!(!zone.is_active),
            other => panic!("expected tombstone, got {:?}", other),
        }
        assert!(zones.get(1).is_ok());

        assert_eq!(
            presence.delete_zone(2).await.unwrap(),
            ZoneRemoval::Purged { zone_id: 2 }
        );
        assert_eq!(zones.get(2).unwrap_err(), EngineError::ZoneNotFound(2));
    }
}
