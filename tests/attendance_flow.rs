use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use site_presence::engine::Engine;
use site_presence::engine::presence::ZoneRemoval;
use site_presence::error::{EngineError, StoreResult};
use site_presence::model::attendance::{AttendanceRecord, NewAttendance};
use site_presence::model::audit::{AuditAction, AuditOutcome};
use site_presence::model::zone::{LatLng, NewZone, ZonePatch, ZoneShape};
use site_presence::model::{RecordId, UserId, ZoneId};
use site_presence::store::AttendanceStore;
use site_presence::store::memory::MemoryStore;

async fn engine() -> Engine {
    Engine::in_memory(Duration::from_secs(5)).await.unwrap()
}

fn circle(name: &str, lat: f64, lng: f64, radius_meters: f64) -> NewZone {
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

#[tokio::test]
async fn worker_checks_in_and_out_of_a_circle_zone() {
    let engine = engine().await;
    let z1 = engine.zones.create(circle("Z1", 10.0, 20.0, 50.0)).await.unwrap();

    let inside = LatLng::new(10.0003, 20.0);
    let record = engine.ledger.check_in(1, inside, None).await.unwrap();
    assert_eq!(record.zone_id, z1.id);
    assert!(record.is_open());

    let again = engine.ledger.check_in(1, inside, None).await;
    assert_eq!(again, Err(EngineError::AlreadyCheckedIn));

    // leaving the zone before checking out is allowed
    let outside = LatLng::new(10.0010, 20.0);
    let closed = engine.ledger.check_out(1, outside).await.unwrap();
    assert_eq!(closed.id, record.id);
    assert_eq!(closed.check_out_point, Some(outside));
    assert!(closed.check_out_time.unwrap() >= closed.check_in_time);

    let twice = engine.ledger.check_out(1, outside).await;
    assert_eq!(twice, Err(EngineError::NotCheckedIn));

    assert!(!engine.presence.is_present(1).await.unwrap());
    assert_eq!(engine.ledger.history(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overlapping_zones_resolve_to_the_lowest_id() {
    let engine = engine().await;
    let z1 = engine.zones.create(circle("Z1", 10.0, 20.0, 50.0)).await.unwrap();
    let z2 = engine.zones.create(circle("Z2", 10.0, 20.0, 200.0)).await.unwrap();
    assert!(z1.id < z2.id);

    let point = LatLng::new(10.0001, 20.0);
    assert_eq!(engine.zones.resolve_zones(point), vec![z1.id, z2.id]);

    for user_id in [1, 2, 3] {
        let record = engine.ledger.check_in(user_id, point, None).await.unwrap();
        assert_eq!(record.zone_id, z1.id);
    }
}

#[tokio::test]
async fn deactivated_zone_stops_accepting_check_ins() {
    let engine = engine().await;
    let zone = engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();
    let point = LatLng::new(10.0, 20.0);

    engine.ledger.check_in(1, point, None).await.unwrap();
    engine.zones.deactivate(zone.id).await.unwrap();

    assert_eq!(
        engine.ledger.check_in(2, point, None).await,
        Err(EngineError::OutsideAnyZone)
    );
    // the worker already inside can still leave, and is still counted until then
    assert!(engine.presence.workers_in_zone(zone.id).await.unwrap().contains(&1));
    engine.ledger.check_out(1, point).await.unwrap();
    assert!(engine.presence.workers_in_zone(zone.id).await.unwrap().is_empty());

    engine
        .zones
        .update(zone.id, ZonePatch { is_active: Some(true), ..ZonePatch::default() })
        .await
        .unwrap();
    assert!(engine.ledger.check_in(2, point, None).await.is_ok());
}

#[tokio::test]
async fn workers_in_zone_is_a_pure_read() {
    let engine = engine().await;
    let zone = engine.zones.create(circle("Camp", 10.0, 20.0, 100.0)).await.unwrap();
    for user_id in [4, 2, 9] {
        engine.ledger.check_in(user_id, LatLng::new(10.0, 20.0), None).await.unwrap();
    }

    let first = engine.presence.workers_in_zone(zone.id).await.unwrap();
    let second = engine.presence.workers_in_zone(zone.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.into_iter().collect::<Vec<_>>(), vec![2, 4, 9]);

    assert_eq!(
        engine.presence.workers_in_zone(999).await,
        Err(EngineError::ZoneNotFound(999))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_ins_open_exactly_one_session() {
    let engine = engine().await;
    engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();
    let point = LatLng::new(10.0, 20.0);

    let attempts = (0..32).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ledger.check_in(7, point, None).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(EngineError::AlreadyCheckedIn) | Err(EngineError::ConcurrencyConflict)
        ));
    }
    assert_eq!(engine.ledger.history(7).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_transitions_never_leave_two_open_sessions() {
    let engine = engine().await;
    engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();
    let point = LatLng::new(10.0, 20.0);

    let tasks = (0..64).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            if i % 2 == 0 {
                engine.ledger.check_in(3, point, None).await.map(|_| ())
            } else {
                engine.ledger.check_out(3, point).await.map(|_| ())
            }
        })
    });
    for joined in join_all(tasks).await {
        match joined.unwrap() {
            Ok(())
            | Err(EngineError::AlreadyCheckedIn)
            | Err(EngineError::NotCheckedIn)
            | Err(EngineError::ConcurrencyConflict) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let history = engine.ledger.history(3).await.unwrap();
    assert!(history.iter().filter(|r| r.is_open()).count() <= 1);
    // every closed session was closed after it was opened
    for record in history.iter().filter(|r| !r.is_open()) {
        assert!(record.check_out_time.unwrap() >= record.check_in_time);
    }
}

#[tokio::test]
async fn every_attempt_is_audited() {
    let engine = engine().await;
    engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();

    engine.ledger.check_in(5, LatLng::new(10.0, 20.0), Some("handset-5".into())).await.unwrap();
    let _ = engine.ledger.check_in(6, LatLng::new(0.0, 0.0), None).await;
    let _ = engine.ledger.check_out(6, LatLng::new(0.0, 0.0)).await;

    engine.audit.flush().await;
    let entries = engine.audit.recent(10).await.unwrap();
    assert_eq!(entries.len(), 3);

    // newest first
    assert_eq!(entries[0].event.action, AuditAction::CheckOut);
    assert_eq!(entries[0].event.outcome, AuditOutcome::NotCheckedIn);
    assert_eq!(entries[1].event.outcome, AuditOutcome::OutsideAnyZone);
    assert_eq!(entries[2].event.outcome, AuditOutcome::Accepted);
    assert_eq!(entries[2].event.device_id.as_deref(), Some("handset-5"));
}

#[tokio::test]
async fn deleting_a_zone_keeps_history_intact() {
    let engine = engine().await;
    let used = engine.zones.create(circle("Used", 10.0, 20.0, 50.0)).await.unwrap();
    let unused = engine.zones.create(circle("Unused", 30.0, 40.0, 50.0)).await.unwrap();

    engine.ledger.check_in(1, LatLng::new(10.0, 20.0), None).await.unwrap();
    engine.ledger.check_out(1, LatLng::new(10.0, 20.0)).await.unwrap();

    match engine.presence.delete_zone(used.id).await.unwrap() {
        ZoneRemoval::Tombstoned { zone } => assert!(!zone.is_active),
        other => panic!("expected tombstone, got {other:?}"),
    }
    assert_eq!(
        engine.presence.delete_zone(unused.id).await.unwrap(),
        ZoneRemoval::Purged { zone_id: unused.id }
    );

    assert!(engine.zones.get(used.id).is_ok());
    assert_eq!(engine.zones.get(unused.id), Err(EngineError::ZoneNotFound(unused.id)));
    assert_eq!(engine.ledger.history(1).await.unwrap()[0].zone_id, used.id);
}

/// Memory store whose inserts take a while to land.
struct SlowInserts {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl AttendanceStore for SlowInserts {
    async fn find_open(&self, user_id: UserId) -> StoreResult<Option<AttendanceRecord>> {
        self.inner.find_open(user_id).await
    }

    async fn insert_open(&self, new: NewAttendance) -> StoreResult<AttendanceRecord> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_open(new).await
    }

    async fn close(
        &self,
        record_id: RecordId,
        at: DateTime<Utc>,
        point: LatLng,
    ) -> StoreResult<Option<AttendanceRecord>> {
        self.inner.close(record_id, at, point).await
    }

    async fn invalidate(&self, record_id: RecordId, reason: &str) -> StoreResult<Option<AttendanceRecord>> {
        self.inner.invalidate(record_id, reason).await
    }

    async fn get(&self, record_id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
        self.inner.get(record_id).await
    }

    async fn list_open(&self) -> StoreResult<Vec<AttendanceRecord>> {
        self.inner.list_open().await
    }

    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<AttendanceRecord>> {
        self.inner.list_for_user(user_id).await
    }

    async fn count_for_zone(&self, zone_id: ZoneId) -> StoreResult<u64> {
        self.inner.count_for_zone(zone_id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zone_deleted_during_a_slow_check_in_is_kept() {
    let store = Arc::new(MemoryStore::new());
    let slow = Arc::new(SlowInserts {
        inner: store.as_ref().clone(),
        delay: Duration::from_millis(200),
    });
    let engine = Engine::build(store.clone(), slow, store.clone(), Duration::from_secs(5))
        .await
        .unwrap();
    let zone = engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();

    let check_in = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ledger.check_in(1, LatLng::new(10.0003, 20.0), None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let removal = engine.presence.delete_zone(zone.id).await.unwrap();
    let record = check_in.await.unwrap().unwrap();

    assert_eq!(record.zone_id, zone.id);
    match removal {
        ZoneRemoval::Tombstoned { zone } => assert!(!zone.is_active),
        other => panic!("expected tombstone, got {other:?}"),
    }
    assert!(engine.zones.get(zone.id).is_ok());
    assert_eq!(
        engine.presence.workers_in_zone(zone.id).await.unwrap().into_iter().collect::<Vec<_>>(),
        vec![1]
    );
    assert_eq!(engine.presence.headcount().await.unwrap()[0].workers, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn check_in_while_a_zone_purge_waits_is_outside() {
    let store = Arc::new(MemoryStore::new());
    let slow = Arc::new(SlowInserts {
        inner: store.as_ref().clone(),
        delay: Duration::from_millis(200),
    });
    let engine = Engine::build(store.clone(), slow, store.clone(), Duration::from_secs(5))
        .await
        .unwrap();
    let pit = engine.zones.create(circle("Pit", 10.0, 20.0, 50.0)).await.unwrap();
    let camp = engine.zones.create(circle("Camp", 30.0, 40.0, 50.0)).await.unwrap();

    // a slow check-in elsewhere keeps the purge of Camp waiting
    let elsewhere = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ledger.check_in(1, LatLng::new(10.0, 20.0), None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let purge = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.presence.delete_zone(camp.id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let late = engine.ledger.check_in(2, LatLng::new(30.0, 40.0), None).await;

    assert_eq!(elsewhere.await.unwrap().unwrap().zone_id, pit.id);
    assert_eq!(purge.await.unwrap().unwrap(), ZoneRemoval::Purged { zone_id: camp.id });
    assert_eq!(late, Err(EngineError::OutsideAnyZone));
    assert!(engine.ledger.history(2).await.unwrap().is_empty());
}
