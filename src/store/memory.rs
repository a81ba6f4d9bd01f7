//! In-process storage, used by tests and single-instance deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{AttendanceStore, AuditSink, ZoneStore};
use crate::error::{StoreError, StoreResult};
use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::audit::AuditEntry;
use crate::model::zone::{GeofenceZone, LatLng, NewZone};
use crate::model::{RecordId, UserId, ZoneId};

#[derive(Debug, Default)]
struct AttendanceState {
    next_id: RecordId,
    records: BTreeMap<RecordId, AttendanceRecord>,
    // user -> their open, valid record
    open_by_user: HashMap<UserId, RecordId>,
}

#[derive(Debug, Default)]
struct ZoneState {
    next_id: ZoneId,
    zones: BTreeMap<ZoneId, GeofenceZone>,
}

/// Thread-safe memory store. Every mutation happens under one write lock, so
/// the open-session check and the insert are a single step.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    zones: Arc<RwLock<ZoneState>>,
    attendance: Arc<RwLock<AttendanceState>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ZoneStore for MemoryStore {
    async fn load_all(&self) -> StoreResult<Vec<GeofenceZone>> {
        let state = self.zones.read().await;
        Ok(state.zones.values().cloned().collect())
    }

    async fn insert(&self, zone: NewZone, at: DateTime<Utc>) -> StoreResult<GeofenceZone> {
        let mut state = self.zones.write().await;
        state.next_id += 1;
        let stored = GeofenceZone {
            id: state.next_id,
            name: zone.name,
            description: zone.description,
            shape: zone.shape,
            is_active: zone.is_active,
            created_by: zone.created_by,
            created_at: at,
            updated_at: at,
        };
        state.zones.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, zone: &GeofenceZone) -> StoreResult<()> {
        let mut state = self.zones.write().await;
        match state.zones.get_mut(&zone.id) {
            Some(existing) => {
                *existing = zone.clone();
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!("zone {} vanished", zone.id))),
        }
    }

    async fn delete(&self, id: ZoneId) -> StoreResult<bool> {
        // lock order: attendance, then zones
        let attendance = self.attendance.read().await;
        if attendance.records.values().any(|r| r.zone_id == id) {
            return Err(StoreError::Referenced);
        }
        let mut state = self.zones.write().await;
        Ok(state.zones.remove(&id).is_some())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_open(&self, user_id: UserId) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.attendance.read().await;
        Ok(state
            .open_by_user
            .get(&user_id)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn insert_open(&self, new: NewAttendance) -> StoreResult<AttendanceRecord> {
        // lock order: attendance, then zones
        let mut state = self.attendance.write().await;
        if !self.zones.read().await.zones.contains_key(&new.zone_id) {
            return Err(StoreError::Referenced);
        }
        if state.open_by_user.contains_key(&new.user_id) {
            return Err(StoreError::Conflict);
        }
        state.next_id += 1;
        let record = new.into_record(state.next_id);
        state.open_by_user.insert(record.user_id, record.id);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn close(
        &self,
        record_id: RecordId,
        at: DateTime<Utc>,
        point: LatLng,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let mut state = self.attendance.write().await;
        let Some(record) = state.records.get_mut(&record_id) else {
            return Ok(None);
        };
        if !record.is_open() {
            return Ok(None);
        }
        record.check_out_time = Some(at);
        record.check_out_point = Some(point);
        let closed = record.clone();
        state.open_by_user.remove(&closed.user_id);
        Ok(Some(closed))
    }

    async fn invalidate(&self, record_id: RecordId, reason: &str) -> StoreResult<Option<AttendanceRecord>> {
        let mut state = self.attendance.write().await;
        let Some(record) = state.records.get_mut(&record_id) else {
            return Ok(None);
        };
        if record.is_valid {
            record.is_valid = false;
            record.invalidated_reason = Some(reason.to_string());
        }
        let invalidated = record.clone();
        if state.open_by_user.get(&invalidated.user_id) == Some(&record_id) {
            state.open_by_user.remove(&invalidated.user_id);
        }
        Ok(Some(invalidated))
    }

    async fn get(&self, record_id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.attendance.read().await;
        Ok(state.records.get(&record_id).cloned())
    }

    async fn list_open(&self) -> StoreResult<Vec<AttendanceRecord>> {
        let state = self.attendance.read().await;
        Ok(state
            .open_by_user
            .values()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<AttendanceRecord>> {
        let state = self.attendance.read().await;
        let mut records: Vec<AttendanceRecord> = state
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.check_in_time, r.id));
        Ok(records)
    }

    async fn count_for_zone(&self, zone_id: ZoneId) -> StoreResult<u64> {
        let state = self.attendance.read().await;
        Ok(state.records.values().filter(|r| r.zone_id == zone_id).count() as u64)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let entries = self.audit.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
