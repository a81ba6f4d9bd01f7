//! Storage seams for zones, attendance records and the audit trail.
//!
//! The engine only needs a store that can insert an open session and close
//! it with a conditional write. Both shipped backends enforce the
//! one-open-session rule themselves, so a second instance writing to the
//! same database cannot open a duplicate session.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::audit::AuditEntry;
use crate::model::zone::{GeofenceZone, LatLng, NewZone};
use crate::model::{RecordId, UserId, ZoneId};

#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn load_all(&self) -> StoreResult<Vec<GeofenceZone>>;

    /// Assigns the id. `created_at`/`updated_at` are taken from `at`.
    async fn insert(&self, zone: NewZone, at: DateTime<Utc>) -> StoreResult<GeofenceZone>;

    async fn update(&self, zone: &GeofenceZone) -> StoreResult<()>;

    /// Hard delete. Fails with `Referenced` while attendance rows point at it.
    async fn delete(&self, id: ZoneId) -> StoreResult<bool>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// The open, valid session of a worker, if any.
    async fn find_open(&self, user_id: UserId) -> StoreResult<Option<AttendanceRecord>>;

    /// Writes a new open session. Returns `StoreError::Conflict` when the
    /// worker already has an open valid session.
    async fn insert_open(&self, new: NewAttendance) -> StoreResult<AttendanceRecord>;

    /// Closes the record if it is still open and valid; `None` otherwise.
    async fn close(
        &self,
        record_id: RecordId,
        at: DateTime<Utc>,
        point: LatLng,
    ) -> StoreResult<Option<AttendanceRecord>>;

    async fn invalidate(&self, record_id: RecordId, reason: &str) -> StoreResult<Option<AttendanceRecord>>;

    async fn get(&self, record_id: RecordId) -> StoreResult<Option<AttendanceRecord>>;

    /// Every open, valid session.
    async fn list_open(&self) -> StoreResult<Vec<AttendanceRecord>>;

    /// A worker's records ordered by check-in time, oldest first.
    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<AttendanceRecord>>;

    async fn count_for_zone(&self, zone_id: ZoneId) -> StoreResult<u64>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;
}
