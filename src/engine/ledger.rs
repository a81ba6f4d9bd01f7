use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::audit_log::AuditLog;
use super::geometry;
use super::zone_registry::ZoneRegistry;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::audit::{AuditAction, AuditEvent, AuditOutcome};
use crate::model::zone::LatLng;
use crate::model::{RecordId, UserId, ZoneId};
use crate::store::AttendanceStore;

/// One async mutex per worker. Entries are never evicted; the table is sized
/// by the site's headcount.
#[derive(Default)]
struct UserLocks {
    table: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: UserId, wait: Duration) -> EngineResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(user_id).or_default().clone()
        };

        tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| EngineError::ConcurrencyConflict)
    }
}

struct LedgerInner {
    zones: Arc<ZoneRegistry>,
    store: Arc<dyn AttendanceStore>,
    audit: AuditLog,
    locks: UserLocks,
    lock_timeout: Duration,
}

/// The only writer of attendance state.
///
/// Check-in and check-out for a worker run under that worker's lock, and the
/// store re-checks the one-open-session rule on write. Each transition runs
/// as its own task, so a caller that gives up half way does not cut it short.
#[derive(Clone)]
pub struct AttendanceLedger {
    inner: Arc<LedgerInner>,
}

impl AttendanceLedger {
    pub fn new(
        zones: Arc<ZoneRegistry>,
        store: Arc<dyn AttendanceStore>,
        audit: AuditLog,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                zones,
                store,
                audit,
                locks: UserLocks::default(),
                lock_timeout,
            }),
        }
    }

    pub async fn check_in(
        &self,
        user_id: UserId,
        point: LatLng,
        device_id: Option<String>,
    ) -> EngineResult<AttendanceRecord> {
        let inner = self.inner.clone();
        run_to_completion(async move { inner.check_in(user_id, point, device_id).await }).await
    }

    pub async fn check_out(&self, user_id: UserId, point: LatLng) -> EngineResult<AttendanceRecord> {
        let inner = self.inner.clone();
        run_to_completion(async move { inner.check_out(user_id, point).await }).await
    }

    /// Voids a record (e.g. spoofed GPS). Opens and closes nothing.
    pub async fn invalidate(&self, record_id: RecordId, reason: &str) -> EngineResult<AttendanceRecord> {
        let inner = self.inner.clone();
        let reason = reason.to_string();
        run_to_completion(async move { inner.invalidate(record_id, &reason).await }).await
    }

    pub async fn open_session(&self, user_id: UserId) -> EngineResult<Option<AttendanceRecord>> {
        Ok(self.inner.store.find_open(user_id).await?)
    }

    pub async fn open_sessions(&self) -> EngineResult<Vec<AttendanceRecord>> {
        Ok(self.inner.store.list_open().await?)
    }

    pub async fn history(&self, user_id: UserId) -> EngineResult<Vec<AttendanceRecord>> {
        Ok(self.inner.store.list_for_user(user_id).await?)
    }

    pub async fn get(&self, record_id: RecordId) -> EngineResult<AttendanceRecord> {
        self.inner
            .store
            .get(record_id)
            .await?
            .ok_or(EngineError::RecordNotFound(record_id))
    }

    pub async fn has_history(&self, zone_id: ZoneId) -> EngineResult<bool> {
        Ok(self.inner.store.count_for_zone(zone_id).await? > 0)
    }
}

async fn run_to_completion<T, F>(transition: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: Future<Output = EngineResult<T>> + Send + 'static,
{
    tokio::spawn(transition)
        .await
        .map_err(|e| EngineError::Internal(format!("attendance transition aborted: {}", e)))?
}

impl LedgerInner {
    async fn check_in(
        &self,
        user_id: UserId,
        point: LatLng,
        device_id: Option<String>,
    ) -> EngineResult<AttendanceRecord> {
        let event = AuditEvent::new(AuditAction::CheckIn, AuditOutcome::Accepted)
            .user(user_id)
            .point(point)
            .device(device_id.clone());

        if let Err(e) = geometry::validate_point(point) {
            return Err(self.reject(event, AuditOutcome::Rejected, e));
        }

        if self.zones.resolve_zones(point).is_empty() {
            return Err(self.reject(event, AuditOutcome::OutsideAnyZone, EngineError::OutsideAnyZone));
        }

        let _guard = match self.locks.acquire(user_id, self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => return Err(self.reject(event, AuditOutcome::ConcurrencyConflict, e)),
        };

        // resolve again under the gate: a zone seen here cannot be purged
        // until the insert below has landed
        let _admitted = self.zones.admit().await;
        // overlapping zones: lowest id wins
        let Some(&zone_id) = self.zones.resolve_zones(point).first() else {
            return Err(self.reject(event, AuditOutcome::OutsideAnyZone, EngineError::OutsideAnyZone));
        };
        let event = event.zone(zone_id);

        if let Some(open) = self.store.find_open(user_id).await? {
            return Err(self.reject(
                event.record(open.id),
                AuditOutcome::AlreadyCheckedIn,
                EngineError::AlreadyCheckedIn,
            ));
        }

        let new = NewAttendance {
            user_id,
            zone_id,
            device_id,
            check_in_time: Utc::now(),
            check_in_point: point,
        };
        match self.store.insert_open(new).await {
            Ok(record) => {
                info!(user_id, zone_id, record_id = record.id, "Checked in");
                self.audit.record(event.record(record.id));
                Ok(record)
            }
            Err(StoreError::Conflict) => Err(self.reject(
                event,
                AuditOutcome::ConcurrencyConflict,
                EngineError::ConcurrencyConflict,
            )),
            // zone purged by another instance after it was resolved
            Err(StoreError::Referenced) => Err(self.reject(
                event,
                AuditOutcome::OutsideAnyZone,
                EngineError::OutsideAnyZone,
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_out(&self, user_id: UserId, point: LatLng) -> EngineResult<AttendanceRecord> {
        let event = AuditEvent::new(AuditAction::CheckOut, AuditOutcome::Accepted)
            .user(user_id)
            .point(point);

        if let Err(e) = geometry::validate_point(point) {
            return Err(self.reject(event, AuditOutcome::Rejected, e));
        }

        let _guard = match self.locks.acquire(user_id, self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => return Err(self.reject(event, AuditOutcome::ConcurrencyConflict, e)),
        };

        let Some(open) = self.store.find_open(user_id).await? else {
            return Err(self.reject(event, AuditOutcome::NotCheckedIn, EngineError::NotCheckedIn));
        };
        let event = event.zone(open.zone_id).record(open.id);

        // the checkout point is only recorded, it does not have to be in a zone
        match self.store.close(open.id, Utc::now(), point).await? {
            Some(record) => {
                info!(user_id, zone_id = record.zone_id, record_id = record.id, "Checked out");
                self.audit.record(event);
                Ok(record)
            }
            // closed or voided by another instance between read and write
            None => Err(self.reject(
                event,
                AuditOutcome::ConcurrencyConflict,
                EngineError::ConcurrencyConflict,
            )),
        }
    }

    async fn invalidate(&self, record_id: RecordId, reason: &str) -> EngineResult<AttendanceRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("an invalidation reason is required"));
        }

        let existing = self
            .store
            .get(record_id)
            .await?
            .ok_or(EngineError::RecordNotFound(record_id))?;

        let _guard = self.locks.acquire(existing.user_id, self.lock_timeout).await?;
        let record = self
            .store
            .invalidate(record_id, reason)
            .await?
            .ok_or(EngineError::RecordNotFound(record_id))?;

        warn!(record_id, user_id = record.user_id, reason, "Attendance record invalidated");
        self.audit.record(
            AuditEvent::new(AuditAction::Invalidate, AuditOutcome::Accepted)
                .user(record.user_id)
                .zone(record.zone_id)
                .record(record.id)
                .detail(reason),
        );
        Ok(record)
    }

    fn reject(&self, mut event: AuditEvent, outcome: AuditOutcome, err: EngineError) -> EngineError {
        event.outcome = outcome;
        if outcome == AuditOutcome::Rejected {
            event = event.detail(err.to_string());
        }
        info!(
            user_id = ?event.user_id,
            action = %event.action,
            outcome = %outcome,
            "Attendance transition rejected"
        );
        self.audit.record(event);
        err
    }
}
