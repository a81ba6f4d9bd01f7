//! MySQL backend.
//!
//! `attendance_records.open_user_id` is a stored generated column that holds
//! `user_id` only while the row is open and valid. Its UNIQUE index is what
//! keeps two service instances from opening two sessions for one worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, MySqlPool};

use super::{AttendanceStore, AuditSink, ZoneStore};
use crate::error::{StoreError, StoreResult};
use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::audit::{AuditEntry, AuditEvent};
use crate::model::zone::{GeofenceZone, LatLng, NewZone, ZoneShape};
use crate::model::{RecordId, UserId, ZoneId};

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ZoneRow {
    id: u64,
    name: String,
    description: Option<String>,
    shape: Json<ZoneShape>,
    is_active: bool,
    created_by: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ZoneRow> for GeofenceZone {
    fn from(row: ZoneRow) -> Self {
        GeofenceZone {
            id: row.id,
            name: row.name,
            description: row.description,
            shape: row.shape.0,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    user_id: u64,
    zone_id: u64,
    device_id: Option<String>,
    check_in_time: DateTime<Utc>,
    check_in_lat: f64,
    check_in_lng: f64,
    check_out_time: Option<DateTime<Utc>>,
    check_out_lat: Option<f64>,
    check_out_lng: Option<f64>,
    is_valid: bool,
    invalidated_reason: Option<String>,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        let check_out_point = match (row.check_out_lat, row.check_out_lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        };
        AttendanceRecord {
            id: row.id,
            user_id: row.user_id,
            zone_id: row.zone_id,
            device_id: row.device_id,
            check_in_time: row.check_in_time,
            check_in_point: LatLng::new(row.check_in_lat, row.check_in_lng),
            check_out_time: row.check_out_time,
            check_out_point,
            is_valid: row.is_valid,
            invalidated_reason: row.invalidated_reason,
        }
    }
}

const ATTENDANCE_COLUMNS: &str = r#"
    id, user_id, zone_id, device_id,
    check_in_time, check_in_lat, check_in_lng,
    check_out_time, check_out_lat, check_out_lng,
    is_valid, invalidated_reason
"#;

#[derive(FromRow)]
struct AuditRow {
    id: String,
    recorded_at: DateTime<Utc>,
    event: Json<AuditEvent>,
}

#[async_trait]
impl ZoneStore for MySqlStore {
    async fn load_all(&self) -> StoreResult<Vec<GeofenceZone>> {
        let rows = sqlx::query_as::<_, ZoneRow>(
            r#"
            SELECT id, name, description, shape, is_active, created_by, created_at, updated_at
            FROM geofence_zones
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GeofenceZone::from).collect())
    }

    async fn insert(&self, zone: NewZone, at: DateTime<Utc>) -> StoreResult<GeofenceZone> {
        let result = sqlx::query(
            r#"
            INSERT INTO geofence_zones
                (name, description, shape, is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&zone.name)
        .bind(&zone.description)
        .bind(Json(&zone.shape))
        .bind(zone.is_active)
        .bind(zone.created_by)
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(GeofenceZone {
            id: result.last_insert_id(),
            name: zone.name,
            description: zone.description,
            shape: zone.shape,
            is_active: zone.is_active,
            created_by: zone.created_by,
            created_at: at,
            updated_at: at,
        })
    }

    async fn update(&self, zone: &GeofenceZone) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE geofence_zones
            SET name = ?, description = ?, shape = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&zone.name)
        .bind(&zone.description)
        .bind(Json(&zone.shape))
        .bind(zone.is_active)
        .bind(zone.updated_at)
        .bind(zone.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: ZoneId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM geofence_zones WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_open(&self, user_id: UserId) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE open_user_id = ?",
            ATTENDANCE_COLUMNS
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AttendanceRecord::from))
    }

    async fn insert_open(&self, new: NewAttendance) -> StoreResult<AttendanceRecord> {
        // duplicate key on open_user_id surfaces as StoreError::Conflict
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (user_id, zone_id, device_id, check_in_time, check_in_lat, check_in_lng)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.zone_id)
        .bind(&new.device_id)
        .bind(new.check_in_time)
        .bind(new.check_in_point.latitude)
        .bind(new.check_in_point.longitude)
        .execute(&self.pool)
        .await?;

        Ok(new.into_record(result.last_insert_id()))
    }

    async fn close(
        &self,
        record_id: RecordId,
        at: DateTime<Utc>,
        point: LatLng,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out_time = ?, check_out_lat = ?, check_out_lng = ?
            WHERE id = ?
            AND check_out_time IS NULL
            AND is_valid = TRUE
            "#,
        )
        .bind(at)
        .bind(point.latitude)
        .bind(point.longitude)
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let sql = format!("SELECT {} FROM attendance_records WHERE id = ?", ATTENDANCE_COLUMNS);
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(record_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(row.into()))
    }

    async fn invalidate(&self, record_id: RecordId, reason: &str) -> StoreResult<Option<AttendanceRecord>> {
        sqlx::query(
            r#"
            UPDATE attendance_records
            SET is_valid = FALSE, invalidated_reason = ?
            WHERE id = ?
            AND is_valid = TRUE
            "#,
        )
        .bind(reason)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        self.get(record_id).await
    }

    async fn get(&self, record_id: RecordId) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!("SELECT {} FROM attendance_records WHERE id = ?", ATTENDANCE_COLUMNS);
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AttendanceRecord::from))
    }

    async fn list_open(&self) -> StoreResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE open_user_id IS NOT NULL",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> StoreResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {} FROM attendance_records WHERE user_id = ? ORDER BY check_in_time, id",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn count_for_zone(&self, zone_id: ZoneId) -> StoreResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM attendance_records WHERE zone_id = ?")
                .bind(zone_id)
                .fetch_one(&self.pool)
                .await?;

        u64::try_from(count).map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl AuditSink for MySqlStore {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_audit (id, recorded_at, user_id, action, outcome, event)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.recorded_at)
        .bind(entry.event.user_id)
        .bind(entry.event.action.to_string())
        .bind(entry.event.outcome.to_string())
        .bind(Json(&entry.event))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, recorded_at, event
            FROM attendance_audit
            ORDER BY recorded_at DESC, seq DESC
            LIMIT ?
            "#,
        )
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEntry {
                id: row.id,
                recorded_at: row.recorded_at,
                event: row.event.0,
            })
            .collect())
    }
}
