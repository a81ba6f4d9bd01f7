use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::zone::LatLng;
use super::{RecordId, UserId, ZoneId};

/// One continuous presence session of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "user_id": 7,
    "zone_id": 1,
    "device_id": "handset-0142",
    "check_in_time": "2026-01-01T06:02:11Z",
    "check_in_point": { "latitude": 10.0003, "longitude": 20.0 },
    "check_out_time": null,
    "check_out_point": null,
    "is_valid": true,
    "invalidated_reason": null
}))]
pub struct AttendanceRecord {
    #[schema(value_type = u64)]
    pub id: RecordId,
    #[schema(value_type = u64)]
    pub user_id: UserId,
    #[schema(value_type = u64)]
    pub zone_id: ZoneId,
    pub device_id: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub check_in_time: DateTime<Utc>,
    pub check_in_point: LatLng,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_point: Option<LatLng>,
    pub is_valid: bool,
    pub invalidated_reason: Option<String>,
}

impl AttendanceRecord {
    /// Open and valid: the record that makes its worker PRESENT.
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none() && self.is_valid
    }
}

/// A check-in about to be written; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: UserId,
    pub zone_id: ZoneId,
    pub device_id: Option<String>,
    pub check_in_time: DateTime<Utc>,
    pub check_in_point: LatLng,
}

impl NewAttendance {
    pub fn into_record(self, id: RecordId) -> AttendanceRecord {
        AttendanceRecord {
            id,
            user_id: self.user_id,
            zone_id: self.zone_id,
            device_id: self.device_id,
            check_in_time: self.check_in_time,
            check_in_point: self.check_in_point,
            check_out_time: None,
            check_out_point: None,
            is_valid: true,
            invalidated_reason: None,
        }
    }
}
