use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::zone::LatLng;
use super::{RecordId, UserId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[derive(Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CheckIn,
    CheckOut,
    Invalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[derive(Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    OutsideAnyZone,
    AlreadyCheckedIn,
    NotCheckedIn,
    ConcurrencyConflict,
    Rejected,
}

/// What happened, as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    #[schema(value_type = Option<u64>)]
    pub user_id: Option<UserId>,
    #[schema(value_type = Option<u64>)]
    pub zone_id: Option<ZoneId>,
    #[schema(value_type = Option<u64>)]
    pub record_id: Option<RecordId>,
    pub point: Option<LatLng>,
    pub device_id: Option<String>,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            action,
            outcome,
            user_id: None,
            zone_id: None,
            record_id: None,
            point: None,
            device_id: None,
            detail: None,
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn zone(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn record(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn point(mut self, point: LatLng) -> Self {
        self.point = Some(point);
        self
    }

    pub fn device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// An event once it has been stamped for the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    #[schema(example = "0b6f1f2e-93c4-4a8e-a1e2-1f8e3c9f0d11")]
    pub id: String,
    #[schema(format = "date-time", value_type = String)]
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}
