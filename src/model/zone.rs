use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{UserId, ZoneId};

/// A decimal-degree coordinate as reported by a worker's device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "latitude": 10.0003, "longitude": 20.0 }))]
pub struct LatLng {
    #[schema(example = 10.0003)]
    pub latitude: f64,
    #[schema(example = 20.0)]
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneShape {
    Circle { center: LatLng, radius_meters: f64 },
    /// Open ring; the closing edge back to the first vertex is implied.
    Polygon { vertices: Vec<LatLng> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "North pit",
    "description": "Loading bay and crusher",
    "shape": { "type": "circle", "center": { "latitude": 10.0, "longitude": 20.0 }, "radius_meters": 50.0 },
    "is_active": true,
    "created_by": 7,
    "created_at": "2026-01-01T06:00:00Z",
    "updated_at": "2026-01-01T06:00:00Z"
}))]
pub struct GeofenceZone {
    #[schema(value_type = u64)]
    pub id: ZoneId,
    pub name: String,
    pub description: Option<String>,
    pub shape: ZoneShape,
    pub is_active: bool,
    #[schema(value_type = u64)]
    pub created_by: UserId,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(format = "date-time", value_type = String)]
    pub updated_at: DateTime<Utc>,
}

/// Payload for a new zone; the id and timestamps are assigned on insert.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewZone {
    #[schema(example = "North pit")]
    pub name: String,
    pub description: Option<String>,
    pub shape: ZoneShape,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(skip)]
    pub created_by: UserId,
}

fn default_active() -> bool {
    true
}

// Only called when the key is present, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Full-field update. Omitted fields keep their current value; an explicit
/// `"description": null` clears the description.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ZonePatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub shape: Option<ZoneShape>,
    pub is_active: Option<bool>,
}

impl ZonePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.shape.is_none()
            && self.is_active.is_none()
    }

    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, zone: &mut GeofenceZone, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            zone.name = name;
        }
        if let Some(description) = self.description {
            zone.description = description;
        }
        if let Some(shape) = self.shape {
            zone.shape = shape;
        }
        if let Some(active) = self.is_active {
            zone.is_active = active;
        }
        zone.updated_at = now;
    }
}
