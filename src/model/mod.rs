pub mod attendance;
pub mod audit;
pub mod role;
pub mod zone;

/// Worker / user identity issued by the external auth layer.
pub type UserId = u64;
pub type ZoneId = u64;
pub type RecordId = u64;
