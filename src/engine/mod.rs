//! Zone membership and attendance state.

pub mod audit_log;
pub mod geometry;
pub mod ledger;
pub mod presence;
pub mod zone_registry;

use std::sync::Arc;
use std::time::Duration;

use sqlx::MySqlPool;

use crate::error::EngineResult;
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use crate::store::{AttendanceStore, AuditSink, ZoneStore};

use audit_log::AuditLog;
use ledger::AttendanceLedger;
use presence::PresenceQueryService;
use zone_registry::ZoneRegistry;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// The wired-up engine. Built once at start-up and shared by handle;
/// there is no global instance.
#[derive(Clone)]
pub struct Engine {
    pub zones: Arc<ZoneRegistry>,
    pub ledger: AttendanceLedger,
    pub presence: PresenceQueryService,
    pub audit: AuditLog,
}

impl Engine {
    /// Wires the components over explicit stores. Must run inside a tokio
    /// runtime (the audit writer is spawned here).
    pub async fn build(
        zone_store: Arc<dyn ZoneStore>,
        attendance_store: Arc<dyn AttendanceStore>,
        audit_sink: Arc<dyn AuditSink>,
        lock_timeout: Duration,
    ) -> EngineResult<Self> {
        let zones = Arc::new(ZoneRegistry::load(zone_store).await?);
        let audit = AuditLog::spawn(audit_sink);
        let ledger = AttendanceLedger::new(zones.clone(), attendance_store, audit.clone(), lock_timeout);
        let presence = PresenceQueryService::new(zones.clone(), ledger.clone());

        Ok(Self {
            zones,
            ledger,
            presence,
            audit,
        })
    }

    pub async fn in_memory(lock_timeout: Duration) -> EngineResult<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::build(store.clone(), store.clone(), store, lock_timeout).await
    }

    pub async fn mysql(pool: MySqlPool, lock_timeout: Duration) -> EngineResult<Self> {
        let store = Arc::new(MySqlStore::new(pool));
        Self::build(store.clone(), store.clone(), store, lock_timeout).await
    }
}
