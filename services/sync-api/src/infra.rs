use membership_sync::config::AppConfig;
use membership_sync::error::AppError;
use membership_sync::membership::{
    ApplicationStatus, ReconciliationEngine, RoleEligibilityPolicy, SqliteMembershipStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type SqliteEngine = ReconciliationEngine<SqliteMembershipStore, RoleEligibilityPolicy>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) service_name: Arc<str>,
}

/// Opens an existing database file. A missing file is reported instead of silently creating an
/// empty database that would then fail every read.
pub(crate) fn open_existing_store(path: &Path) -> Result<SqliteMembershipStore, AppError> {
    std::fs::metadata(path)?;
    Ok(SqliteMembershipStore::open(path)?)
}

/// Opens the database, creating the file and its parent directory when needed.
pub(crate) fn open_or_create_store(path: &Path) -> Result<SqliteMembershipStore, AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteMembershipStore::open(path)?)
}

pub(crate) fn build_engine(config: &AppConfig, store: SqliteMembershipStore) -> SqliteEngine {
    let policy = RoleEligibilityPolicy::new(&config.membership.eligible_roles);
    ReconciliationEngine::new(Arc::new(store), Arc::new(policy))
        .with_initial_status(ApplicationStatus::parse(&config.membership.initial_status))
}
