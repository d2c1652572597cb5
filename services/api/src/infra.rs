use hireflow::applications::{HiringService, IntakePolicy, LocalDocumentStore};
use hireflow::config::{AppConfig, IntakeConfig, StorageConfig};
use hireflow::db::{Database, SqliteApplicationRepository};
use hireflow::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

pub(crate) type ApiService = HiringService<SqliteApplicationRepository, LocalDocumentStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn open_database(storage: &StorageConfig) -> Result<Database, AppError> {
    if storage.is_in_memory() {
        warn!("using an in-memory database; records are lost on shutdown");
        return Ok(Database::open_in_memory()?);
    }
    Ok(Database::open(Path::new(storage.database_path.trim()))?)
}

pub(crate) fn intake_policy(intake: &IntakeConfig) -> IntakePolicy {
    IntakePolicy::new(intake.profile, intake.allow_images)
}

pub(crate) fn build_service(config: &AppConfig) -> Result<Arc<ApiService>, AppError> {
    let database = open_database(&config.storage)?;
    let repository = Arc::new(SqliteApplicationRepository::new(database));
    let documents = Arc::new(LocalDocumentStore::open(&config.storage.upload_dir)?);

    Ok(Arc::new(HiringService::new(
        repository,
        documents,
        intake_policy(&config.intake),
    )))
}
