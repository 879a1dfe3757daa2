// lineage-sync - Schema reconciliation service
// Core library

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod repository;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use audit::{AuditCode, AuditRecord, AuditStore};
use config::SyncConfig;
use engine::{
    DerivedColumnReconciler, DispatchOutcome, EntityResolver, EventDispatcher,
    LineageGraphBuilder, RetryPolicy, RunStats, TimedRepository,
};
use lineage_core::{MetadataRepository, TypeCatalog};

/// Event kind recorded on service lifecycle audit entries
const LIFECYCLE: &str = "lifecycle";

/// The wired reconciliation service
pub struct SyncService {
    pub config: SyncConfig,
    pub catalog: Arc<TypeCatalog>,
    /// The injected repository behind the per-call timeout
    pub repository: Arc<dyn MetadataRepository>,
    pub audit: Arc<AuditStore>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl SyncService {
    /// Wires the service with a file-backed audit log under `config.data_dir`
    pub fn new(config: SyncConfig, repository: Arc<dyn MetadataRepository>) -> Self {
        let audit = Arc::new(AuditStore::new(
            config.data_dir.clone(),
            config.audit.max_entries,
        ));
        Self::with_parts(config, Arc::new(TypeCatalog::default()), repository, audit)
    }

    pub fn with_parts(
        config: SyncConfig,
        catalog: Arc<TypeCatalog>,
        repository: Arc<dyn MetadataRepository>,
        audit: Arc<AuditStore>,
    ) -> Self {
        audit.set_enabled(config.audit.enabled);
        record_lifecycle(&audit, AuditCode::ServiceInitializing, &config.server_name);

        let repository: Arc<dyn MetadataRepository> = Arc::new(TimedRepository::new(
            repository,
            config.repository_timeout(),
        ));
        let resolver = Arc::new(EntityResolver::new(
            Arc::clone(&repository),
            Arc::clone(&catalog),
        ));
        let builder = Arc::new(LineageGraphBuilder::new(Arc::clone(&resolver)));
        let reconciler = Arc::new(DerivedColumnReconciler::new(
            Arc::clone(&resolver),
            audit.clone(),
            config.column_concurrency,
            config.stale_column_policy,
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            builder,
            reconciler,
            audit.clone(),
            RetryPolicy::from(&config.retry),
        ));

        info!(
            server = %config.server_name,
            repository = repository.repository_id(),
            column_concurrency = config.column_concurrency,
            "Lineage sync service initialized"
        );
        record_lifecycle(&audit, AuditCode::ServiceInitialized, &config.server_name);

        Self {
            config,
            catalog,
            repository,
            audit,
            dispatcher,
        }
    }

    pub async fn dispatch(&self, payload: &str) -> DispatchOutcome {
        self.dispatcher.dispatch(payload).await
    }

    /// Consumes the channel until it closes or `shutdown` fires, then shuts down
    pub async fn run(
        &self,
        receiver: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) -> RunStats {
        let stats = self.dispatcher.run(receiver, shutdown).await;
        info!(
            dispatched = stats.dispatched,
            dropped = stats.dropped,
            failed = stats.failed,
            "Event stream finished"
        );
        self.shutdown();
        stats
    }

    pub fn shutdown(&self) {
        info!(server = %self.config.server_name, "Lineage sync service shutting down");
        record_lifecycle(
            &self.audit,
            AuditCode::ServiceShutdown,
            &self.config.server_name,
        );
    }
}

fn record_lifecycle(audit: &AuditStore, code: AuditCode, server_name: &str) {
    audit.log(AuditRecord::new(code, LIFECYCLE, &[server_name]));
}
