//! Wires every layer's pieces into one running instance: a Postgres
//! pool, the schemas both the event store and the projections need,
//! the codec registry, and the command/query/orchestrator facades.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use vmforge_codec::CodecRegistry;
use vmforge_commands::{CommandHandlers, NoQuota, QuotaPort};
use vmforge_config::VmforgeConfig;
use vmforge_crypto::CredentialCipher;
use vmforge_hypervisor::HypervisorPort;
use vmforge_orchestrator::ProvisioningOrchestrator;
use vmforge_projections::{ProgressTracker, VmwareConfigurationStore};
use vmforge_query::{QueryHandlers, ReadRepository};
use vmforge_store::PgEventStore;

/// Everything a running instance needs, built from one config and one
/// set of out-of-scope port implementations.
pub struct Application {
    pub pool: PgPool,
    pub store: PgEventStore,
    pub registry: CodecRegistry,
    pub commands: CommandHandlers,
    pub queries: QueryHandlers,
    pub orchestrator: ProvisioningOrchestrator,
    pub config: VmforgeConfig,
    pub shutdown: CancellationToken,
}

impl Application {
    /// Connects to Postgres, ensures both the event-store and
    /// projection schemas exist, and wires every handler together.
    /// `quota` and `hypervisor` are the deployment's policy hooks and
    /// external-system port; pass [`NoQuota`] and a test double where
    /// neither is wired yet.
    pub async fn bootstrap(
        config: VmforgeConfig,
        cipher: Box<dyn CredentialCipher>,
        hypervisor: Box<dyn HypervisorPort>,
        quota: Box<dyn QuotaPort>,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;

        vmforge_store::ensure_schema(&pool).await?;
        vmforge_projections::ensure_schema(&pool).await?;

        let registry = CodecRegistry::new();
        let store = PgEventStore::new(pool.clone(), registry.clone());
        let repository = ReadRepository::new(pool.clone());
        let vmware_config = VmwareConfigurationStore::new(pool.clone(), cipher);
        let progress = ProgressTracker::new(pool.clone());
        let shutdown = CancellationToken::new();

        let commands = CommandHandlers::new(store.clone(), registry.clone(), quota);
        let queries = QueryHandlers::new(repository, pool.clone());
        let orchestrator = ProvisioningOrchestrator::new(
            store.clone(),
            registry.clone(),
            pool.clone(),
            vmware_config,
            progress,
            hypervisor,
            shutdown.clone(),
        );

        Ok(Self { pool, store, registry, commands, queries, orchestrator, config, shutdown })
    }

    /// Convenience constructor for local development: no quota
    /// enforcement, reading configuration from the process's working
    /// directory.
    pub async fn bootstrap_development(
        cipher: Box<dyn CredentialCipher>,
        hypervisor: Box<dyn HypervisorPort>,
    ) -> anyhow::Result<Self> {
        let config = VmforgeConfig::load().unwrap_or_default();
        Self::bootstrap(config, cipher, hypervisor, Box::new(NoQuota)).await
    }
}
