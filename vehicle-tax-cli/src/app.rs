use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use vehicle_tax_core::TaxEngine;
use vehicle_tax_core::TaxRuleStore;
use vehicle_tax_core::db::{CachedRuleStore, MemoryRepositoryFactory, RepositoryRegistry};
use vehicle_tax_db_sqlite::SqliteRepositoryFactory;

use crate::config::CliConfig;

type Store = CachedRuleStore<Arc<dyn TaxRuleStore>>;

/// Build a [`RepositoryRegistry`] with every backend this binary supports.
///
/// Adding a new backend means adding one `register` call here.
pub fn build_registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry.register(Box::new(MemoryRepositoryFactory));
    registry
}

/// The opened store and the engine running on top of it.
pub struct App {
    store: Arc<Store>,
    engine: TaxEngine,
    non_indexed_keys: Vec<String>,
}

impl App {
    /// Opens the configured backend and puts a rule cache in front of it.
    pub async fn open(config: &CliConfig) -> Result<Self> {
        let db_config = config.db_config();
        debug!(
            backend = %db_config.backend,
            connection = %db_config.connection_string,
            "opening rule store"
        );
        let store = build_registry().create(&db_config).await.with_context(|| {
            format!(
                "cannot open {} store '{}'",
                db_config.backend, db_config.connection_string
            )
        })?;
        Ok(Self::with_store(Arc::from(store), config))
    }

    pub fn with_store(store: Arc<dyn TaxRuleStore>, config: &CliConfig) -> Self {
        let store = Arc::new(CachedRuleStore::with_capacity(store, config.cache_capacity));
        let engine = TaxEngine::with_config(store.clone(), config.resolver_config());
        Self {
            store,
            engine,
            non_indexed_keys: config.non_indexed_keys.clone(),
        }
    }

    pub fn engine(&self) -> &TaxEngine {
        &self.engine
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn non_indexed_keys(&self) -> &[String] {
        &self.non_indexed_keys
    }
}
