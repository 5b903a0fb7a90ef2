use std::path::PathBuf;

use async_trait::async_trait;
use vehicle_tax_core::db::{DbConfig, RepositoryFactory};
use vehicle_tax_core::{RepositoryError, TaxRuleStore};

use crate::repository::SqliteRuleStore;

/// Resolve the seeds directory at runtime so it works in both development and
/// packaged distribution.
///
/// Resolution order:
/// 1. **`VEHICLE_TAX_SQLITE_SEEDS_DIR`** if set.
/// 2. **`./seeds`** if the directory exists in the current working directory.
/// 3. **`$CARGO_MANIFEST_DIR/seeds`** as last resort (dev/tests run from the
///    build tree).
pub fn seeds_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VEHICLE_TAX_SQLITE_SEEDS_DIR") {
        return PathBuf::from(dir);
    }
    let cwd_seeds = PathBuf::from("./seeds");
    if cwd_seeds.is_dir() {
        return cwd_seeds;
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seeds")
}

/// [`RepositoryFactory`] for SQLite.
///
/// Register this with a [`vehicle_tax_core::db::RepositoryRegistry`] to make
/// the `"sqlite"` backend available:
///
/// ```rust,no_run
/// use vehicle_tax_core::db::RepositoryRegistry;
/// use vehicle_tax_db_sqlite::SqliteRepositoryFactory;
///
/// let mut registry = RepositoryRegistry::new();
/// registry.register(Box::new(SqliteRepositoryFactory));
/// ```
pub struct SqliteRepositoryFactory;

#[async_trait]
impl RepositoryFactory for SqliteRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Opens the database described by `config.connection_string` (a bare
    /// path, a `sqlite:` URL or `:memory:`), applies migrations and loads the
    /// seed rules. Seeds are idempotent, so reopening a file keeps any
    /// indexed versions written since.
    async fn create(&self, config: &DbConfig) -> Result<Box<dyn TaxRuleStore>, RepositoryError> {
        let store = SqliteRuleStore::connect(&config.connection_string)
            .await
            .map_err(|e| RepositoryError::Connection(format!("{:#}", e)))?;
        store
            .run_migrations()
            .await
            .map_err(|e| RepositoryError::Database(format!("{:#}", e)))?;
        store
            .run_seeds(&seeds_dir())
            .await
            .map_err(|e| RepositoryError::Database(format!("{:#}", e)))?;
        Ok(Box::new(store))
    }
}
