pub mod cache;
pub mod factory;
pub mod memory;
pub mod repository;

pub use cache::{CachedRuleStore, DEFAULT_CACHE_CAPACITY};
pub use factory::{DbConfig, RepositoryFactory, RepositoryRegistry};
pub use memory::{MemoryRepositoryFactory, MemoryRuleStore};
pub use repository::{ReductionStore, RepositoryError, RuleStore, TaxRuleStore};
