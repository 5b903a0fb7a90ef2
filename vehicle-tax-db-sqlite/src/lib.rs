//! SQLite backend for the vehicle tax rule store.
//!
//! Rule tables are created by the migrations under `migrations/` and filled
//! from the idempotent SQL files under `seeds/`.

mod decimal;
pub mod factory;
pub mod repository;

pub use factory::{SqliteRepositoryFactory, seeds_dir};
pub use repository::SqliteRuleStore;
