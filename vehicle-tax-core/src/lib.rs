pub mod calculations;
pub mod db;
pub mod engine;
pub mod error;
pub mod indexation;
pub mod models;
pub mod resolver;

pub use calculations::TaxCalculator;
pub use db::repository::{ReductionStore, RepositoryError, RuleStore, TaxRuleStore};
pub use engine::TaxEngine;
pub use error::TaxError;
pub use indexation::Indexer;
pub use models::*;
pub use resolver::{ResolverConfig, RuleResolver};
