//! CSV import of versioned rule tables.

mod loader;

pub use loader::{RuleLoader, RuleLoaderError, RuleRecord};
