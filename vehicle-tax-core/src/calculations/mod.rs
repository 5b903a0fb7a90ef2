//! Tax calculation for Belgian vehicle taxes.
//!
//! [`TaxCalculator`] runs the pipeline common to all regions; the regional
//! base amounts live in [`formulas`].

pub mod calculator;
pub mod common;
pub mod formulas;

pub use calculator::TaxCalculator;
pub use formulas::Formula;
