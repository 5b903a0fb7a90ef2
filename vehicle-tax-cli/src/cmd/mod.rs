//! `vtax` subcommands. Each one returns the text to print on stdout, either
//! the plain report or pretty JSON when `--json` is given.

mod calculate;
mod index;
mod reductions;
mod rules;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use vehicle_tax_core::{Region, TaxType};

use crate::app::App;

pub use calculate::CalculateCommand;
pub use index::IndexCommand;
pub use reductions::ReductionsCommand;
pub use rules::RulesCommand;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calculate the TMC and/or annual tax of a vehicle
    Calculate(CalculateCommand),
    /// Index open brackets and parameters by a rate from an effective date
    Index(IndexCommand),
    /// List stored rule versions
    Rules(RulesCommand),
    /// List reduction types and the values in force
    Reductions(ReductionsCommand),
}

impl Command {
    pub async fn run(&self, app: &App, json: bool) -> Result<String> {
        match self {
            Command::Calculate(cmd) => cmd.run(app, json).await,
            Command::Index(cmd) => cmd.run(app, json).await,
            Command::Rules(cmd) => cmd.run(app, json).await,
            Command::Reductions(cmd) => cmd.run(app, json).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegionArg {
    Wallonia,
    Flanders,
    Brussels,
}

impl From<RegionArg> for Region {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::Wallonia => Region::Wallonia,
            RegionArg::Flanders => Region::Flanders,
            RegionArg::Brussels => Region::Brussels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaxTypeArg {
    Tmc,
    Annual,
}

impl From<TaxTypeArg> for TaxType {
    fn from(arg: TaxTypeArg) -> Self {
        match arg {
            TaxTypeArg::Tmc => TaxType::Tmc,
            TaxTypeArg::Annual => TaxType::Annual,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}
