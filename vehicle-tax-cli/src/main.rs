use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use vehicle_tax_cli::app::App;
use vehicle_tax_cli::cmd::Command;
use vehicle_tax_cli::config::{CliConfig, Overrides};
use vehicle_tax_cli::logging;

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Belgian regional vehicle tax calculator.
///
/// Opens the configured rule store, resolves the rules in force on the
/// requested date and prints the result.
#[derive(Debug, Parser)]
#[command(name = "vtax", version)]
struct Cli {
    /// Configuration file; `vtax.toml` in the working directory when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database backend to use (`sqlite` or `memory`).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Database connection string.
    /// For SQLite this is a file path (e.g. `vehicle_tax.db`) or `:memory:`.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Upper bound in seconds on every rule store call.
    #[arg(long, global = true)]
    store_timeout: Option<u64>,

    /// Log level or EnvFilter directive; overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also append log output to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend.clone(),
            db: self.db.clone(),
            store_timeout_secs: self.store_timeout,
            log_level: self.log_level.clone(),
        }
    }
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())?.apply(cli.overrides());
    logging::init_logging(config.log_level.as_deref(), cli.log_file.as_deref())?;

    debug!("connecting to {} backend", config.database.backend);
    let app = App::open(&config).await?;

    let output = cli.command.run(&app, cli.json).await?;
    print!("{output}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "vtax",
            "rules",
            "bracket",
            "--region",
            "wallonia",
            "--db",
            ":memory:",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(
            cli.overrides(),
            Overrides {
                db: Some(":memory:".into()),
                ..Overrides::default()
            }
        );
    }

    #[test]
    fn calculate_requires_a_region() {
        let err = Cli::try_parse_from(["vtax", "calculate", "--fuel", "petrol", "--year", "2022"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn bracket_and_parameter_only_conflict() {
        let err = Cli::try_parse_from([
            "vtax",
            "index",
            "--rate",
            "1.02",
            "--effective",
            "2026-07-01",
            "--brackets-only",
            "--parameters-only",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
