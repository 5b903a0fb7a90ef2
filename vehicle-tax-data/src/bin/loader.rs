use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vehicle_tax_data::RuleLoader;
use vehicle_tax_db_sqlite::SqliteRuleStore;

/// Load versioned rule rows from a CSV file into the database.
///
/// The CSV file should have the following columns:
/// - family: bracket, parameter, age_coefficient or exemption
/// - region: wallonia, flanders or brussels
/// - tax_type: tmc or annual
/// - key: bracket key, parameter key or exemption condition (empty for ages)
/// - min_value / max_value: bracket range, or the age for age coefficients
/// - value: amount, parameter value or coefficient (empty for exemptions)
/// - valid_from / valid_to: ISO dates (empty valid_to for open-ended)
#[derive(Parser, Debug)]
#[command(name = "vehicle-tax-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the CSV file containing rule rows
    #[arg(short, long)]
    file: PathBuf,

    /// SQLite database path or URL (created if missing)
    #[arg(short, long, default_value = "vehicle_tax.db")]
    database: String,

    /// Run database migrations before loading data
    #[arg(short, long, default_value_t = false)]
    migrate: bool,

    /// Run seed files from the specified directory after migrations
    #[arg(short, long)]
    seeds: Option<PathBuf>,

    /// Close open versions that the loaded rows replace
    #[arg(long, default_value_t = false)]
    supersede: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let store = SqliteRuleStore::connect(&args.database)
        .await
        .with_context(|| format!("Failed to connect to database: {}", args.database))?;

    if args.migrate {
        println!("Running migrations...");
        store
            .run_migrations()
            .await
            .context("Failed to run migrations")?;
        println!("Migrations complete.");
    }

    if let Some(seeds_dir) = &args.seeds {
        println!("Running seeds from: {}", seeds_dir.display());
        store
            .run_seeds(seeds_dir)
            .await
            .with_context(|| format!("Failed to run seeds from: {}", seeds_dir.display()))?;
        println!("Seeds complete.");
    }

    println!("Loading rules from: {}", args.file.display());

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open: {}", args.file.display()))?;

    let records = RuleLoader::parse(file)
        .with_context(|| format!("Failed to parse CSV: {}", args.file.display()))?;

    println!("Parsed {} records from CSV", records.len());

    let stored = RuleLoader::load(&store, &records, args.supersede)
        .await
        .context("Failed to load rules into database")?;

    println!("Successfully loaded {} rule versions into the database.", stored.len());

    Ok(())
}
