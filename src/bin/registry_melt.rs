//! registry-melt: Ingest Companies House resources into PostgreSQL
//!
//! Usage:
//!   # Officers, PSCs and company profiles for a list of company numbers
//!   registry-melt companies.csv --ol --psc --cp
//!
//!   # Appointment lists for officer paths, dumping every table afterwards
//!   registry-melt officers.txt --al --dump-dir ./tables
//!
//!   # Explicit settings file (REGISTRY_API_KEY and REGISTRY_DB_PASSWORD override it)
//!   registry-melt companies.csv --cp --config registry.toml

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use registry_melt::batch::{bootstrap, read_identifiers};
use registry_melt::melt::{catalog, dump_tables, TableWriter};
use registry_melt::{
    Ingestor, PaginatingRetriever, PostgresEngine, RateLimitedFetcher, ResourceSelection, Settings,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "registry-melt")]
#[command(about = "Ingest Companies House resources into relational tables", long_about = None)]
struct Args {
    /// .csv or .txt file holding the identifiers to query
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Persons with significant control
    #[arg(long)]
    psc: bool,

    /// Officer lists
    #[arg(long)]
    ol: bool,

    /// Company profiles
    #[arg(long)]
    cp: bool,

    /// Appointment lists; identifiers are officer appointment paths
    #[arg(long, conflicts_with_all = ["psc", "ol", "cp"])]
    al: bool,

    /// Write every table of the selected resources to DIR/<table>.jsonl
    #[arg(long, value_name = "DIR")]
    dump_dir: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging();

    let selection = ResourceSelection {
        psc: args.psc,
        officer_list: args.ol,
        company_profile: args.cp,
        appointment_list: args.al,
    };
    let ids = read_identifiers(&args.file)?;
    selection.validate(&ids)?;
    let configs = selection.configs();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    let engine = PostgresEngine::new(&settings.database);
    bootstrap(&engine, &configs)
        .await
        .context("Failed to create tables")?;

    let fetcher = RateLimitedFetcher::new(
        settings.registry.api_key()?,
        settings.registry.limiter(),
        settings.registry.retry_policy(),
        settings.registry.timeout(),
    )?;
    let retriever = PaginatingRetriever::new(fetcher, settings.registry.base_url.clone());

    info!(identifiers = ids.len(), resources = configs.len(), "starting batch");
    let report = Ingestor::new(&retriever, &engine).run(&ids, &configs).await;

    if let Some(dir) = &args.dump_dir {
        let tables: Vec<String> = configs.iter().flat_map(catalog::tables).collect();
        let mut writer = TableWriter::new(dir)?;
        let rows = dump_tables(&engine, &tables, &mut writer).await?;
        eprintln!("Dumped {} rows from {} tables to {}", rows, tables.len(), dir.display());
    }

    eprintln!("{}", report);
    for failure in report.failures() {
        eprintln!("  {} {}: {:?}", failure.resource, failure.id, failure.outcome);
    }
    if report.has_failures() {
        bail!("some identifiers failed to ingest");
    }

    Ok(())
}
