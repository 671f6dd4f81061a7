use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use mfdp_core::DataCategory;
use mfdp_import::ImportConfig;
use mfdp_reports::ReportService;
use mfdp_storage::{MemoryFundStore, PgFundStore, StatusBoard};
use mfdp_web::WebConfig;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mfdp-cli")]
#[command(about = "Mutual fund data platform command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import workbooks from the data directory
    Import(ImportArgs),
    /// Apply database migrations
    Migrate,
    /// Run the HTTP API
    Serve {
        /// Use an in-process store instead of Postgres
        #[arg(long)]
        memory: bool,
    },
    /// Analytics report for one fund
    Report { isin: String },
    /// Side-by-side comparison of two or more funds
    Compare {
        #[arg(required = true, num_args = 2..)]
        isins: Vec<String>,
    },
    /// Portfolio overlap across two or more funds
    Overlap {
        #[arg(required = true, num_args = 2..)]
        isins: Vec<String>,
    },
    /// Show or reset per-flow import status
    Status {
        #[arg(long)]
        clear: bool,
        #[arg(long)]
        flow: Option<String>,
    },
}

#[derive(Debug, Default, Args)]
struct ImportArgs {
    #[arg(long)]
    factsheet: bool,
    #[arg(long)]
    returns: bool,
    #[arg(long)]
    portfolio: bool,
    #[arg(long)]
    nav: bool,
    #[arg(long)]
    all: bool,
    /// Delete existing rows of each selected category first
    #[arg(long)]
    clear: bool,
}

impl ImportArgs {
    /// Selected categories in import order; none selected means all.
    fn categories(&self) -> Vec<DataCategory> {
        if self.all {
            return DataCategory::ALL.to_vec();
        }
        let picked: Vec<DataCategory> = DataCategory::ALL
            .into_iter()
            .filter(|category| match category {
                DataCategory::Factsheet => self.factsheet,
                DataCategory::Returns => self.returns,
                DataCategory::Portfolio => self.portfolio,
                DataCategory::Nav => self.nav,
            })
            .collect();
        if picked.is_empty() {
            DataCategory::ALL.to_vec()
        } else {
            picked
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn report_service() -> Result<ReportService> {
    let config = ImportConfig::from_env();
    let store = PgFundStore::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    Ok(ReportService::new(Arc::new(store)))
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Import(args) => {
            let categories = args.categories();
            let summary = mfdp_import::run_import_from_env(&categories, args.clear).await?;
            info!(run_id = %summary.run_id, categories = categories.len(), "import complete");
            print_json(&summary)?;
        }
        Commands::Migrate => {
            let config = ImportConfig::from_env();
            let store = PgFundStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Serve { memory: true } => {
            mfdp_web::serve(WebConfig::from_env(), Arc::new(MemoryFundStore::new())).await?;
        }
        Commands::Serve { memory: false } => mfdp_web::serve_from_env().await?,
        Commands::Report { isin } => {
            let report = report_service()
                .await?
                .fund_analytics(&isin, Utc::now().date_naive())
                .await?;
            print_json(&report)?;
        }
        Commands::Compare { isins } => print_json(&report_service().await?.compare(&isins).await?)?,
        Commands::Overlap { isins } => print_json(&report_service().await?.overlap(&isins).await?)?,
        Commands::Status { clear, flow } => {
            let board = StatusBoard::new(ImportConfig::from_env().status_file);
            if clear {
                board.clear(flow.as_deref()).await?;
                println!("import status cleared");
            } else if let Some(flow) = flow {
                print_json(&board.get(&flow).await)?;
            } else {
                print_json(&board.all().await)?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    run(cli.command.unwrap_or(Commands::Import(ImportArgs::default()))).await
}
