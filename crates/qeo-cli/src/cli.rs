//! `qeo` command-line host
//!
//! Owns logging initialization, settings loading and the metrics port, then
//! hands a single database session to the advisor services.

mod input;
mod render;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use qeo_core::{AdvisorSettings, Connection};
use qeo_driver_postgres::PostgresDriver;
use qeo_services::{
    OptimizeRequest, QueryAdvisor, TracingMetrics, WorkloadAggregator, run_explain,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qeo")]
#[command(about = "Query explain & optimize advisor for PostgreSQL")]
#[command(version)]
struct Cli {
    /// TOML settings file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Connection URL, overrides the settings file
    #[arg(long, global = true, env = "QEO_DB_URL")]
    database_url: Option<String>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PlanArgs {
    /// Run EXPLAIN ANALYZE (executes the statement)
    #[arg(long)]
    analyze: bool,

    /// Statement timeout for planner round trips
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the normalized plan of a statement
    Explain {
        /// SQL text, or `-` to read from stdin
        sql: String,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Suggest rewrites and indexes for one statement
    Optimize {
        /// SQL text, or `-` to read from stdin
        sql: String,
        #[command(flatten)]
        plan: PlanArgs,
        /// Maximum number of suggestions
        #[arg(long)]
        top_k: Option<usize>,
        /// Skip hypothetical index trials
        #[arg(long)]
        no_what_if: bool,
    },
    /// Merge index suggestions across a batch of statements
    Workload {
        /// File with `;`-separated statements or a JSON array of strings
        file: PathBuf,
        /// Maximum number of merged suggestions
        #[arg(long)]
        top_k: Option<usize>,
        /// Skip hypothetical index trials
        #[arg(long)]
        no_what_if: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut settings = AdvisorSettings::load(cli.config.as_deref())
        .context("failed to load settings")?;
    if let Some(url) = &cli.database_url {
        settings.database_url = url.clone();
    }
    let default_top_k = settings.optimizer.top_k;
    let timeout_default = settings.optimizer.timeout_ms_default;

    let driver = PostgresDriver::new();
    let conn = driver
        .connect(&settings.database_url)
        .await
        .context("failed to open database session")?;
    tracing::info!(driver = driver.name(), "connected");

    let advisor =
        QueryAdvisor::new(settings.shared()).with_metrics(Arc::new(TracingMetrics));

    let outcome = run(&cli, &conn, advisor, default_top_k, timeout_default).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close session");
    }
    outcome
}

async fn run(
    cli: &Cli,
    conn: &Arc<dyn Connection>,
    advisor: QueryAdvisor,
    default_top_k: usize,
    timeout_default: u64,
) -> Result<()> {
    match &cli.command {
        Commands::Explain { sql, plan } => {
            let sql = input::read_sql(sql)?;
            let timeout_ms = plan.timeout_ms.unwrap_or(timeout_default);
            let output = run_explain(conn.as_ref(), &sql, plan.analyze, timeout_ms).await?;
            if cli.json {
                render::print_json(output.document())?;
            } else {
                println!("{}", render::plan_table(&output.plan));
                println!("Total cost: {:.3}", output.total_cost());
            }
        }
        Commands::Optimize {
            sql,
            plan,
            top_k,
            no_what_if,
        } => {
            let sql = input::read_sql(sql)?;
            let mut request = OptimizeRequest::new(sql)
                .with_analyze(plan.analyze)
                .with_what_if(!no_what_if);
            if let Some(ms) = plan.timeout_ms {
                request = request.with_timeout_ms(ms);
            }
            if let Some(k) = top_k {
                request = request.with_top_k(*k);
            }

            let report = advisor.optimize(conn, &request).await;
            if cli.json {
                render::print_json(&report)?;
            } else {
                if !report.ok {
                    bail!("{}", report.message);
                }
                render::print_report(&report);
            }
        }
        Commands::Workload {
            file,
            top_k,
            no_what_if,
        } => {
            let sqls = input::read_workload(file)?;
            if sqls.is_empty() {
                bail!("no statements found in {}", file.display());
            }
            let aggregator = WorkloadAggregator::new(advisor);
            let result = aggregator
                .analyze_workload(conn, &sqls, top_k.unwrap_or(default_top_k), !no_what_if)
                .await;
            if cli.json {
                render::print_json(&result)?;
            } else {
                render::print_workload(&result);
            }
        }
    }
    Ok(())
}
