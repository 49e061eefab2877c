use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use uuid::Uuid;
use ypol_adapters::AdvisorRequest;
use ypol_sync::{SyncConfig, SyncPipeline, SyncRunSummary};

mod logging;

#[derive(Debug, Parser)]
#[command(name = "ypol")]
#[command(about = "Youth policy catalog ingestion and lifecycle maintenance")]
struct Cli {
    /// Debug-level logs.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Evaluate liveness and expiry as of this date (YYYY-MM-DD) instead of today.
    #[arg(long, global = true, value_parser = parse_today)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest the catalog, then sweep expired policies.
    Sync,
    /// Fetch, filter, normalize and upsert only.
    Ingest,
    /// Delete closed or expired policies and their comments and ratings.
    Sweep,
    /// Create the tables if they do not exist.
    Migrate,
    /// Run the sync on `SYNC_CRON` until Ctrl-C.
    Schedule,
    /// Ask the advisor for recommendations and print them as JSON.
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(long)]
        prompt: Option<String>,
    },
}

fn summary_line(summary: &SyncRunSummary) -> String {
    format!(
        "sync complete: run_id={} today={} pages={} fetched={} eligible={} upserted={} failed={} \
         deleted_comments={} deleted_ratings={} deleted_policies={}",
        summary.run_id,
        summary.today,
        summary.ingest.pages,
        summary.ingest.fetched,
        summary.ingest.eligible,
        summary.ingest.upsert.upserted,
        summary.ingest.upsert.failed,
        summary.sweep.deleted_comments,
        summary.sweep.deleted_ratings,
        summary.sweep.deleted_policies,
    )
}

fn parse_today(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| format!("{value}: {err}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(logging::Verbosity::from_flags(cli.verbose, cli.quiet)) {
        eprintln!("warning: logging not initialized: {err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::from_env();
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let pipeline = Arc::new(SyncPipeline::from_config(&config).await?);
            let summary = pipeline.run_once(today).await?;
            println!("{}", summary_line(&summary));
            if let Some(sched) = ypol_sync::maybe_build_scheduler(&config, pipeline).await? {
                ypol_sync::run_scheduler_until_ctrl_c(sched, &config.sync_cron).await?;
            }
        }
        Commands::Ingest => {
            let pipeline = SyncPipeline::from_config(&config).await?;
            let report = pipeline.run_ingest(Uuid::new_v4(), today).await?;
            println!(
                "ingest complete: pages={} fetched={} eligible={} rejected={} upserted={} failed={}",
                report.pages,
                report.fetched,
                report.eligible,
                report.rejected_total(),
                report.upsert.upserted,
                report.upsert.failed
            );
        }
        Commands::Sweep => {
            let repository = ypol_sync::connect_repository(&config).await?;
            let report =
                ypol_sync::sweep_expired(&repository, config.sweep_batch_size, today).await?;
            println!(
                "sweep complete: comments={} ratings={} policies={}",
                report.deleted_comments, report.deleted_ratings, report.deleted_policies
            );
        }
        Commands::Migrate => {
            let repository = ypol_sync::connect_repository(&config).await?;
            println!(
                "schema ready: dialect={:?} policies={}",
                repository.dialect(),
                repository.count_policies().await?
            );
        }
        Commands::Schedule => {
            let pipeline = Arc::new(SyncPipeline::from_config(&config).await?);
            let sched = ypol_sync::build_scheduler(&config.sync_cron, pipeline).await?;
            ypol_sync::run_scheduler_until_ctrl_c(sched, &config.sync_cron).await?;
        }
        Commands::Recommend { user, prompt } => {
            let repository = ypol_sync::connect_repository(&config).await?;
            let advisor = config.advisor()?;
            let request = AdvisorRequest::new(user, prompt);
            let recommendations = ypol_sync::recommend(&repository, &advisor, &request).await?;
            let body = serde_json::json!({ "recommendations": recommendations });
            println!(
                "{}",
                serde_json::to_string_pretty(&body).context("encoding recommendations")?
            );
        }
    }

    Ok(())
}
