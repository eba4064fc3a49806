use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use idxkeeper::alert::{Alerts, LogAlertSink, WebhookAlertSink};
use idxkeeper::cluster::ClusterClient;
use idxkeeper::config::{Config, Overrides};
use idxkeeper::es_http::EsHttp;
use idxkeeper::pause::Pause;
use idxkeeper::runner::{RunContext, RunReport};
use idxkeeper::{prune, snapshot_check, snapshot_run, tiering};

#[derive(Parser, Debug)]
#[command(
    name = "idxkeeper",
    version,
    about = "Index and snapshot lifecycle automation for search clusters"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Cluster URL, overrides env and file.
    #[arg(long)]
    url: Option<String>,
    /// Default snapshot repository, overrides env and file.
    #[arg(long)]
    repository: Option<String>,
    /// Log intended actions without changing the cluster.
    #[arg(long)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot indices dated on one day (default: yesterday).
    Snapshot {
        /// Day to snapshot, in the configured date format.
        #[arg(long)]
        date: Option<String>,
    },
    /// Snapshot every older index that has no successful snapshot.
    BackfillSnapshots,
    /// Snapshot a single index now.
    ManualSnapshot {
        #[arg(long)]
        index: String,
    },
    /// Delete indices until disk utilization drops below the threshold.
    Retention {
        #[arg(long)]
        threshold_percent: Option<f64>,
    },
    /// Delete indices past their rule's retention.
    PruneIndices,
    /// Delete snapshots past their rule's snapshot retention.
    PruneSnapshots,
    /// Reduce replicas on aging indices.
    Dereplicate,
    /// Route aging indices to the cold tier.
    ColdMigrate,
    /// Report indices missing a valid snapshot.
    CheckSnapshots,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    let threshold_override = match &cli.command {
        Command::Retention { threshold_percent } => *threshold_percent,
        _ => None,
    };
    let overrides = Overrides {
        url: cli.url.clone(),
        repository: cli.repository.clone(),
        threshold_percent: threshold_override,
    };
    let cfg = Config::load(cli.config.clone(), &overrides)?;
    info!(
        cluster = %cfg.cluster.name,
        url = %cfg.cluster.url,
        rules = cfg.classifier.rules().len(),
        dry_run = cli.dry_run,
        "starting idxkeeper"
    );

    let http = EsHttp::new(
        cfg.cluster.url.as_str(),
        cfg.cluster.user.as_str(),
        cfg.cluster.pass.as_str(),
        cfg.cluster.timeout,
        true,
    )?
    .with_retry(cfg.cluster.retry_attempts, cfg.cluster.retry_backoff);
    let client = ClusterClient::new(http);
    let alerts = create_alerts(&cfg)?;

    let (pause_handle, pause) = Pause::new();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, cancelling pending waits");
            pause_handle.cancel();
        }
    });

    let ctx = RunContext {
        cfg: &cfg,
        client: &client,
        alerts: &alerts,
        pause: &pause,
        dry_run: cli.dry_run,
        today: Utc::now().date_naive(),
    };

    let report = match cli.command {
        Command::Snapshot { date } => {
            let target = parse_target_date(&cfg, date.as_deref(), ctx.today)?;
            snapshot_run::run_daily_snapshots(&ctx, target).await?
        }
        Command::BackfillSnapshots => snapshot_run::run_backfill_snapshots(&ctx).await?,
        Command::ManualSnapshot { index } => snapshot_run::run_manual_snapshot(&ctx, &index).await?,
        Command::Retention { .. } => {
            let report = ctx.run_retention().await?;
            info!(
                outcome = ?report.outcome,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                final_utilization = ?report.final_utilization,
                "retention: done"
            );
            RunReport {
                succeeded: report.deleted,
                failed: report.failed,
                skipped: report.skipped_unsnapshotted,
            }
        }
        Command::PruneIndices => prune::prune_indices(&ctx).await?,
        Command::PruneSnapshots => prune::prune_snapshots(&ctx).await?,
        Command::Dereplicate => tiering::dereplicate(&ctx).await?,
        Command::ColdMigrate => tiering::cold_migrate(&ctx).await?,
        Command::CheckSnapshots => snapshot_check::check_snapshots(&ctx).await?,
    };

    if !report.is_success() {
        anyhow::bail!(
            "{} item(s) failed: {}",
            report.failed.len(),
            report.failed.join(",")
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_alerts(cfg: &Config) -> Result<Alerts> {
    match &cfg.alert_webhook_url {
        Some(url) => Ok(Alerts::Webhook(WebhookAlertSink::new(
            url.as_str(),
            cfg.cluster.name.as_str(),
            cfg.cluster.timeout,
        )?)),
        None => Ok(Alerts::Log(LogAlertSink)),
    }
}

fn parse_target_date(cfg: &Config, raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match raw {
        Some(raw) => NaiveDate::parse_from_str(raw, cfg.date_format.layout()).map_err(|err| {
            anyhow::anyhow!(
                "--date {raw:?} does not match {}: {err}",
                cfg.date_format.layout()
            )
        }),
        None => Ok(today - ChronoDuration::days(1)),
    }
}
