use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use arena_metrics::memory::MemoryCache;
use arena_metrics::models::InboundEvent;
use arena_metrics::pg::{self, PgBackend};
use arena_metrics::report::build_report;
use arena_metrics::store::{Cache, EventLedger, QualityLedger, RawRecords, SnapshotStore};
use arena_metrics::MetricsEngine;

#[derive(Parser)]
#[command(name = "arena-metrics")]
#[command(about = "Metrics aggregation and data quality engine for arena operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Domain {
    All,
    Financial,
    Attendance,
    Operational,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Recompute metric snapshots for a date
    Aggregate {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum, default_value = "all")]
        domain: Domain,
    },
    /// Import domain events from a CSV file
    ImportEvents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Audit raw tables and append scores to the quality ledger
    QualityCheck,
    /// Generate a markdown report from the latest snapshots
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Deserialize)]
struct EventRow {
    event_id: String,
    event_type: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: Option<String>,
}

fn build_engine(backend: Arc<PgBackend>) -> MetricsEngine {
    MetricsEngine::new(
        backend.clone() as Arc<dyn RawRecords>,
        backend.clone() as Arc<dyn SnapshotStore>,
        backend.clone() as Arc<dyn EventLedger>,
        backend as Arc<dyn QualityLedger>,
        Arc::new(MemoryCache::new()) as Arc<dyn Cache>,
    )
}

async fn import_events(engine: &MetricsEngine, path: &PathBuf) -> anyhow::Result<(u64, u64)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut accepted = 0u64;
    let mut skipped = 0u64;
    for record in reader.deserialize() {
        let row: EventRow = record.context("malformed CSV row")?;
        let payload = match row.payload.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("bad payload for event {}", row.event_id))?,
            None => serde_json::Value::Null,
        };
        let event = InboundEvent {
            event_id: row.event_id,
            event_type: row.event_type,
            payload,
            timestamp: row.timestamp,
        };
        let outcome = engine.process_event(&event).await?;
        if outcome.accepted {
            accepted += 1;
        } else {
            skipped += 1;
        }
    }
    Ok((accepted, skipped))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            pg::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            pg::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Aggregate { date, domain } => {
            let engine = build_engine(Arc::new(PgBackend::new(pool)));
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            match domain {
                Domain::All => {
                    let view = engine.aggregate_all(date).await?;
                    println!(
                        "Aggregated all domains for {date}; dashboard refreshed at {}.",
                        view.refreshed_at
                    );
                }
                Domain::Financial => {
                    let snapshot = engine.aggregate_financial(date).await?;
                    println!(
                        "Financial {date}: MRR {:.2}, delinquency {:.2}%, DSO {} days.",
                        snapshot.mrr, snapshot.delinquency_pct, snapshot.dso_days
                    );
                }
                Domain::Attendance => {
                    let snapshots = engine.aggregate_attendance(date).await?;
                    println!("Attendance {date}: {} class snapshots.", snapshots.len());
                }
                Domain::Operational => {
                    let snapshot = engine.aggregate_operational(date).await?;
                    println!(
                        "Operational {date}: DAU {}, MAU {}, occupancy {:.2}%.",
                        snapshot.dau, snapshot.mau, snapshot.court_occupancy_pct
                    );
                }
            }
        }
        Commands::ImportEvents { csv } => {
            let engine = build_engine(Arc::new(PgBackend::new(pool)));
            let (accepted, skipped) = import_events(&engine, &csv).await?;
            println!(
                "Processed {} events from {} ({accepted} accepted, {skipped} skipped).",
                accepted + skipped,
                csv.display()
            );
        }
        Commands::QualityCheck => {
            let engine = build_engine(Arc::new(PgBackend::new(pool)));
            let results = engine.run_full_quality_check().await?;
            for result in &results {
                match &result.error {
                    Some(err) => println!("- {}: check failed ({err})", result.table),
                    None => println!(
                        "- {}: overall {:.2} across {} records, {} anomaly kinds",
                        result.table,
                        result.overall_score,
                        result.total_records,
                        result.anomalies.len()
                    ),
                }
            }
        }
        Commands::Report { out } => {
            let engine = build_engine(Arc::new(PgBackend::new(pool)));
            let view = engine.latest_dashboard_view().await?;
            let quality = engine.quality_report().await?;
            let report = build_report(view.as_ref(), &quality);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
