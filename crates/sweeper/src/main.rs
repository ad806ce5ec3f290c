//! PUP STAR Sweeper
//!
//! Maintenance tasks run against the gateway's stores.
//!
//! `sweeper [--dry-run]` runs one reconciliation pass over the PDF bucket:
//! 1. Collects every blob key a research record still references
//! 2. Lists the bucket
//! 3. Removes unreferenced blobs older than the grace period
//!
//! `sweeper import <studies.json> <papers-dir> [--dry-run]` loads the legacy
//! studies catalogue, uploading each PDF found under `papers-dir`.
//!
//! Pass `--dry-run` to report without writing or removing anything.

use pupstar_common::{
    config::{AppConfig, DatabaseDriver, StorageDriver},
    db::{DbPool, Repository},
    lifecycle::{
        import::{self, ImportOptions},
        reconcile::{self, SweepOptions},
    },
    records::{MemoryRecordStore, RecordStore},
    storage::{BlobStore, MemoryBlobStore, SupabaseBlobStore},
    RecordLifecycle, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: sweeper [--dry-run] | sweeper import <studies.json> <papers-dir> [--dry-run]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Sweep,
    Import { studies: PathBuf, papers_dir: PathBuf },
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    dry_run: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut dry_run = false;
    let mut positional = Vec::new();
    for arg in args {
        if arg == "--dry-run" || arg == "-n" {
            dry_run = true;
        } else if arg.starts_with('-') {
            return Err(format!("unknown argument '{}'; {}", arg, USAGE));
        } else {
            positional.push(arg);
        }
    }

    let command = match positional.as_slice() {
        [] => Command::Sweep,
        [name, studies, papers_dir] if name == "import" => Command::Import {
            studies: PathBuf::from(studies),
            papers_dir: PathBuf::from(papers_dir),
        },
        _ => return Err(format!("unexpected arguments '{}'; {}", positional.join(" "), USAGE)),
    };

    Ok(Args { command, dry_run })
}

/// Refuse to write to a real bucket through a record store only this
/// process can see.
///
/// An in-memory record store here never holds the gateway's rows, so a sweep
/// would treat every stored PDF as unreferenced.
fn check_drivers(
    database: DatabaseDriver,
    storage: StorageDriver,
    dry_run: bool,
) -> Result<(), String> {
    if database == DatabaseDriver::Memory && storage == StorageDriver::Supabase && !dry_run {
        return Err(
            "database.driver = \"memory\" cannot be used with storage.driver = \"supabase\" \
             outside --dry-run; point the sweeper at the gateway's database"
                .to_string(),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = parse_args(std::env::args().skip(1))?;

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting PUP STAR Sweeper v{}", VERSION);

    if let Err(message) = check_drivers(config.database.driver, config.storage.driver, args.dry_run) {
        error!("{}", message);
        return Err(message.into());
    }

    let records: Arc<dyn RecordStore> = match config.database.driver {
        DatabaseDriver::Postgres => {
            Arc::new(Repository::new(DbPool::new(&config.database).await?))
        }
        DatabaseDriver::Memory => {
            warn!("Record store is in-memory; nothing it holds outlives this run");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match config.storage.driver {
        StorageDriver::Supabase => Arc::new(SupabaseBlobStore::new(&config.storage)?),
        StorageDriver::Memory => {
            warn!("Blob store is in-memory; nothing it holds outlives this run");
            Arc::new(MemoryBlobStore::default())
        }
    };

    match args.command {
        Command::Sweep => run_sweep(&config, records, blobs, args.dry_run).await,
        Command::Import {
            studies,
            papers_dir,
        } => {
            let lifecycle = RecordLifecycle::from_config(records, blobs, &config);
            let options = ImportOptions {
                papers_dir,
                dry_run: args.dry_run,
            };
            run_import(&lifecycle, &studies, &options).await
        }
    }
}

async fn run_sweep(
    config: &AppConfig,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = SweepOptions::from_config(config, dry_run);
    info!(
        grace_period_secs = options.grace_period.as_secs(),
        dry_run = options.dry_run,
        "Sweeping unreferenced blobs"
    );

    // Listing failures abort the run; individual removal failures are only counted
    let report = reconcile::sweep(records.as_ref(), blobs.as_ref(), &options)
        .await
        .map_err(|e| {
            error!(error = %e, "Sweep failed");
            e
        })?;

    info!(
        scanned = report.scanned,
        referenced = report.referenced,
        removed = report.removed,
        kept_recent = report.kept_recent,
        failed = report.failed,
        dry_run = report.dry_run,
        "Sweep complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn run_import(
    lifecycle: &RecordLifecycle,
    studies: &Path,
    options: &ImportOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        studies = %studies.display(),
        papers_dir = %options.papers_dir.display(),
        "Reading legacy catalogue"
    );
    let catalogue = tokio::fs::read_to_string(studies).await.map_err(|e| {
        error!(path = %studies.display(), error = %e, "Cannot read studies catalogue");
        e
    })?;

    let report = import::import_studies(lifecycle, &catalogue, options)
        .await
        .map_err(|e| {
            error!(error = %e, "Import failed");
            e
        })?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        return Err(format!("{} of {} studies failed to import", report.failed, report.total).into());
    }
    Ok(())
}
