//! Chip Warden Binary
//!
//! Feeds program files to the engine and inspects the version history.

use std::path::PathBuf;
use std::process::ExitCode;

use chipwarden::intake::{process_backlog, process_file, scan_intake};
use chipwarden::{Config, Engine, IdempotencePolicy, LogNotifier};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// Chip Warden
#[derive(Parser, Debug)]
#[command(name = "chipwarden")]
#[command(about = "Versioned archive and distribution for CNC program files")]
#[command(version)]
struct Args {
    /// Directory where posted program files land
    #[arg(short, long, default_value = "./intake")]
    intake_dir: PathBuf,

    /// Archive root (history and ledger journal)
    #[arg(short, long, default_value = "./parts_archive")]
    archive_dir: PathBuf,

    /// Directory the controllers read from
    #[arg(short, long, default_value = "./distribution")]
    distribution_dir: PathBuf,

    /// Distribution entries kept per part
    #[arg(short, long, default_value = "2")]
    retention: usize,

    /// How a resubmitted file is recognised as a replay
    #[arg(long, value_enum, default_value = "checksum")]
    idempotence: Idempotence,

    /// Keep intake files after they are processed
    #[arg(long)]
    keep_processed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Idempotence {
    Checksum,
    Posted,
}

impl From<Idempotence> for IdempotencePolicy {
    fn from(value: Idempotence) -> Self {
        match value {
            Idempotence::Checksum => IdempotencePolicy::Checksum,
            Idempotence::Posted => IdempotencePolicy::PostedTimestamp,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the given files
    Ingest {
        /// Program files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Process every accepted file in the intake directory
    Scan {
        /// Worker threads
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// List the versions of a part
    History {
        part: String,
    },

    /// Print one archived version
    Show {
        part: String,
        version: u32,

        /// Print only the metadata, not the program text
        #[arg(long)]
        meta_only: bool,
    },

    /// Check the ledger journal
    Verify,

    /// Roll forward pending versions and republish lagging parts
    Reconcile,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chipwarden=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Chip Warden v{}", chipwarden::VERSION);
    tracing::debug!("Archive directory: {}", args.archive_dir.display());
    tracing::debug!("Distribution directory: {}", args.distribution_dir.display());

    let config = Config::builder()
        .intake_dir(&args.intake_dir)
        .archive_dir(&args.archive_dir)
        .distribution_dir(&args.distribution_dir)
        .retention(args.retention)
        .idempotence(args.idempotence.into())
        .remove_processed(!args.keep_processed)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::FAILURE;
        }
    };
    engine.add_notifier(Box::new(LogNotifier));

    match args.command {
        Commands::Ingest { files } => {
            let mut failed = false;
            for path in files {
                match process_file(&engine, &path) {
                    Ok(report) if report.is_new => {
                        println!("{} -> {} v{}", path.display(), report.part, report.version)
                    }
                    Ok(report) => println!(
                        "{} -> {} v{} (unchanged)",
                        path.display(),
                        report.part,
                        report.version
                    ),
                    Err(e) => {
                        eprintln!("{}: {}", path.display(), e);
                        failed = true;
                    }
                }
            }
            exit_code(failed)
        }

        Commands::Scan { workers } => {
            let paths = match scan_intake(engine.config()) {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::error!("Failed to scan intake directory: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let results = process_backlog(&engine, paths, workers);
            let failures = results.iter().filter(|(_, r)| r.is_err()).count();
            println!("{} files processed, {} failed", results.len(), failures);
            exit_code(failures > 0)
        }

        Commands::History { part } => {
            let history = engine.history(&part);
            if history.is_empty() {
                eprintln!("no versions recorded for {}", part);
                return ExitCode::FAILURE;
            }
            for slot in history {
                println!("v{:<4} {}  {}", slot.version, slot.posted, slot.checksum.short());
            }
            ExitCode::SUCCESS
        }

        Commands::Show {
            part,
            version,
            meta_only,
        } => match engine.read_version(&part, version) {
            Ok(archived) => {
                let meta = &archived.meta;
                println!("part:     {} ({})", meta.part_label, meta.part);
                println!("project:  {}", meta.project);
                println!("version:  {}", meta.version);
                println!("posted:   {}", meta.posted);
                println!("checksum: {}", meta.checksum);
                println!("source:   {}", meta.source_name);
                println!("archived: {}", meta.archived_at.to_rfc3339());
                if !meta_only {
                    println!();
                    print!("{}", String::from_utf8_lossy(&archived.content));
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },

        Commands::Verify => match engine.verify_journal() {
            Ok(result) => {
                println!(
                    "journal ok: {} entries, last lsn {}, {} trailing bytes damaged",
                    result.entries_recovered, result.last_lsn, result.bytes_discarded
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("journal check failed: {}", e);
                ExitCode::FAILURE
            }
        },

        Commands::Reconcile => {
            let report = engine.reconcile();
            for (part, version) in &report.rolled_forward {
                println!("rolled forward {} v{}", part, version);
            }
            for (part, version) in &report.republished {
                println!("republished {} v{}", part, version);
            }
            for (part, reason) in &report.failed {
                eprintln!("{}: {}", part, reason);
            }
            exit_code(!report.failed.is_empty())
        }
    }
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
