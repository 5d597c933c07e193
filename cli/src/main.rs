//! Sealbook CLI
//!
//! Posts journal entries, computes and records tax, produces period
//! reports, verifies the ledger, and manages encrypted backups against a
//! local ledger database.
//!
//! Usage:
//!   sealbook --config sealbook.toml post --file entry.json
//!   sealbook verify
//!   sealbook tax compute 155.00 CA-ON --date 2024-03-15
//!   sealbook tax report 2024-01-01 2024-03-31 --format csv --persist
//!   SEALBOOK_PASSWORD=... sealbook backup create books.sbak --password-env SEALBOOK_PASSWORD
//!
//! Results are printed to stdout as JSON (or CSV for `tax report --format
//! csv`).  Logs go to stderr; set RUST_LOG=info for more detail.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sealbook_audit::VerifyScope;
use sealbook_backup::artifact;
use sealbook_contracts::{
    backup::BackupTable,
    error::{SealError, SealResult},
    journal::JournalDraft,
    money::Cents,
    tax::{TaxPeriod, TaxTransactionDraft},
    time::now_millis,
};
use sealbook_runtime::{Sealbook, SealbookConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Sealbook — tamper-evident books.
#[derive(Parser)]
#[command(
    name = "sealbook",
    about = "Hash-chained journal, tax ledger, and encrypted backups",
    long_about = "Every posting, tax record, report, backup, and verification run is sealed\n\
                  into an append-only SHA-256 chain stored in a local SQLite database."
)]
struct Cli {
    /// TOML configuration file.  Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post a journal entry from a JSON draft.
    Post {
        #[arg(long)]
        file: PathBuf,
    },
    /// Post the mirror image of an entry.
    Reverse { entry: String },
    /// Re-check one entry against its ledger seal.
    VerifyEntry { entry: String },
    /// Verify the ledger and seal the outcome.
    Verify {
        /// Only verify events after the one with this hash.
        #[arg(long)]
        since: Option<String>,
    },
    /// Print the current ledger head.
    Head,
    #[command(subcommand)]
    Tax(TaxCommand),
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Subcommand)]
enum TaxCommand {
    /// Compute tax without recording it.
    Compute {
        /// Taxable amount, e.g. `155.00`.
        amount: Cents,
        code: String,
        /// Rate date (defaults to today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compute and record tax against a document.
    Record {
        amount: Cents,
        code: String,
        #[arg(long)]
        document: String,
        /// Rate date (defaults to the transaction date).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Transaction timestamp, RFC 3339 (defaults to now).
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Period report over recorded transactions.
    Report {
        start: NaiveDate,
        end: NaiveDate,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        /// Store the report and seal its checksum.
        #[arg(long)]
        persist: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write a backup artifact.
    Create {
        out: PathBuf,
        /// Environment variable holding the password.  Unencrypted if omitted.
        #[arg(long)]
        password_env: Option<String>,
        /// Comma-separated tables (default: all).
        #[arg(long, value_delimiter = ',')]
        tables: Vec<BackupTable>,
    },
    /// Replace the backed-up tables with an artifact's content.
    Restore {
        input: PathBuf,
        #[arg(long)]
        password_env: Option<String>,
    },
    /// Print an artifact's metadata.  Needs no password.
    Inspect { input: PathBuf },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("sealbook: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a verification completed but failed.
fn run(cli: Cli) -> SealResult<bool> {
    let config = match &cli.config {
        Some(path) => SealbookConfig::from_file(path)?,
        None => SealbookConfig::default(),
    };

    // `inspect` reads a file only; it must not create a database.
    if let Command::Backup(BackupCommand::Inspect { input }) = &cli.command {
        print_json(&artifact::inspect(input)?)?;
        return Ok(true);
    }

    let book = Sealbook::open(config)?;

    match cli.command {
        Command::Post { file } => {
            let draft: JournalDraft = serde_json::from_str(&read_text(&file)?)?;
            print_json(&book.post_journal_entry(&draft)?)?;
        }
        Command::Reverse { entry } => {
            print_json(&book.reverse_journal_entry(&entry)?)?;
        }
        Command::VerifyEntry { entry } => {
            let outcome = book.verify_journal_entry(&entry)?;
            print_json(&outcome)?;
            return Ok(outcome.valid);
        }
        Command::Verify { since } => {
            let scope = match since {
                Some(anchor_hash) => VerifyScope::Since { anchor_hash },
                None => VerifyScope::Full,
            };
            let report = book.verify_ledger(&scope)?;
            print_json(&report)?;
            return Ok(report.valid);
        }
        Command::Head => {
            print_json(&book.ledger_head()?)?;
        }
        Command::Tax(command) => run_tax(&book, command)?,
        Command::Backup(command) => run_backup(&book, command)?,
    }
    Ok(true)
}

// ── Tax ───────────────────────────────────────────────────────────────────────

fn run_tax(book: &Sealbook, command: TaxCommand) -> SealResult<()> {
    match command {
        TaxCommand::Compute { amount, code, date } => {
            let as_of = date.unwrap_or_else(|| now_millis().date_naive());
            let computation = book.compute_tax(amount, &code, as_of)?;
            if let Some(warning) = &computation.warning {
                eprintln!("warning: {}", warning.message);
            }
            print_json(&computation)?;
        }
        TaxCommand::Record {
            amount,
            code,
            document,
            date,
            at,
        } => {
            let transaction_date = at.unwrap_or_else(now_millis);
            let as_of = date.unwrap_or_else(|| transaction_date.date_naive());
            let computation = book.compute_tax(amount, &code, as_of)?;
            if let Some(warning) = &computation.warning {
                eprintln!("warning: {}", warning.message);
            }
            let recorded = book.record_tax_transaction(&TaxTransactionDraft {
                linked_document_id: document,
                computation,
                transaction_date,
            })?;
            print_json(&recorded)?;
        }
        TaxCommand::Report {
            start,
            end,
            format,
            persist,
        } => {
            let report = book.generate_period_tax_report(&TaxPeriod::new(start, end)?)?;
            if persist {
                let event_id = book.persist_period_tax_report(&report)?;
                eprintln!("report {} sealed as ledger event {event_id}", report.report_id);
            }
            match format {
                ReportFormat::Json => println!("{}", sealbook_tax::to_json(&report)?),
                ReportFormat::Csv => print!("{}", sealbook_tax::to_csv(&report)?),
            }
        }
    }
    Ok(())
}

// ── Backup ────────────────────────────────────────────────────────────────────

fn run_backup(book: &Sealbook, command: BackupCommand) -> SealResult<()> {
    match command {
        BackupCommand::Create {
            out,
            password_env,
            tables,
        } => {
            let password = password_from_env(password_env.as_deref())?;
            if password.is_none() {
                warn!("no --password-env given; the backup will not be encrypted");
            }
            let backup = book.export_backup(password.as_deref(), &tables, &out)?;
            print_json(&backup.metadata)?;
        }
        BackupCommand::Restore {
            input,
            password_env,
        } => {
            let password = password_from_env(password_env.as_deref())?;
            let backup = artifact::read_from(&input)?;
            print_json(&book.restore_backup(&backup, password.as_deref())?)?;
        }
        BackupCommand::Inspect { input } => {
            print_json(&artifact::inspect(&input)?)?;
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn password_from_env(var: Option<&str>) -> SealResult<Option<String>> {
    var.map(|name| {
        std::env::var(name).map_err(|_| SealError::InvalidInput {
            reason: format!("environment variable {name} is not set"),
        })
    })
    .transpose()
}

fn read_text(path: &Path) -> SealResult<String> {
    std::fs::read_to_string(path).map_err(|e| SealError::InvalidInput {
        reason: format!("failed to read '{}': {e}", path.display()),
    })
}

fn print_json<T: Serialize>(value: &T) -> SealResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
