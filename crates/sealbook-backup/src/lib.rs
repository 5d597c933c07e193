//! # sealbook-backup
//!
//! Compressed, optionally encrypted backups bound to the ledger head they
//! were taken at, and transactional restore.
//!
//! - `dataset`  — generic table dumps
//! - `artifact` — the `SBAK` file layout, `inspect` without a password
//! - `engine`   — `BackupEngine::create_backup` / `restore_backup`

pub mod artifact;
pub mod dataset;
pub mod engine;

pub use engine::{BackupEngine, BackupSettings, RestoreSummary};

// ── Tests ─────────────────────────────────────────────────────────────────────
