//! # sealbook-runtime
//!
//! Loads `SealbookConfig` and exposes every ledger operation through one
//! `Sealbook` handle.
//!
//! ```rust,ignore
//! use sealbook_runtime::{Sealbook, SealbookConfig};
//!
//! let book = Sealbook::open(SealbookConfig::from_file(Path::new("sealbook.toml"))?)?;
//! let entry = book.post_journal_entry(&draft)?;
//! assert!(book.verify_journal_entry(&entry.entry_number)?.valid);
//! ```

pub mod config;
pub mod sealbook;

pub use config::{BackupConfig, SealbookConfig};
pub use sealbook::Sealbook;

// ── Tests ─────────────────────────────────────────────────────────────────────
